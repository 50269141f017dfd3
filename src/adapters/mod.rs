pub mod feishu;
pub mod memory;
pub mod postgres;
pub mod store;

pub use feishu::{FeishuNotifier, NotifyEvent};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use store::Store;
