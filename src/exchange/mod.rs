pub mod paper;
pub mod rate_limit;
pub mod retry;
pub mod traits;

pub use paper::{PaperExchange, PaperFill};
pub use rate_limit::RateLimiter;
pub use retry::with_backoff;
pub use traits::{AccountBalance, ExchangeClient, ExchangeRegistry, VenuePosition};
