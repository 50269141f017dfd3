pub mod health;

pub use health::{AppState, StatusResponse, StatusServer};
