pub mod adapters;
pub mod analyzer;
pub mod config;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod marketdata;
pub mod risk;
pub mod services;
pub mod supervisor;

pub use adapters::{FeishuNotifier, MemoryStore, NotifyEvent, PostgresStore, Store};
pub use analyzer::OpportunityAnalyzer;
pub use config::AppConfig;
pub use error::{FundarbError, OrderError, Result, RiskError};
pub use exchange::{ExchangeClient, ExchangeRegistry, PaperExchange, PaperFill};
pub use execution::ExecutionCoordinator;
pub use marketdata::{LiveMarketData, MarketData};
pub use risk::{ExposureBook, RiskDecision, RiskLimitEngine};
pub use services::{AppState, StatusServer};
pub use supervisor::PositionSupervisor;
