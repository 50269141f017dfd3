pub mod market;
pub mod opportunity;
pub mod order;
pub mod strategy;

pub use market::{parse_venue, BookLevel, FundingRate, OrderBookSnapshot, Venue};
pub use opportunity::{ArbitrageOpportunity, OpportunityOutcome};
pub use order::{OrderRequest, OrderSide, OrderStatus, TradeResult};
pub use strategy::{
    KillReason, Position, PositionSide, PositionStatus, RiskSnapshot, Strategy, StrategyStatus,
};
