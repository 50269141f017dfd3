//! Persistence seam.
//!
//! The core writes through this trait so the Postgres store and the in-memory
//! dry-run store are interchangeable. Audit events are append-only; the
//! trailing kill-switch timestamp feeds the risk engine's cooldown check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{
    ArbitrageOpportunity, FundingRate, OpportunityOutcome, Position, PositionStatus, RiskSnapshot,
    Strategy, StrategyStatus, TradeResult, Venue,
};
use crate::error::Result;

#[async_trait]
pub trait Store: Send + Sync {
    // ==================== Funding rates ====================

    async fn insert_funding_rate(&self, rate: &FundingRate) -> Result<()>;

    /// Historical series for one (instrument, venue), newest first
    async fn funding_rate_history(
        &self,
        instrument: &str,
        venue: Venue,
        hours: u32,
    ) -> Result<Vec<FundingRate>>;

    // ==================== Opportunities ====================

    /// Append-only; every produced opportunity is recorded for audit
    async fn insert_opportunity(&self, opportunity: &ArbitrageOpportunity) -> Result<()>;

    async fn mark_opportunity(&self, id: Uuid, outcome: OpportunityOutcome) -> Result<()>;

    // ==================== Strategies & positions ====================

    /// Persist a strategy and both legs as one logical unit
    async fn insert_strategy(&self, strategy: &Strategy, positions: &[Position]) -> Result<()>;

    async fn update_strategy_status(
        &self,
        id: Uuid,
        status: StrategyStatus,
        exit_time: Option<DateTime<Utc>>,
        realized_pnl: Option<Decimal>,
    ) -> Result<()>;

    async fn get_strategy(&self, id: Uuid) -> Result<Option<Strategy>>;

    async fn active_strategies(&self) -> Result<Vec<Strategy>>;

    async fn positions_for_strategy(&self, strategy_id: Uuid) -> Result<Vec<Position>>;

    /// Upsert keyed by (strategy_id, venue, instrument)
    async fn update_position(&self, position: &Position) -> Result<()>;

    async fn update_position_status(
        &self,
        strategy_id: Uuid,
        venue: Venue,
        status: PositionStatus,
    ) -> Result<()>;

    async fn open_positions(&self) -> Result<Vec<Position>>;

    // ==================== Trades ====================

    async fn insert_trade(&self, strategy_id: Uuid, trade: &TradeResult) -> Result<()>;

    // ==================== Risk audit ====================

    async fn insert_risk_snapshot(&self, snapshot: &RiskSnapshot) -> Result<()>;

    /// Append an audit event (kill-switch records, integrity incidents, ...)
    async fn record_event(&self, kind: &str, payload: serde_json::Value) -> Result<()>;

    /// Timestamp of the most recent kill-switch event, if any
    async fn last_kill_event_at(&self) -> Result<Option<DateTime<Utc>>>;
}

/// Audit event kinds written through `record_event`
pub mod event_kind {
    pub const KILL_SWITCH: &str = "kill_switch";
    pub const EXECUTION_FAILED: &str = "execution_failed";
    pub const INTEGRITY_INCIDENT: &str = "integrity_incident";
    pub const STRATEGY_CLOSED: &str = "strategy_closed";
}
