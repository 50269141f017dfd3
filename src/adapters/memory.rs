//! In-memory store for dry-run mode and tests.
//!
//! Mirrors the Postgres store's semantics closely enough that the pipeline
//! behaves identically; nothing survives process restart.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::adapters::store::{event_kind, Store};
use crate::domain::{
    ArbitrageOpportunity, FundingRate, OpportunityOutcome, Position, PositionStatus, RiskSnapshot,
    Strategy, StrategyStatus, TradeResult, Venue,
};
use crate::error::{FundarbError, Result};

#[derive(Debug, Clone)]
struct AuditEvent {
    kind: String,
    #[allow(dead_code)]
    payload: serde_json::Value,
    recorded_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    funding_rates: Vec<FundingRate>,
    opportunities: HashMap<Uuid, (ArbitrageOpportunity, Option<OpportunityOutcome>)>,
    strategies: HashMap<Uuid, Strategy>,
    positions: HashMap<(Uuid, Venue), Position>,
    trades: Vec<(Uuid, TradeResult)>,
    risk_snapshots: Vec<RiskSnapshot>,
    events: Vec<AuditEvent>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded audit events of a given kind (test inspection)
    pub async fn event_count(&self, kind: &str) -> usize {
        self.inner
            .read()
            .await
            .events
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    pub async fn opportunity_outcome(&self, id: Uuid) -> Option<OpportunityOutcome> {
        self.inner
            .read()
            .await
            .opportunities
            .get(&id)
            .and_then(|(_, outcome)| *outcome)
    }

    pub async fn trade_count(&self) -> usize {
        self.inner.read().await.trades.len()
    }

    pub async fn risk_snapshot_count(&self) -> usize {
        self.inner.read().await.risk_snapshots.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_funding_rate(&self, rate: &FundingRate) -> Result<()> {
        self.inner.write().await.funding_rates.push(rate.clone());
        Ok(())
    }

    async fn funding_rate_history(
        &self,
        instrument: &str,
        venue: Venue,
        hours: u32,
    ) -> Result<Vec<FundingRate>> {
        let cutoff = Utc::now() - Duration::hours(hours as i64);
        let inner = self.inner.read().await;
        let mut rates: Vec<FundingRate> = inner
            .funding_rates
            .iter()
            .filter(|r| r.instrument == instrument && r.venue == venue && r.observed_at >= cutoff)
            .cloned()
            .collect();
        rates.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
        Ok(rates)
    }

    async fn insert_opportunity(&self, opportunity: &ArbitrageOpportunity) -> Result<()> {
        self.inner
            .write()
            .await
            .opportunities
            .insert(opportunity.id, (opportunity.clone(), None));
        Ok(())
    }

    async fn mark_opportunity(&self, id: Uuid, outcome: OpportunityOutcome) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.opportunities.get_mut(&id) {
            Some(entry) => {
                entry.1 = Some(outcome);
                Ok(())
            }
            None => Err(FundarbError::Internal(format!(
                "unknown opportunity {}",
                id
            ))),
        }
    }

    async fn insert_strategy(&self, strategy: &Strategy, positions: &[Position]) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.strategies.insert(strategy.id, strategy.clone());
        for position in positions {
            inner
                .positions
                .insert((position.strategy_id, position.venue), position.clone());
        }
        Ok(())
    }

    async fn update_strategy_status(
        &self,
        id: Uuid,
        status: StrategyStatus,
        exit_time: Option<DateTime<Utc>>,
        realized_pnl: Option<Decimal>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let strategy = inner
            .strategies
            .get_mut(&id)
            .ok_or(FundarbError::StrategyNotFound(id))?;
        strategy.status = status;
        if exit_time.is_some() {
            strategy.exit_time = exit_time;
        }
        if realized_pnl.is_some() {
            strategy.realized_pnl = realized_pnl;
        }
        Ok(())
    }

    async fn get_strategy(&self, id: Uuid) -> Result<Option<Strategy>> {
        Ok(self.inner.read().await.strategies.get(&id).cloned())
    }

    async fn active_strategies(&self) -> Result<Vec<Strategy>> {
        let inner = self.inner.read().await;
        let mut active: Vec<Strategy> = inner
            .strategies
            .values()
            .filter(|s| s.status == StrategyStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.entry_time.cmp(&b.entry_time));
        Ok(active)
    }

    async fn positions_for_strategy(&self, strategy_id: Uuid) -> Result<Vec<Position>> {
        let inner = self.inner.read().await;
        Ok(inner
            .positions
            .values()
            .filter(|p| p.strategy_id == strategy_id)
            .cloned()
            .collect())
    }

    async fn update_position(&self, position: &Position) -> Result<()> {
        self.inner
            .write()
            .await
            .positions
            .insert((position.strategy_id, position.venue), position.clone());
        Ok(())
    }

    async fn update_position_status(
        &self,
        strategy_id: Uuid,
        venue: Venue,
        status: PositionStatus,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(position) = inner.positions.get_mut(&(strategy_id, venue)) {
            position.status = status;
        }
        Ok(())
    }

    async fn open_positions(&self) -> Result<Vec<Position>> {
        let inner = self.inner.read().await;
        Ok(inner
            .positions
            .values()
            .filter(|p| p.status == PositionStatus::Open)
            .cloned()
            .collect())
    }

    async fn insert_trade(&self, strategy_id: Uuid, trade: &TradeResult) -> Result<()> {
        self.inner
            .write()
            .await
            .trades
            .push((strategy_id, trade.clone()));
        Ok(())
    }

    async fn insert_risk_snapshot(&self, snapshot: &RiskSnapshot) -> Result<()> {
        self.inner
            .write()
            .await
            .risk_snapshots
            .push(snapshot.clone());
        Ok(())
    }

    async fn record_event(&self, kind: &str, payload: serde_json::Value) -> Result<()> {
        self.inner.write().await.events.push(AuditEvent {
            kind: kind.to_string(),
            payload,
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    async fn last_kill_event_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .inner
            .read()
            .await
            .events
            .iter()
            .filter(|e| e.kind == event_kind::KILL_SWITCH)
            .map(|e| e.recorded_at)
            .max())
    }
}
