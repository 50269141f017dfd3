//! Position supervision.
//!
//! Every poll the supervisor refreshes each active strategy's legs from the
//! venues, persists the refreshed view, and evaluates the kill predicates.
//! A triggered predicate closes the whole strategy through the coordinator's
//! close path so the audit trail and notifications stay in one place. Each
//! cycle also appends one exposure snapshot.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::adapters::Store;
use crate::config::{RiskConfig, SupervisorConfig};
use crate::domain::{KillReason, Position, PositionStatus, RiskSnapshot, Strategy};
use crate::error::Result;
use crate::exchange::ExchangeRegistry;
use crate::execution::ExecutionCoordinator;

pub struct PositionSupervisor {
    registry: Arc<ExchangeRegistry>,
    store: Arc<dyn Store>,
    coordinator: Arc<ExecutionCoordinator>,
    config: SupervisorConfig,
    risk: RiskConfig,
}

impl PositionSupervisor {
    pub fn new(
        registry: Arc<ExchangeRegistry>,
        store: Arc<dyn Store>,
        coordinator: Arc<ExecutionCoordinator>,
        config: SupervisorConfig,
        risk: RiskConfig,
    ) -> Self {
        Self {
            registry,
            store,
            coordinator,
            config,
            risk,
        }
    }

    /// Run until the task is aborted
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));
        info!(
            "position supervisor started ({}s poll)",
            self.config.poll_interval_secs
        );
        loop {
            ticker.tick().await;
            if let Err(e) = self.supervise_once().await {
                warn!("supervision cycle failed: {}", e);
            }
        }
    }

    /// One full pass: refresh, judge, sweep, snapshot
    pub async fn supervise_once(&self) -> Result<()> {
        let strategies = self.store.active_strategies().await?;
        for strategy in &strategies {
            if let Err(e) = self.supervise_strategy(strategy).await {
                warn!("supervision of {} failed: {}", strategy.id, e);
            }
        }
        self.sweep_orphaned_legs().await?;
        self.snapshot_exposure().await
    }

    async fn supervise_strategy(&self, strategy: &Strategy) -> Result<()> {
        let legs = self.refresh_legs(strategy).await?;
        let open: Vec<&Position> = legs
            .iter()
            .filter(|l| l.status == PositionStatus::Open)
            .collect();

        if open.is_empty() {
            // both legs vanished on-venue, nothing left to protect
            info!("strategy {} has no remaining legs, closing", strategy.id);
            return self.coordinator.close_strategy(strategy.id, None).await;
        }

        if let Some(reason) = self.kill_reason(&open) {
            info!("kill switch for {}: {}", strategy.id, reason);
            return self.coordinator.close_strategy(strategy.id, Some(reason)).await;
        }
        Ok(())
    }

    /// Pull the live view of every leg from its venue and persist it. A leg
    /// the venue no longer reports is marked closed locally.
    async fn refresh_legs(&self, strategy: &Strategy) -> Result<Vec<Position>> {
        let mut legs = self.store.positions_for_strategy(strategy.id).await?;

        for leg in legs.iter_mut() {
            if leg.status == PositionStatus::Closed {
                continue;
            }
            let client = self.registry.get(leg.venue)?;
            match client.get_position(&leg.instrument).await {
                Ok(Some(venue_position)) => {
                    leg.quantity = venue_position.quantity;
                    leg.mark_price = venue_position.mark_price;
                    leg.liquidation_price = venue_position.liquidation_price;
                    leg.unrealized_pnl = venue_position.unrealized_pnl;
                    self.store.update_position(leg).await?;
                }
                Ok(None) => {
                    warn!(
                        "{} reports no {} position for strategy {}",
                        leg.venue, leg.instrument, strategy.id
                    );
                    leg.status = PositionStatus::Closed;
                    self.store
                        .update_position_status(strategy.id, leg.venue, PositionStatus::Closed)
                        .await?;
                }
                Err(e) => {
                    // keep the stale view rather than misjudging the leg
                    warn!("{} position refresh failed: {}", leg.venue, e);
                }
            }
        }
        Ok(legs)
    }

    /// First triggered predicate wins
    fn kill_reason(&self, open: &[&Position]) -> Option<KillReason> {
        let cfg = &self.config;

        if open.len() != 2 || open[0].venue == open[1].venue {
            return Some(KillReason::SingleLeg);
        }

        for leg in open {
            if let Some(distance) = leg.distance_to_liquidation_pct() {
                if distance < cfg.near_liquidation_pct {
                    return Some(KillReason::NearLiquidation);
                }
            }
            if leg.drawdown_pct() > cfg.max_drawdown_pct {
                return Some(KillReason::MaxDrawdown);
            }
        }

        let (a, b) = (open[0].notional(), open[1].notional());
        let larger = a.max(b);
        if larger > Decimal::ZERO {
            let mismatch_pct = (a - b).abs() / larger * Decimal::from(100);
            if mismatch_pct > cfg.size_mismatch_pct {
                return Some(KillReason::SizeMismatch);
            }
        }

        let oversize_limit = self.risk.max_position_size * cfg.oversize_factor;
        if open.iter().any(|leg| leg.notional() > oversize_limit) {
            return Some(KillReason::OversizedPosition);
        }

        None
    }

    /// A leg whose close failed stays open on-venue after its strategy went
    /// terminal. Retry those closes every cycle until the venue confirms.
    async fn sweep_orphaned_legs(&self) -> Result<()> {
        for leg in self.store.open_positions().await? {
            let Some(strategy) = self.store.get_strategy(leg.strategy_id).await? else {
                continue;
            };
            if !strategy.status.is_terminal() {
                continue;
            }

            warn!(
                "{} leg of terminal strategy {} still open, retrying close",
                leg.venue, leg.strategy_id
            );
            let client = match self.registry.get(leg.venue) {
                Ok(client) => client,
                Err(e) => {
                    warn!("no adapter to close orphaned {} leg: {}", leg.venue, e);
                    continue;
                }
            };
            match client.close_position(&leg.instrument).await {
                Ok(_) => {
                    self.store
                        .update_position_status(leg.strategy_id, leg.venue, PositionStatus::Closed)
                        .await?;
                    info!("orphaned {} leg of {} closed", leg.venue, leg.strategy_id);
                }
                Err(e) => warn!("orphaned {} leg close failed: {}", leg.venue, e),
            }
        }
        Ok(())
    }

    async fn snapshot_exposure(&self) -> Result<()> {
        let positions = self.store.open_positions().await?;

        let mut total_exposure = Decimal::ZERO;
        let mut margin_used = Decimal::ZERO;
        let mut unrealized_pnl = Decimal::ZERO;
        let mut near_liquidation_count = 0u32;
        let mut max_drawdown_pct = Decimal::ZERO;

        for position in &positions {
            let notional = position.notional();
            total_exposure += notional;
            if position.leverage > 0 {
                margin_used += notional / Decimal::from(position.leverage);
            }
            unrealized_pnl += position.unrealized_pnl;
            if position
                .distance_to_liquidation_pct()
                .is_some_and(|d| d < self.config.near_liquidation_pct)
            {
                near_liquidation_count += 1;
            }
            max_drawdown_pct = max_drawdown_pct.max(position.drawdown_pct());
        }

        let margin_utilization = if self.risk.total_capital > Decimal::ZERO {
            margin_used / self.risk.total_capital
        } else {
            Decimal::ZERO
        };

        debug!(
            "exposure snapshot: ${} across {} legs, uPnL {}",
            total_exposure,
            positions.len(),
            unrealized_pnl
        );
        self.store
            .insert_risk_snapshot(&RiskSnapshot {
                total_exposure,
                margin_utilization,
                unrealized_pnl,
                near_liquidation_count,
                max_drawdown_pct,
                observed_at: Utc::now(),
            })
            .await
    }
}
