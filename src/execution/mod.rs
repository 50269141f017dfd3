//! Two-leg execution.
//!
//! Both legs go out concurrently as IOC orders. If either leg comes back
//! without a full fill, or the filled quantities diverge beyond tolerance,
//! every filled leg is unwound immediately with reduce-only closes and the
//! attempt is reported as failed. A venue call that times out is never
//! assumed unfilled: the venue position is re-queried first, since the order
//! may have landed.

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::adapters::store::event_kind;
use crate::adapters::{FeishuNotifier, NotifyEvent, Store};
use crate::config::{AnalyzerConfig, ExecutionConfig};
use crate::domain::{
    ArbitrageOpportunity, KillReason, OpportunityOutcome, OrderRequest, OrderSide, OrderStatus,
    Position, PositionSide, PositionStatus, Strategy, StrategyStatus, TradeResult, Venue,
};
use crate::error::{FundarbError, OrderError, Result};
use crate::exchange::{with_backoff, ExchangeClient, ExchangeRegistry};

pub struct ExecutionCoordinator {
    registry: Arc<ExchangeRegistry>,
    store: Arc<dyn Store>,
    notifier: Option<Arc<FeishuNotifier>>,
    config: ExecutionConfig,
    opportunity_ttl_secs: u64,
    /// Per-strategy close locks so concurrent close requests serialize
    close_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl ExecutionCoordinator {
    pub fn new(
        registry: Arc<ExchangeRegistry>,
        store: Arc<dyn Store>,
        notifier: Option<Arc<FeishuNotifier>>,
        config: ExecutionConfig,
        analyzer_config: &AnalyzerConfig,
    ) -> Self {
        Self {
            registry,
            store,
            notifier,
            config,
            opportunity_ttl_secs: analyzer_config.opportunity_ttl_secs,
            close_locks: DashMap::new(),
        }
    }

    async fn notify(&self, event: NotifyEvent) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(event).await;
        }
    }

    /// Execute one opportunity: open the long and short legs together.
    ///
    /// Returns the persisted strategy id on success. On any failure the
    /// filled legs have already been unwound (best effort) and the
    /// opportunity is marked rejected; no strategy id ever exists for a
    /// failed attempt.
    pub async fn execute(&self, opportunity: &ArbitrageOpportunity) -> Result<Uuid> {
        if !opportunity.is_fresh(self.opportunity_ttl_secs, Utc::now()) {
            self.reject(opportunity, "opportunity expired before execution")
                .await;
            return Err(FundarbError::Validation(format!(
                "opportunity {} is stale",
                opportunity.id
            )));
        }

        // The strategy id exists before any order goes out, and its lock is
        // held for the whole open so a close request for the same id queues
        // behind us.
        let strategy_id = Uuid::new_v4();
        let lock = self
            .close_locks
            .entry(strategy_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock().await;

        let result = self.open_legs(strategy_id, opportunity).await;
        drop(guard);
        if result.is_err() {
            // no strategy exists for a failed attempt, so no close will come
            self.close_locks.remove(&strategy_id);
        }
        result
    }

    async fn open_legs(
        &self,
        strategy_id: Uuid,
        opportunity: &ArbitrageOpportunity,
    ) -> Result<Uuid> {
        let long_client = self.registry.get(opportunity.long_venue)?;
        let short_client = self.registry.get(opportunity.short_venue)?;
        let instrument = opportunity.instrument.as_str();

        let (long_lev, short_lev) = tokio::join!(
            with_backoff("set_leverage", self.config.max_retries, || {
                long_client.set_leverage(instrument, self.config.leverage)
            }),
            with_backoff("set_leverage", self.config.max_retries, || {
                short_client.set_leverage(instrument, self.config.leverage)
            }),
        );
        if let Err(e) = long_lev.and(short_lev) {
            self.reject(opportunity, &format!("leverage setup failed: {}", e))
                .await;
            return Err(OrderError::LeverageSetup {
                venue: opportunity.long_venue.to_string(),
            }
            .into());
        }

        // Both legs carry the same base quantity, priced off the long side's
        // touch so the hedge is quantity-neutral.
        let book = long_client.get_order_book(instrument, 1).await?;
        let reference_price = book.best_ask().ok_or_else(|| {
            FundarbError::InsufficientLiquidity(format!(
                "{} has no asks on {}",
                instrument, opportunity.long_venue
            ))
        })?;
        let quantity = (opportunity.optimal_notional / reference_price).round_dp(6);

        let long_request = OrderRequest::ioc(instrument, OrderSide::Buy, quantity);
        let short_request = OrderRequest::ioc(instrument, OrderSide::Sell, quantity);

        let (long_result, short_result) = tokio::join!(
            self.submit_leg(&long_client, &long_request),
            self.submit_leg(&short_client, &short_request),
        );

        // An errored leg counts as unfilled, never as fatal on its own: the
        // other leg may hold a live fill that must go through the same
        // verification and unwind path as any other asymmetry.
        let long_trade = match long_result {
            Ok(trade) => trade,
            Err(e) => {
                warn!("{} leg submission failed: {}", opportunity.long_venue, e);
                failed_trade(opportunity.long_venue, &long_request)
            }
        };
        let short_trade = match short_result {
            Ok(trade) => trade,
            Err(e) => {
                warn!("{} leg submission failed: {}", opportunity.short_venue, e);
                failed_trade(opportunity.short_venue, &short_request)
            }
        };

        if let Err(order_error) = self.verify_fills(&long_trade, &short_trade) {
            self.unwind(&long_client, &long_trade, &short_client, &short_trade)
                .await;
            self.reject(opportunity, &order_error.to_string()).await;
            return Err(order_error.into());
        }

        self.persist_strategy(strategy_id, opportunity, &long_trade, &short_trade)
            .await
    }

    /// Submit one leg with a timeout. On timeout the venue position is the
    /// source of truth for whether the order landed.
    async fn submit_leg(
        &self,
        client: &Arc<dyn ExchangeClient>,
        request: &OrderRequest,
    ) -> Result<TradeResult> {
        let deadline = Duration::from_millis(self.config.order_timeout_ms);
        match timeout(deadline, client.execute_order(request)).await {
            Ok(Ok(trade)) => Ok(trade),
            Ok(Err(FundarbError::VenueTimeout(reason))) => {
                warn!(
                    "{} order call timed out ({}), reconciling against the venue",
                    client.venue(),
                    reason
                );
                self.reconcile_leg(client, request).await
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(
                    "{} order call exceeded {}ms, reconciling against the venue",
                    client.venue(),
                    self.config.order_timeout_ms
                );
                self.reconcile_leg(client, request).await
            }
        }
    }

    async fn reconcile_leg(
        &self,
        client: &Arc<dyn ExchangeClient>,
        request: &OrderRequest,
    ) -> Result<TradeResult> {
        let position = client.get_position(&request.instrument).await?;
        let (filled_qty, avg_price, status) = match position {
            Some(pos) => (pos.quantity, pos.entry_price, OrderStatus::Filled),
            None => (Decimal::ZERO, Decimal::ZERO, OrderStatus::Failed),
        };
        Ok(TradeResult {
            order_id: request.client_order_id.clone(),
            venue: client.venue(),
            instrument: request.instrument.clone(),
            side: request.side,
            filled_qty,
            avg_price,
            fees: Decimal::ZERO,
            status,
            executed_at: Utc::now(),
        })
    }

    fn verify_fills(
        &self,
        long: &TradeResult,
        short: &TradeResult,
    ) -> std::result::Result<(), OrderError> {
        for leg in [long, short] {
            if !leg.status.is_filled() {
                return Err(OrderError::LegNotFilled {
                    venue: leg.venue.to_string(),
                    status: leg.status.to_string(),
                });
            }
        }

        let avg_qty = (long.filled_qty + short.filled_qty) / Decimal::TWO;
        if avg_qty.is_zero() {
            return Err(OrderError::LegNotFilled {
                venue: long.venue.to_string(),
                status: OrderStatus::Failed.to_string(),
            });
        }
        let mismatch = (long.filled_qty - short.filled_qty).abs() / avg_qty;
        if mismatch > self.config.fill_tolerance {
            return Err(OrderError::QuantityMismatch {
                long_qty: long.filled_qty,
                short_qty: short.filled_qty,
            });
        }
        Ok(())
    }

    /// Best-effort unwind of whatever filled. Legs that fail to close stay
    /// on the venue for the supervisor to flag.
    async fn unwind(
        &self,
        long_client: &Arc<dyn ExchangeClient>,
        long_trade: &TradeResult,
        short_client: &Arc<dyn ExchangeClient>,
        short_trade: &TradeResult,
    ) {
        let close_long = async {
            if long_trade.status.has_fill() {
                self.unwind_leg(long_client, long_trade, OrderSide::Sell).await;
            }
        };
        let close_short = async {
            if short_trade.status.has_fill() {
                self.unwind_leg(short_client, short_trade, OrderSide::Buy).await;
            }
        };
        tokio::join!(close_long, close_short);
    }

    async fn unwind_leg(
        &self,
        client: &Arc<dyn ExchangeClient>,
        trade: &TradeResult,
        close_side: OrderSide,
    ) {
        let request =
            OrderRequest::reduce_only(&trade.instrument, close_side, trade.filled_qty);
        match client.execute_order(&request).await {
            Ok(result) if result.status.has_fill() => {
                info!("{} leg unwound ({} {})", trade.venue, result.filled_qty, trade.instrument);
            }
            Ok(result) => {
                error!("{} unwind came back {}", trade.venue, result.status);
            }
            Err(e) => {
                error!("{} unwind failed: {}", trade.venue, e);
            }
        }
    }

    async fn reject(&self, opportunity: &ArbitrageOpportunity, reason: &str) {
        warn!("execution of {} failed: {}", opportunity.id, reason);
        if let Err(e) = self
            .store
            .mark_opportunity(opportunity.id, OpportunityOutcome::Rejected)
            .await
        {
            warn!("failed to mark opportunity {}: {}", opportunity.id, e);
        }
        if let Err(e) = self
            .store
            .record_event(
                event_kind::EXECUTION_FAILED,
                serde_json::json!({
                    "opportunity_id": opportunity.id,
                    "instrument": opportunity.instrument,
                    "reason": reason,
                }),
            )
            .await
        {
            warn!("failed to record execution failure: {}", e);
        }
        self.notify(NotifyEvent::RiskWarning {
            message: format!(
                "execution failed for {}: {}",
                opportunity.instrument, reason
            ),
        })
        .await;
    }

    async fn persist_strategy(
        &self,
        strategy_id: Uuid,
        opportunity: &ArbitrageOpportunity,
        long_trade: &TradeResult,
        short_trade: &TradeResult,
    ) -> Result<Uuid> {
        let strategy = Strategy {
            id: strategy_id,
            instrument: opportunity.instrument.clone(),
            long_venue: opportunity.long_venue,
            short_venue: opportunity.short_venue,
            entry_time: Utc::now(),
            exit_time: None,
            expected_profit_bps: opportunity.spread_bps,
            realized_pnl: None,
            status: StrategyStatus::Active,
        };
        let legs = [
            position_from_trade(&strategy, long_trade, PositionSide::Long, self.config.leverage),
            position_from_trade(&strategy, short_trade, PositionSide::Short, self.config.leverage),
        ];

        if let Err(e) = self.store.insert_strategy(&strategy, &legs).await {
            // Capital is already deployed on both venues but the strategy row
            // is missing; this must be reconciled by an operator, not retried.
            error!(
                "INTEGRITY: strategy {} executed but not persisted: {}",
                strategy.id, e
            );
            let _ = self
                .store
                .record_event(
                    event_kind::INTEGRITY_INCIDENT,
                    serde_json::json!({
                        "strategy_id": strategy.id,
                        "opportunity_id": opportunity.id,
                        "error": e.to_string(),
                    }),
                )
                .await;
            return Err(FundarbError::DataIntegrity(format!(
                "strategy {} executed but not persisted",
                strategy.id
            )));
        }

        for trade in [long_trade, short_trade] {
            if let Err(e) = self.store.insert_trade(strategy.id, trade).await {
                warn!("failed to record trade {}: {}", trade.order_id, e);
            }
        }
        if let Err(e) = self
            .store
            .mark_opportunity(opportunity.id, OpportunityOutcome::Executed)
            .await
        {
            warn!("failed to mark opportunity {}: {}", opportunity.id, e);
        }

        info!(
            "strategy {} opened: long {} / short {} {} @ ${}",
            strategy.id,
            opportunity.long_venue,
            opportunity.short_venue,
            opportunity.instrument,
            opportunity.optimal_notional
        );
        self.notify(NotifyEvent::TradeExecuted {
            strategy_id: strategy.id,
            instrument: strategy.instrument.clone(),
            long_venue: strategy.long_venue.to_string(),
            short_venue: strategy.short_venue.to_string(),
            notional: opportunity.optimal_notional,
            expected_profit_bps: opportunity.spread_bps,
        })
        .await;

        Ok(strategy.id)
    }

    /// Close both legs of a strategy. Idempotent: closing a strategy that is
    /// already terminal is a no-op. A `reason` marks the close as a kill.
    pub async fn close_strategy(&self, id: Uuid, reason: Option<KillReason>) -> Result<()> {
        let lock = self
            .close_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock().await;

        let strategy = self
            .store
            .get_strategy(id)
            .await?
            .ok_or(FundarbError::StrategyNotFound(id))?;
        if strategy.status.is_terminal() {
            drop(guard);
            self.close_locks.remove(&id);
            return Ok(());
        }

        self.store
            .update_strategy_status(id, StrategyStatus::Closing, None, None)
            .await?;

        let legs = self.store.positions_for_strategy(id).await?;
        let mut realized_pnl = Decimal::ZERO;
        let closes = legs
            .iter()
            .filter(|leg| leg.status != PositionStatus::Closed)
            .map(|leg| self.close_leg(leg));
        let outcomes = futures::future::join_all(closes).await;
        for (leg, closed) in legs
            .iter()
            .filter(|leg| leg.status != PositionStatus::Closed)
            .zip(outcomes)
        {
            if closed {
                realized_pnl += leg.unrealized_pnl;
                self.store
                    .update_position_status(id, leg.venue, PositionStatus::Closed)
                    .await?;
            } else {
                warn!("{} leg of {} left open after failed close", leg.venue, id);
            }
        }

        let final_status = if reason.is_some() {
            StrategyStatus::Killed
        } else {
            StrategyStatus::Closed
        };
        self.store
            .update_strategy_status(id, final_status, Some(Utc::now()), Some(realized_pnl))
            .await?;

        match reason {
            Some(kill_reason) => {
                self.store
                    .record_event(
                        event_kind::KILL_SWITCH,
                        serde_json::json!({
                            "strategy_id": id,
                            "instrument": strategy.instrument,
                            "reason": kill_reason.as_str(),
                        }),
                    )
                    .await?;
                self.notify(NotifyEvent::PositionKilled {
                    strategy_id: id,
                    instrument: strategy.instrument.clone(),
                    reason: kill_reason,
                })
                .await;
                info!("strategy {} killed: {}", id, kill_reason);
            }
            None => {
                self.store
                    .record_event(
                        event_kind::STRATEGY_CLOSED,
                        serde_json::json!({ "strategy_id": id }),
                    )
                    .await?;
                info!("strategy {} closed", id);
            }
        }

        // Terminal now; a racing close re-checks status before acting, so
        // dropping the table entry is safe.
        drop(guard);
        self.close_locks.remove(&id);
        Ok(())
    }

    #[cfg(test)]
    fn lock_table_len(&self) -> usize {
        self.close_locks.len()
    }

    async fn close_leg(&self, leg: &Position) -> bool {
        match self.registry.get(leg.venue) {
            Ok(client) => match client.close_position(&leg.instrument).await {
                Ok(_) => true,
                Err(e) => {
                    error!("{} close of {} failed: {}", leg.venue, leg.instrument, e);
                    false
                }
            },
            Err(e) => {
                error!("no adapter to close {} leg: {}", leg.venue, e);
                false
            }
        }
    }
}

fn failed_trade(venue: Venue, request: &OrderRequest) -> TradeResult {
    TradeResult {
        order_id: request.client_order_id.clone(),
        venue,
        instrument: request.instrument.clone(),
        side: request.side,
        filled_qty: Decimal::ZERO,
        avg_price: Decimal::ZERO,
        fees: Decimal::ZERO,
        status: OrderStatus::Failed,
        executed_at: Utc::now(),
    }
}

fn position_from_trade(
    strategy: &Strategy,
    trade: &TradeResult,
    side: PositionSide,
    leverage: u32,
) -> Position {
    Position {
        strategy_id: strategy.id,
        venue: trade.venue,
        instrument: trade.instrument.clone(),
        side,
        entry_price: trade.avg_price,
        quantity: trade.filled_qty,
        leverage,
        liquidation_price: None,
        mark_price: trade.avg_price,
        unrealized_pnl: Decimal::ZERO,
        status: PositionStatus::Open,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    use crate::adapters::MemoryStore;
    use crate::config::tests::test_config;
    use crate::domain::Venue;
    use crate::exchange::{PaperExchange, PaperFill};

    struct Harness {
        coordinator: ExecutionCoordinator,
        store: Arc<MemoryStore>,
        long_venue: Arc<PaperExchange>,
        short_venue: Arc<PaperExchange>,
    }

    async fn harness() -> Harness {
        let config = test_config();
        let long_venue = Arc::new(PaperExchange::new(Venue::Binance));
        long_venue.set_instrument("BTCUSDT", dec!(0.0001), dec!(50000)).await;
        let short_venue = Arc::new(PaperExchange::new(Venue::Bybit));
        short_venue.set_instrument("BTCUSDT", dec!(0.0015), dec!(50010)).await;

        let registry = Arc::new(
            ExchangeRegistry::new()
                .register(long_venue.clone() as Arc<dyn ExchangeClient>)
                .register(short_venue.clone() as Arc<dyn ExchangeClient>),
        );
        let store = Arc::new(MemoryStore::new());
        let coordinator = ExecutionCoordinator::new(
            registry,
            store.clone(),
            None,
            config.execution.clone(),
            &config.analyzer,
        );
        Harness {
            coordinator,
            store,
            long_venue,
            short_venue,
        }
    }

    fn opportunity() -> ArbitrageOpportunity {
        ArbitrageOpportunity {
            id: Uuid::new_v4(),
            instrument: "BTCUSDT".to_string(),
            long_venue: Venue::Binance,
            short_venue: Venue::Bybit,
            long_rate: dec!(0.0001),
            short_rate: dec!(0.0015),
            rate_spread: dec!(0.0014),
            spread_bps: dec!(14),
            estimated_daily_profit: dec!(16),
            optimal_notional: dec!(1000),
            confidence: dec!(0.85),
            risk_score: dec!(0.3),
            discovered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn successful_execution_opens_both_legs() {
        let h = harness().await;
        let opp = opportunity();
        h.store.insert_opportunity(&opp).await.expect("seed");

        let strategy_id = h.coordinator.execute(&opp).await.expect("executes");

        let strategy = h
            .store
            .get_strategy(strategy_id)
            .await
            .expect("query")
            .expect("persisted");
        assert_eq!(strategy.status, StrategyStatus::Active);

        let legs = h
            .store
            .positions_for_strategy(strategy_id)
            .await
            .expect("legs");
        assert_eq!(legs.len(), 2);
        assert!(legs.iter().all(|l| l.status == PositionStatus::Open));
        assert_eq!(h.store.trade_count().await, 2);
        assert_eq!(
            h.store.opportunity_outcome(opp.id).await,
            Some(OpportunityOutcome::Executed)
        );
    }

    #[tokio::test]
    async fn rejected_leg_rolls_back_the_filled_one() {
        let h = harness().await;
        h.short_venue.set_fill_behavior(PaperFill::Reject).await;
        let opp = opportunity();
        h.store.insert_opportunity(&opp).await.expect("seed");

        let result = h.coordinator.execute(&opp).await;
        assert!(result.is_err());

        // the long fill was unwound, nothing persisted as a strategy
        assert!(h
            .long_venue
            .get_position("BTCUSDT")
            .await
            .expect("query")
            .is_none());
        assert!(h.store.active_strategies().await.expect("query").is_empty());
        assert_eq!(
            h.store.opportunity_outcome(opp.id).await,
            Some(OpportunityOutcome::Rejected)
        );
        assert_eq!(h.store.event_count(event_kind::EXECUTION_FAILED).await, 1);
    }

    #[tokio::test]
    async fn errored_leg_rolls_back_the_filled_one() {
        // the short venue never lists the instrument, so its submission
        // errors outright instead of timing out or rejecting
        let config = test_config();
        let long_venue = Arc::new(PaperExchange::new(Venue::Binance));
        long_venue.set_instrument("BTCUSDT", dec!(0.0001), dec!(50000)).await;
        let short_venue = Arc::new(PaperExchange::new(Venue::Bybit));

        let registry = Arc::new(
            ExchangeRegistry::new()
                .register(long_venue.clone() as Arc<dyn ExchangeClient>)
                .register(short_venue.clone() as Arc<dyn ExchangeClient>),
        );
        let store = Arc::new(MemoryStore::new());
        let coordinator = ExecutionCoordinator::new(
            registry,
            store.clone(),
            None,
            config.execution.clone(),
            &config.analyzer,
        );
        let opp = opportunity();
        store.insert_opportunity(&opp).await.expect("seed");

        assert!(coordinator.execute(&opp).await.is_err());

        // the long fill was unwound, the failure was audited, no orphan
        assert!(long_venue
            .get_position("BTCUSDT")
            .await
            .expect("query")
            .is_none());
        assert!(store.active_strategies().await.expect("query").is_empty());
        assert_eq!(
            store.opportunity_outcome(opp.id).await,
            Some(OpportunityOutcome::Rejected)
        );
        assert_eq!(store.event_count(event_kind::EXECUTION_FAILED).await, 1);
        assert_eq!(coordinator.lock_table_len(), 0);
    }

    #[tokio::test]
    async fn quantity_mismatch_beyond_tolerance_rolls_back() {
        let h = harness().await;
        h.short_venue.set_fill_behavior(PaperFill::Partial(50)).await;
        let opp = opportunity();
        h.store.insert_opportunity(&opp).await.expect("seed");

        assert!(h.coordinator.execute(&opp).await.is_err());
        assert!(h
            .long_venue
            .get_position("BTCUSDT")
            .await
            .expect("query")
            .is_none());
        assert!(h
            .short_venue
            .get_position("BTCUSDT")
            .await
            .expect("query")
            .is_none());
    }

    #[tokio::test]
    async fn network_failure_reconciles_before_assuming_unfilled() {
        let h = harness().await;
        h.short_venue.set_fill_behavior(PaperFill::NetworkError).await;
        let opp = opportunity();
        h.store.insert_opportunity(&opp).await.expect("seed");

        // both venues share the scripted behavior object per venue, so only
        // the short leg errors; it reconciles to unfilled and rolls back
        assert!(h.coordinator.execute(&opp).await.is_err());
        assert!(h.store.active_strategies().await.expect("query").is_empty());
    }

    #[tokio::test]
    async fn stale_opportunity_is_never_executed() {
        let h = harness().await;
        let mut opp = opportunity();
        opp.discovered_at = Utc::now() - ChronoDuration::minutes(30);
        h.store.insert_opportunity(&opp).await.expect("seed");

        assert!(h.coordinator.execute(&opp).await.is_err());
        assert_eq!(
            h.store.opportunity_outcome(opp.id).await,
            Some(OpportunityOutcome::Rejected)
        );
        assert!(h
            .long_venue
            .get_position("BTCUSDT")
            .await
            .expect("query")
            .is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let h = harness().await;
        let opp = opportunity();
        h.store.insert_opportunity(&opp).await.expect("seed");
        let id = h.coordinator.execute(&opp).await.expect("executes");

        h.coordinator.close_strategy(id, None).await.expect("first close");
        h.coordinator.close_strategy(id, None).await.expect("second close is a no-op");

        let strategy = h.store.get_strategy(id).await.expect("query").expect("exists");
        assert_eq!(strategy.status, StrategyStatus::Closed);
        assert!(strategy.exit_time.is_some());
        assert_eq!(h.store.event_count(event_kind::STRATEGY_CLOSED).await, 1);
        assert!(h
            .long_venue
            .get_position("BTCUSDT")
            .await
            .expect("query")
            .is_none());
    }

    #[tokio::test]
    async fn lock_table_is_pruned_after_terminal_close() {
        let h = harness().await;
        let opp = opportunity();
        h.store.insert_opportunity(&opp).await.expect("seed");
        let id = h.coordinator.execute(&opp).await.expect("executes");
        assert_eq!(h.coordinator.lock_table_len(), 1);

        h.coordinator.close_strategy(id, None).await.expect("close");
        assert_eq!(h.coordinator.lock_table_len(), 0);

        // a repeated close takes the early terminal path and leaves no entry
        h.coordinator.close_strategy(id, None).await.expect("no-op");
        assert_eq!(h.coordinator.lock_table_len(), 0);
    }

    #[tokio::test]
    async fn killed_close_records_a_kill_switch_event() {
        let h = harness().await;
        let opp = opportunity();
        h.store.insert_opportunity(&opp).await.expect("seed");
        let id = h.coordinator.execute(&opp).await.expect("executes");

        h.coordinator
            .close_strategy(id, Some(KillReason::NearLiquidation))
            .await
            .expect("kill close");

        let strategy = h.store.get_strategy(id).await.expect("query").expect("exists");
        assert_eq!(strategy.status, StrategyStatus::Killed);
        assert_eq!(h.store.event_count(event_kind::KILL_SWITCH).await, 1);
        assert!(h
            .store
            .last_kill_event_at()
            .await
            .expect("query")
            .is_some());
    }
}
