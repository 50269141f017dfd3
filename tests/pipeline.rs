//! End-to-end pipeline: analysis -> risk gate -> execution -> supervision,
//! all against paper venues and the in-memory store.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use fundarb::adapters::store::event_kind;
use fundarb::adapters::{MemoryStore, Store};
use fundarb::analyzer::OpportunityAnalyzer;
use fundarb::config::{
    AnalyzerConfig, DatabaseConfig, DryRunConfig, ExecutionConfig, LoggingConfig, MarketConfig,
    RiskConfig, SupervisorConfig,
};
use fundarb::domain::{FundingRate, OpportunityOutcome, PositionStatus, StrategyStatus, Venue};
use fundarb::exchange::{ExchangeClient, ExchangeRegistry, PaperExchange, PaperFill};
use fundarb::execution::ExecutionCoordinator;
use fundarb::marketdata::LiveMarketData;
use fundarb::risk::{ExposureBook, RiskLimitEngine};
use fundarb::supervisor::PositionSupervisor;
use fundarb::AppConfig;

struct Pipeline {
    analyzer: OpportunityAnalyzer,
    risk_engine: RiskLimitEngine,
    coordinator: Arc<ExecutionCoordinator>,
    supervisor: PositionSupervisor,
    store: Arc<MemoryStore>,
    long_venue: Arc<PaperExchange>,
    short_venue: Arc<PaperExchange>,
}

async fn seed_history(store: &MemoryStore, venue: Venue, rate: Decimal) {
    let now = Utc::now();
    for i in 0..9 {
        store
            .insert_funding_rate(&FundingRate {
                venue,
                instrument: "BTCUSDT".to_string(),
                rate,
                observed_at: now - Duration::hours(8 * i),
                next_funding_at: None,
            })
            .await
            .expect("seed history");
    }
}

async fn pipeline(config: AppConfig) -> Pipeline {
    let long_venue = Arc::new(PaperExchange::new(Venue::Binance));
    long_venue
        .set_instrument("BTCUSDT", dec!(0.0001), dec!(50000))
        .await;
    let short_venue = Arc::new(PaperExchange::new(Venue::Bybit));
    short_venue
        .set_instrument("BTCUSDT", dec!(0.0015), dec!(50010))
        .await;

    let registry = Arc::new(
        ExchangeRegistry::new()
            .register(long_venue.clone() as Arc<dyn ExchangeClient>)
            .register(short_venue.clone() as Arc<dyn ExchangeClient>),
    );
    let store = Arc::new(MemoryStore::new());
    seed_history(&store, Venue::Binance, dec!(0.0001)).await;
    seed_history(&store, Venue::Bybit, dec!(0.0015)).await;

    let market = Arc::new(LiveMarketData::new(
        registry.clone(),
        store.clone(),
        &config.market,
    ));
    let coordinator = Arc::new(ExecutionCoordinator::new(
        registry.clone(),
        store.clone(),
        None,
        config.execution.clone(),
        &config.analyzer,
    ));

    Pipeline {
        analyzer: OpportunityAnalyzer::new(market, store.clone(), config.clone()),
        risk_engine: RiskLimitEngine::new(config.risk.clone()),
        supervisor: PositionSupervisor::new(
            registry,
            store.clone(),
            coordinator.clone(),
            config.supervisor.clone(),
            config.risk.clone(),
        ),
        coordinator,
        store,
        long_venue,
        short_venue,
    }
}

fn lenient_config() -> AppConfig {
    AppConfig {
        market: MarketConfig {
            venues: vec!["binance".to_string(), "bybit".to_string()],
            instruments: vec!["BTCUSDT".to_string()],
            collect_interval_secs: 300,
            rate_limit_requests: 100,
            rate_limit_window_ms: 1000,
        },
        analyzer: AnalyzerConfig {
            interval_secs: 60,
            min_spread_bps: dec!(10),
            persistence_window_hours: 72,
            min_samples_per_venue: 5,
            funding_period_hours: 8,
            min_funding_rate_threshold: dec!(0.40),
            slippage_budget: dec!(0.005),
            capital_allocation: dec!(10000),
            order_book_depth: 50,
            taker_fee: dec!(0.0005),
            low_risk_instruments: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            opportunity_ttl_secs: 300,
        },
        execution: ExecutionConfig::default(),
        risk: RiskConfig {
            total_capital: dec!(10000),
            max_exposure_pct: dec!(0.8),
            max_concentration_pct: dec!(0.6),
            max_concurrent_strategies: 3,
            min_position_size: dec!(100),
            max_position_size: dec!(5000),
            max_risk_score: dec!(0.7),
            min_confidence: dec!(0.4),
            kill_switch_cooldown_secs: 3600,
        },
        supervisor: SupervisorConfig::default(),
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 5,
        },
        dry_run: DryRunConfig { enabled: true },
        logging: LoggingConfig::default(),
        health_port: None,
    }
}

#[tokio::test]
async fn analysis_to_open_strategy() {
    let p = pipeline(lenient_config()).await;

    let found = p.analyzer.find_opportunities().await;
    assert_eq!(found.len(), 1);
    let opportunity = &found[0];
    assert_eq!(opportunity.long_venue, Venue::Binance);
    assert_eq!(opportunity.short_venue, Venue::Bybit);
    assert_eq!(opportunity.spread_bps, dec!(14));

    let book = ExposureBook::load(p.store.as_ref())
        .await
        .expect("book");
    assert!(p.risk_engine.validate(opportunity, &book).allowed);

    let strategy_id = p.coordinator.execute(opportunity).await.expect("executes");
    let legs = p
        .store
        .positions_for_strategy(strategy_id)
        .await
        .expect("legs");
    assert_eq!(legs.len(), 2);
    assert!(legs.iter().all(|l| l.status == PositionStatus::Open));
    assert_eq!(
        p.store.opportunity_outcome(opportunity.id).await,
        Some(OpportunityOutcome::Executed)
    );

    // the new exposure now shows up in the next risk check
    let book = ExposureBook::load(p.store.as_ref())
        .await
        .expect("book");
    assert_eq!(book.active_strategies, 1);
    assert!(book.total_notional > Decimal::ZERO);
}

#[tokio::test]
async fn failed_leg_never_leaves_a_one_sided_position() {
    let p = pipeline(lenient_config()).await;
    p.short_venue.set_fill_behavior(PaperFill::Reject).await;

    let found = p.analyzer.find_opportunities().await;
    assert_eq!(found.len(), 1);

    assert!(p.coordinator.execute(&found[0]).await.is_err());

    // the long fill was rolled back on-venue and no strategy exists
    assert!(p
        .long_venue
        .get_position("BTCUSDT")
        .await
        .expect("query")
        .is_none());
    assert!(p.store.active_strategies().await.expect("query").is_empty());
    assert_eq!(
        p.store.opportunity_outcome(found[0].id).await,
        Some(OpportunityOutcome::Rejected)
    );
}

#[tokio::test]
async fn kill_switch_flows_back_into_the_risk_gate() {
    let p = pipeline(lenient_config()).await;

    let found = p.analyzer.find_opportunities().await;
    let strategy_id = p.coordinator.execute(&found[0]).await.expect("executes");

    // a leg disappears on-venue; the supervisor kills the survivor
    p.short_venue.drop_position("BTCUSDT").await;
    p.supervisor.supervise_once().await.expect("cycle");

    let strategy = p
        .store
        .get_strategy(strategy_id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(strategy.status, StrategyStatus::Killed);
    assert_eq!(p.store.event_count(event_kind::KILL_SWITCH).await, 1);

    // new opportunities are paused for the cooldown window
    let found = p.analyzer.find_opportunities().await;
    assert_eq!(found.len(), 1);
    let book = ExposureBook::load(p.store.as_ref())
        .await
        .expect("book");
    let decision = p.risk_engine.validate(&found[0], &book);
    assert!(!decision.allowed);
    assert!(decision.reason.expect("reason").contains("cooldown"));
}

#[tokio::test]
async fn supervision_snapshots_exposure_every_cycle() {
    let p = pipeline(lenient_config()).await;
    let found = p.analyzer.find_opportunities().await;
    p.coordinator.execute(&found[0]).await.expect("executes");

    p.supervisor.supervise_once().await.expect("first");
    p.supervisor.supervise_once().await.expect("second");
    assert_eq!(p.store.risk_snapshot_count().await, 2);
}
