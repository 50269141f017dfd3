use clap::{Parser, Subcommand};
use fundarb::adapters::{FeishuNotifier, MemoryStore, NotifyEvent, PostgresStore, Store};
use fundarb::analyzer::OpportunityAnalyzer;
use fundarb::config::{AppConfig, LoggingConfig};
use fundarb::domain::parse_venue;
use fundarb::error::{FundarbError, Result};
use fundarb::exchange::{ExchangeRegistry, PaperExchange};
use fundarb::execution::ExecutionCoordinator;
use fundarb::marketdata::{self, LiveMarketData};
use fundarb::risk::{ExposureBook, RiskLimitEngine};
use fundarb::services::{AppState, StatusServer};
use fundarb::supervisor::PositionSupervisor;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "fundarb")]
#[command(author, version, about = "Cross-venue perpetual funding-rate arbitrage bot")]
struct Cli {
    /// Configuration directory
    #[arg(long, default_value = "config")]
    config_dir: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the engine (default)
    Run,
    /// Close one strategy's legs and mark it closed
    Close {
        #[arg(long)]
        strategy_id: Uuid,
    },
    /// Print active strategies and current exposure
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config_dir)?;
    init_logging(&config.logging);

    match cli.command {
        Some(Commands::Close { strategy_id }) => run_close(config, strategy_id).await,
        Some(Commands::Status) => run_status(config).await,
        Some(Commands::Run) | None => run_engine(config).await,
    }
}

async fn run_engine(config: AppConfig) -> Result<()> {
    info!(
        "starting funding arbitrage engine ({} mode)",
        if config.dry_run.enabled { "dry-run" } else { "live" }
    );

    let store = build_store(&config).await?;
    let registry = build_registry(&config).await?;
    let notifier = FeishuNotifier::from_env();

    let market = Arc::new(LiveMarketData::new(
        registry.clone(),
        store.clone(),
        &config.market,
    ));
    let analyzer = Arc::new(OpportunityAnalyzer::new(
        market.clone(),
        store.clone(),
        config.clone(),
    ));
    let risk_engine = Arc::new(RiskLimitEngine::new(config.risk.clone()));
    let coordinator = Arc::new(ExecutionCoordinator::new(
        registry.clone(),
        store.clone(),
        notifier.clone(),
        config.execution.clone(),
        &config.analyzer,
    ));
    let supervisor = Arc::new(PositionSupervisor::new(
        registry.clone(),
        store.clone(),
        coordinator.clone(),
        config.supervisor.clone(),
        config.risk.clone(),
    ));
    let app_state = AppState::new(store.clone(), coordinator.clone());

    if let Some(notifier) = &notifier {
        notifier
            .notify_startup(
                &config.market.venues,
                &config.market.instruments,
                config.dry_run.enabled,
            )
            .await;
    }

    let collector_handle = tokio::spawn(marketdata::run_collector(
        market.clone(),
        config.market.collect_interval_secs,
    ));
    let supervisor_handle = tokio::spawn(supervisor.run());
    let health_handle = {
        let server = StatusServer::new(app_state.clone(), config.health_port.unwrap_or(8080));
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("status server exited: {}", e);
            }
        })
    };
    let analysis_handle = tokio::spawn(analysis_loop(
        config.clone(),
        analyzer,
        risk_engine,
        coordinator,
        store,
        notifier,
        app_state,
    ));

    shutdown_signal().await;
    info!("shutdown signal received, stopping");
    collector_handle.abort();
    supervisor_handle.abort();
    analysis_handle.abort();
    health_handle.abort();
    Ok(())
}

/// Analyze, gate, execute. One cycle per interval; failures of a single
/// opportunity never stop the loop.
async fn analysis_loop(
    config: AppConfig,
    analyzer: Arc<OpportunityAnalyzer>,
    risk_engine: Arc<RiskLimitEngine>,
    coordinator: Arc<ExecutionCoordinator>,
    store: Arc<dyn Store>,
    notifier: Option<Arc<FeishuNotifier>>,
    app_state: Arc<AppState>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.analyzer.interval_secs.max(1)));
    info!(
        "analysis loop started ({}s interval)",
        config.analyzer.interval_secs
    );

    loop {
        ticker.tick().await;
        let opportunities = analyzer.find_opportunities().await;
        app_state.record_analysis().await;

        if let Some(notifier) = &notifier {
            for opportunity in &opportunities {
                notifier
                    .notify(NotifyEvent::OpportunityFound {
                        opportunity: opportunity.clone(),
                    })
                    .await;
            }
        }

        for opportunity in opportunities {
            if opportunity.estimated_daily_profit <= Decimal::ZERO {
                info!(
                    "opportunity {} has no expected profit net of fees, not trading",
                    opportunity.id
                );
                continue;
            }

            let book = match ExposureBook::load(store.as_ref()).await {
                Ok(book) => book,
                Err(e) => {
                    warn!("exposure book unavailable, skipping cycle: {}", e);
                    break;
                }
            };

            let decision = risk_engine.validate(&opportunity, &book);
            if !decision.allowed {
                info!(
                    "opportunity {} rejected: {}",
                    opportunity.id,
                    decision.reason.as_deref().unwrap_or("unknown")
                );
                if let Err(e) = store
                    .mark_opportunity(
                        opportunity.id,
                        fundarb::domain::OpportunityOutcome::Rejected,
                    )
                    .await
                {
                    warn!("failed to mark opportunity {}: {}", opportunity.id, e);
                }
                continue;
            }

            match coordinator.execute(&opportunity).await {
                Ok(strategy_id) => info!("opened strategy {}", strategy_id),
                Err(e) => warn!("execution of {} failed: {}", opportunity.id, e),
            }
        }
    }
}

async fn run_close(config: AppConfig, strategy_id: Uuid) -> Result<()> {
    let store = build_store(&config).await?;
    let registry = build_registry(&config).await?;
    let coordinator = ExecutionCoordinator::new(
        registry,
        store,
        FeishuNotifier::from_env(),
        config.execution.clone(),
        &config.analyzer,
    );

    coordinator.close_strategy(strategy_id, None).await?;
    info!("strategy {} closed", strategy_id);
    Ok(())
}

async fn run_status(config: AppConfig) -> Result<()> {
    let store = build_store(&config).await?;
    let strategies = store.active_strategies().await?;
    let book = ExposureBook::load(store.as_ref()).await?;

    println!("active strategies: {}", strategies.len());
    for strategy in &strategies {
        println!(
            "  {}  {}  long {} / short {}  entered {}",
            strategy.id,
            strategy.instrument,
            strategy.long_venue,
            strategy.short_venue,
            strategy.entry_time
        );
    }
    println!("total notional: {}", book.total_notional);
    match book.last_kill_event {
        Some(at) => println!("last kill event: {}", at),
        None => println!("last kill event: none"),
    }
    Ok(())
}

async fn build_store(config: &AppConfig) -> Result<Arc<dyn Store>> {
    if config.database.url.is_empty() {
        warn!("no database URL configured, using the in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = PostgresStore::new(&config.database.url, config.database.max_connections).await?;
    store.migrate().await?;
    Ok(Arc::new(store))
}

/// Dry-run mode wires one paper venue per configured venue name, seeded with
/// synthetic funding rates so the whole pipeline runs end to end.
async fn build_registry(config: &AppConfig) -> Result<Arc<ExchangeRegistry>> {
    if !config.dry_run.enabled {
        return Err(FundarbError::Config(config::ConfigError::Message(
            "live venue adapters are not configured; set dry_run.enabled = true".to_string(),
        )));
    }

    let mut registry = ExchangeRegistry::new();
    for name in &config.market.venues {
        let venue = parse_venue(name)?;
        let paper = PaperExchange::new(venue).with_fill_jitter_bps(2);
        for instrument in &config.market.instruments {
            let rate_bps: i64 = rand::thread_rng().gen_range(-5..=15);
            paper
                .set_instrument(
                    instrument,
                    Decimal::new(rate_bps, 4),
                    dec!(50000),
                )
                .await;
        }
        registry = registry.register(Arc::new(paper));
    }
    info!("registered {} paper venues", registry.len());
    Ok(Arc::new(registry))
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("info,fundarb={},sqlx=warn", config.level))
    });

    if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
