use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub market: MarketConfig,
    pub analyzer: AnalyzerConfig,
    pub execution: ExecutionConfig,
    pub risk: RiskConfig,
    pub supervisor: SupervisorConfig,
    pub database: DatabaseConfig,
    pub dry_run: DryRunConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Health server port (default: 8080)
    #[serde(default)]
    pub health_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Venues to trade across (e.g., ["binance", "bybit"])
    pub venues: Vec<String>,
    /// Perp instruments to scan (e.g., ["BTCUSDT", "ETHUSDT"])
    pub instruments: Vec<String>,
    /// Funding-rate collection interval in seconds
    #[serde(default = "default_collect_interval")]
    pub collect_interval_secs: u64,
    /// Per-venue rate limit: max requests per window
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,
    /// Per-venue rate limit window in milliseconds
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,
}

fn default_collect_interval() -> u64 {
    300
}

fn default_rate_limit_requests() -> u32 {
    10
}

fn default_rate_limit_window_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    /// Analysis cycle interval in seconds
    #[serde(default = "default_analysis_interval")]
    pub interval_secs: u64,
    /// Minimum funding-rate spread in basis points to consider
    #[serde(default = "default_min_spread_bps")]
    pub min_spread_bps: Decimal,
    /// Trailing window for the persistence check, in hours
    #[serde(default = "default_persistence_window")]
    pub persistence_window_hours: u32,
    /// Minimum historical samples per venue for the persistence check
    #[serde(default = "default_min_samples")]
    pub min_samples_per_venue: usize,
    /// Funding period length in hours (8h on most perp venues)
    #[serde(default = "default_funding_period")]
    pub funding_period_hours: u32,
    /// Minimum annualized mean rate divergence (0.40 = 40%)
    #[serde(default = "default_min_annualized")]
    pub min_funding_rate_threshold: Decimal,
    /// Slippage budget for liquidity sizing (0.005 = 0.5%)
    #[serde(default = "default_slippage_budget")]
    pub slippage_budget: Decimal,
    /// Capital allocated to the analyzer for sizing, in USD
    pub capital_allocation: Decimal,
    /// Order book depth to request per venue
    #[serde(default = "default_book_depth")]
    pub order_book_depth: u32,
    /// Taker fee per leg as a fraction of notional (0.0005 = 5 bps)
    #[serde(default = "default_taker_fee")]
    pub taker_fee: Decimal,
    /// Instruments considered low-risk majors for risk scoring
    #[serde(default = "default_low_risk")]
    pub low_risk_instruments: Vec<String>,
    /// Seconds an opportunity stays executable after discovery
    #[serde(default = "default_opportunity_ttl")]
    pub opportunity_ttl_secs: u64,
}

fn default_analysis_interval() -> u64 {
    60
}

fn default_min_spread_bps() -> Decimal {
    dec!(30)
}

fn default_persistence_window() -> u32 {
    72
}

fn default_min_samples() -> usize {
    5
}

fn default_funding_period() -> u32 {
    8
}

fn default_min_annualized() -> Decimal {
    dec!(0.40)
}

fn default_slippage_budget() -> Decimal {
    dec!(0.005)
}

fn default_book_depth() -> u32 {
    50
}

fn default_taker_fee() -> Decimal {
    dec!(0.0005)
}

fn default_low_risk() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}

fn default_opportunity_ttl() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Leverage applied to both legs (conservative regardless of venue max)
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    /// Per-venue order call timeout in milliseconds
    #[serde(default = "default_order_timeout")]
    pub order_timeout_ms: u64,
    /// Maximum retry attempts for transient pre-submission failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    /// Acceptable relative fill-quantity mismatch between legs (0.01 = 1%)
    #[serde(default = "default_fill_tolerance")]
    pub fill_tolerance: Decimal,
}

fn default_leverage() -> u32 {
    5
}

fn default_order_timeout() -> u64 {
    5000
}

fn default_max_retries() -> u8 {
    3
}

fn default_fill_tolerance() -> Decimal {
    dec!(0.01)
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            leverage: default_leverage(),
            order_timeout_ms: default_order_timeout(),
            max_retries: default_max_retries(),
            fill_tolerance: default_fill_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Total capital available to the bot in USD
    pub total_capital: Decimal,
    /// Fraction of capital usable as total open notional (0.8 = 80%)
    #[serde(default = "default_max_exposure_pct")]
    pub max_exposure_pct: Decimal,
    /// Fraction of capital allowed on a single instrument (0.3 = 30%)
    #[serde(default = "default_max_concentration_pct")]
    pub max_concentration_pct: Decimal,
    /// Maximum concurrently active strategies
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_strategies: usize,
    /// Minimum notional per strategy in USD
    #[serde(default = "default_min_position")]
    pub min_position_size: Decimal,
    /// Maximum notional per strategy in USD
    pub max_position_size: Decimal,
    /// Maximum acceptable opportunity risk score
    #[serde(default = "default_max_risk_score")]
    pub max_risk_score: Decimal,
    /// Minimum acceptable opportunity confidence
    #[serde(default = "default_min_confidence")]
    pub min_confidence: Decimal,
    /// Seconds new trades stay paused after a kill-switch event
    #[serde(default = "default_cooldown")]
    pub kill_switch_cooldown_secs: u64,
}

fn default_max_exposure_pct() -> Decimal {
    dec!(0.8)
}

fn default_max_concentration_pct() -> Decimal {
    dec!(0.3)
}

fn default_max_concurrent() -> usize {
    3
}

fn default_min_position() -> Decimal {
    dec!(100)
}

fn default_max_risk_score() -> Decimal {
    dec!(0.7)
}

fn default_min_confidence() -> Decimal {
    dec!(0.4)
}

fn default_cooldown() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    /// Monitoring cadence in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Kill when distance-to-liquidation falls below this percent
    #[serde(default = "default_near_liquidation")]
    pub near_liquidation_pct: Decimal,
    /// Kill when unrealized loss exceeds this percent of notional
    #[serde(default = "default_max_drawdown")]
    pub max_drawdown_pct: Decimal,
    /// Kill when the two legs' notionals diverge by more than this percent
    #[serde(default = "default_size_mismatch")]
    pub size_mismatch_pct: Decimal,
    /// Kill when a leg's notional exceeds max_position_size times this factor
    #[serde(default = "default_oversize_factor")]
    pub oversize_factor: Decimal,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_near_liquidation() -> Decimal {
    dec!(20)
}

fn default_max_drawdown() -> Decimal {
    dec!(10)
}

fn default_size_mismatch() -> Decimal {
    dec!(20)
}

fn default_oversize_factor() -> Decimal {
    dec!(1.2)
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            near_liquidation_pct: default_near_liquidation(),
            max_drawdown_pct: default_max_drawdown(),
            size_mismatch_pct: default_size_mismatch(),
            oversize_factor: default_oversize_factor(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL (empty string selects the in-memory store)
    #[serde(default)]
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct DryRunConfig {
    /// Enable dry run mode (paper venues, no real orders)
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("FUNDARB_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (FUNDARB_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("FUNDARB")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Periods per day for the configured funding period
    pub fn periods_per_day(&self) -> Decimal {
        Decimal::from(24) / Decimal::from(self.analyzer.funding_period_hours.max(1))
    }

    /// Periods per year for the configured funding period
    pub fn periods_per_year(&self) -> Decimal {
        Decimal::from(365 * 24) / Decimal::from(self.analyzer.funding_period_hours.max(1))
    }
}
