use thiserror::Error;

/// Main error type for the trading bot
#[derive(Error, Debug)]
pub enum FundarbError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Venue timeout: {0}")]
    VenueTimeout(String),

    #[error("Venue unavailable: {venue} - {reason}")]
    VenueUnavailable { venue: String, reason: String },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors
    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    // Order execution errors
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    // Data integrity errors (real capital already committed)
    #[error("Data integrity incident: {0}")]
    DataIntegrity(String),

    // Risk management errors
    #[error("Risk limit exceeded: {0}")]
    RiskLimitExceeded(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Strategy not found: {0}")]
    StrategyNotFound(uuid::Uuid),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl FundarbError {
    /// Whether the error is worth retrying with backoff.
    ///
    /// Only plainly transient venue failures qualify; anything that could mean
    /// an order already reached the venue must not be retried blindly.
    pub fn is_transient(&self) -> bool {
        match self {
            FundarbError::RateLimited(_) | FundarbError::VenueTimeout(_) => true,
            FundarbError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status()
                        .map(|s| s.is_server_error() || s.as_u16() == 429)
                        .unwrap_or(false)
            }
            _ => false,
        }
    }
}

/// Result type alias for FundarbError
pub type Result<T> = std::result::Result<T, FundarbError>;

/// Specific error types for two-leg order execution
#[derive(Error, Debug, Clone)]
pub enum OrderError {
    #[error("Leg not filled on {venue}: status {status}")]
    LegNotFilled { venue: String, status: String },

    #[error("Leg quantity mismatch: long {long_qty} vs short {short_qty}")]
    QuantityMismatch {
        long_qty: rust_decimal::Decimal,
        short_qty: rust_decimal::Decimal,
    },

    #[error("Leverage setup failed on {venue}")]
    LeverageSetup { venue: String },
}

/// Specific error types for risk management
#[derive(Error, Debug, Clone)]
pub enum RiskError {
    #[error("Max exposure exceeded: limit ${limit}, requested ${requested}")]
    MaxExposureExceeded {
        limit: rust_decimal::Decimal,
        requested: rust_decimal::Decimal,
    },

    #[error("Instrument concentration exceeded: {instrument} limit ${limit}")]
    ConcentrationExceeded {
        instrument: String,
        limit: rust_decimal::Decimal,
    },

    #[error("Too many concurrent strategies: {count} >= {max}")]
    TooManyStrategies { count: usize, max: usize },

    #[error("Position size out of bounds: ${size} not in [${min}, ${max}]")]
    SizeOutOfBounds {
        size: rust_decimal::Decimal,
        min: rust_decimal::Decimal,
        max: rust_decimal::Decimal,
    },

    #[error("Opportunity scores out of bounds: risk {risk_score}, confidence {confidence}")]
    ScoreOutOfBounds {
        risk_score: rust_decimal::Decimal,
        confidence: rust_decimal::Decimal,
    },

    #[error("Kill switch cooldown active since {fired_at}")]
    KillSwitchCooldown {
        fired_at: chrono::DateTime<chrono::Utc>,
    },
}

impl From<OrderError> for FundarbError {
    fn from(err: OrderError) -> Self {
        FundarbError::ExecutionFailed(err.to_string())
    }
}

impl From<RiskError> for FundarbError {
    fn from(err: RiskError) -> Self {
        FundarbError::RiskLimitExceeded(err.to_string())
    }
}
