//! Risk limits.
//!
//! The engine itself is pure: it judges one opportunity against a point-in-time
//! `ExposureBook` and returns a decision, touching nothing. Building the book
//! from the store is the only effectful part, kept separate so the engine is
//! trivially testable.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

use crate::adapters::Store;
use crate::config::RiskConfig;
use crate::domain::ArbitrageOpportunity;
use crate::error::{Result, RiskError};

/// Point-in-time view of everything the engine limits against
#[derive(Debug, Clone, Default)]
pub struct ExposureBook {
    /// Sum of hedged strategy notionals, each counted once
    pub total_notional: Decimal,
    pub notional_by_instrument: HashMap<String, Decimal>,
    pub active_strategies: usize,
    pub last_kill_event: Option<DateTime<Utc>>,
}

impl ExposureBook {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the book from persisted state. A strategy's exposure is the
    /// larger of its two leg notionals, counted once per strategy.
    pub async fn load(store: &dyn Store) -> Result<Self> {
        let mut book = Self::empty();

        for strategy in store.active_strategies().await? {
            let legs = store.positions_for_strategy(strategy.id).await?;
            let notional = legs
                .iter()
                .map(|p| p.notional())
                .max()
                .unwrap_or(Decimal::ZERO);

            book.total_notional += notional;
            *book
                .notional_by_instrument
                .entry(strategy.instrument.clone())
                .or_default() += notional;
            book.active_strategies += 1;
        }

        book.last_kill_event = store.last_kill_event_at().await?;
        Ok(book)
    }
}

/// Outcome of a risk check. A rejection carries the first limit violated.
#[derive(Debug, Clone)]
pub struct RiskDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl RiskDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn reject(error: RiskError) -> Self {
        Self {
            allowed: false,
            reason: Some(error.to_string()),
        }
    }
}

pub struct RiskLimitEngine {
    config: RiskConfig,
}

impl RiskLimitEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Check one opportunity against every limit, first violation wins.
    pub fn validate(&self, opportunity: &ArbitrageOpportunity, book: &ExposureBook) -> RiskDecision {
        let cfg = &self.config;
        let size = opportunity.optimal_notional;

        let exposure_limit = cfg.total_capital * cfg.max_exposure_pct;
        if book.total_notional + size > exposure_limit {
            return Self::rejected(
                opportunity,
                RiskError::MaxExposureExceeded {
                    limit: exposure_limit,
                    requested: book.total_notional + size,
                },
            );
        }

        let concentration_limit = cfg.total_capital * cfg.max_concentration_pct;
        let instrument_notional = book
            .notional_by_instrument
            .get(&opportunity.instrument)
            .copied()
            .unwrap_or(Decimal::ZERO);
        if instrument_notional + size > concentration_limit {
            return Self::rejected(
                opportunity,
                RiskError::ConcentrationExceeded {
                    instrument: opportunity.instrument.clone(),
                    limit: concentration_limit,
                },
            );
        }

        if book.active_strategies >= cfg.max_concurrent_strategies {
            return Self::rejected(
                opportunity,
                RiskError::TooManyStrategies {
                    count: book.active_strategies,
                    max: cfg.max_concurrent_strategies,
                },
            );
        }

        if size < cfg.min_position_size || size > cfg.max_position_size {
            return Self::rejected(
                opportunity,
                RiskError::SizeOutOfBounds {
                    size,
                    min: cfg.min_position_size,
                    max: cfg.max_position_size,
                },
            );
        }

        if opportunity.risk_score > cfg.max_risk_score || opportunity.confidence < cfg.min_confidence
        {
            return Self::rejected(
                opportunity,
                RiskError::ScoreOutOfBounds {
                    risk_score: opportunity.risk_score,
                    confidence: opportunity.confidence,
                },
            );
        }

        if let Some(fired_at) = book.last_kill_event {
            let cooldown = Duration::seconds(cfg.kill_switch_cooldown_secs as i64);
            if Utc::now() - fired_at < cooldown {
                return Self::rejected(opportunity, RiskError::KillSwitchCooldown { fired_at });
            }
        }

        RiskDecision::allow()
    }

    fn rejected(opportunity: &ArbitrageOpportunity, error: RiskError) -> RiskDecision {
        debug!(
            "opportunity {} ({}) rejected: {}",
            opportunity.id, opportunity.instrument, error
        );
        RiskDecision::reject(error)
    }
}
