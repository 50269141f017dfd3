use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Venue;

/// Terminal outcome of a discovered opportunity (it is consumed exactly once)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityOutcome {
    Executed,
    Rejected,
}

impl OpportunityOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executed => "executed",
            Self::Rejected => "rejected",
        }
    }
}

/// A funding-rate divergence worth hedging across two venues.
///
/// Immutable once created; re-validated against its validity window if
/// execution is delayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub id: uuid::Uuid,
    pub instrument: String,
    /// Venue with the cheapest funding, where we go long
    pub long_venue: Venue,
    /// Venue with the most expensive funding, where we go short
    pub short_venue: Venue,
    pub long_rate: Decimal,
    pub short_rate: Decimal,
    /// Absolute funding-rate difference per period
    pub rate_spread: Decimal,
    /// rate_spread expressed in basis points
    pub spread_bps: Decimal,
    /// Estimated daily profit in USD, net of taker fees
    pub estimated_daily_profit: Decimal,
    /// Notional to deploy, bounded by liquidity and capital
    pub optimal_notional: Decimal,
    /// 0.0 - 1.0
    pub confidence: Decimal,
    /// 0.0 - 1.0
    pub risk_score: Decimal,
    pub discovered_at: DateTime<Utc>,
}

impl ArbitrageOpportunity {
    /// Whether the opportunity is still inside its validity window
    pub fn is_fresh(&self, ttl_secs: u64, now: DateTime<Utc>) -> bool {
        now - self.discovered_at <= Duration::seconds(ttl_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn opportunity(discovered_at: DateTime<Utc>) -> ArbitrageOpportunity {
        ArbitrageOpportunity {
            id: uuid::Uuid::new_v4(),
            instrument: "BTCUSDT".to_string(),
            long_venue: Venue::Binance,
            short_venue: Venue::Bybit,
            long_rate: dec!(0.0001),
            short_rate: dec!(0.0015),
            rate_spread: dec!(0.0014),
            spread_bps: dec!(14),
            estimated_daily_profit: dec!(3.2),
            optimal_notional: dec!(1000),
            confidence: dec!(0.7),
            risk_score: dec!(0.3),
            discovered_at,
        }
    }

    #[test]
    fn freshness_expires_after_ttl() {
        let now = Utc::now();
        assert!(opportunity(now).is_fresh(300, now));
        assert!(opportunity(now - Duration::seconds(299)).is_fresh(300, now));
        assert!(!opportunity(now - Duration::seconds(301)).is_fresh(300, now));
    }
}
