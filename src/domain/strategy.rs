use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Venue;

/// Strategy lifecycle status. Closed and Killed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyStatus {
    Active,
    Closing,
    Closed,
    Killed,
}

impl StrategyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Killed => "killed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Killed)
    }
}

impl std::fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for StrategyStatus {
    type Error = String;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        match raw {
            "active" => Ok(Self::Active),
            "closing" => Ok(Self::Closing),
            "closed" => Ok(Self::Closed),
            "killed" => Ok(Self::Killed),
            other => Err(format!("invalid strategy status: {}", other)),
        }
    }
}

/// The paired long+short position set opened to capture a funding spread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: Uuid,
    pub instrument: String,
    pub long_venue: Venue,
    pub short_venue: Venue,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub expected_profit_bps: Decimal,
    pub realized_pnl: Option<Decimal>,
    pub status: StrategyStatus,
}

/// Side of one leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PositionSide {
    type Error = String;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        match raw {
            "long" => Ok(Self::Long),
            "short" => Ok(Self::Short),
            other => Err(format!("invalid position side: {}", other)),
        }
    }
}

/// Position status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closing,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PositionStatus {
    type Error = String;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        match raw {
            "open" => Ok(Self::Open),
            "closing" => Ok(Self::Closing),
            "closed" => Ok(Self::Closed),
            other => Err(format!("invalid position status: {}", other)),
        }
    }
}

/// One leg of a strategy on a single venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub strategy_id: Uuid,
    pub venue: Venue,
    pub instrument: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub leverage: u32,
    pub liquidation_price: Option<Decimal>,
    pub mark_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub status: PositionStatus,
}

impl Position {
    /// Current notional value at mark price
    pub fn notional(&self) -> Decimal {
        self.quantity * self.mark_price
    }

    /// Percentage move from mark price to liquidation, sign-adjusted per side.
    /// None when the venue reports no liquidation price or mark is zero.
    pub fn distance_to_liquidation_pct(&self) -> Option<Decimal> {
        let liq = self.liquidation_price?;
        if self.mark_price.is_zero() {
            return None;
        }
        let distance = match self.side {
            PositionSide::Long => self.mark_price - liq,
            PositionSide::Short => liq - self.mark_price,
        };
        Some(distance / self.mark_price * dec!(100))
    }

    /// Unrealized loss as a percentage of notional (positive = losing)
    pub fn drawdown_pct(&self) -> Decimal {
        let notional = self.notional();
        if notional.is_zero() || self.unrealized_pnl >= Decimal::ZERO {
            return Decimal::ZERO;
        }
        -self.unrealized_pnl / notional * dec!(100)
    }
}

/// Why the kill switch fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillReason {
    SingleLeg,
    NearLiquidation,
    MaxDrawdown,
    SizeMismatch,
    OversizedPosition,
}

impl KillReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleLeg => "single_leg",
            Self::NearLiquidation => "near_liquidation",
            Self::MaxDrawdown => "max_drawdown",
            Self::SizeMismatch => "size_mismatch",
            Self::OversizedPosition => "oversized_position",
        }
    }
}

impl std::fmt::Display for KillReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Periodic exposure audit row. Never mutated after write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub total_exposure: Decimal,
    pub margin_utilization: Decimal,
    pub unrealized_pnl: Decimal,
    pub near_liquidation_count: u32,
    pub max_drawdown_pct: Decimal,
    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(side: PositionSide, mark: Decimal, liq: Option<Decimal>) -> Position {
        Position {
            strategy_id: Uuid::new_v4(),
            venue: Venue::Binance,
            instrument: "BTCUSDT".to_string(),
            side,
            entry_price: dec!(100),
            quantity: dec!(10),
            leverage: 5,
            liquidation_price: liq,
            mark_price: mark,
            unrealized_pnl: Decimal::ZERO,
            status: PositionStatus::Open,
        }
    }

    #[test]
    fn liquidation_distance_long() {
        // long at mark 90 with liquidation 85: (90-85)/90*100 ~ 5.56%
        let p = leg(PositionSide::Long, dec!(90), Some(dec!(85)));
        let d = p.distance_to_liquidation_pct().expect("has liq price");
        assert!(d > dec!(5.5) && d < dec!(5.6));
    }

    #[test]
    fn liquidation_distance_short() {
        // short at mark 90 with liquidation 99: (99-90)/90*100 = 10%
        let p = leg(PositionSide::Short, dec!(90), Some(dec!(99)));
        assert_eq!(p.distance_to_liquidation_pct(), Some(dec!(10)));
    }

    #[test]
    fn drawdown_only_counts_losses() {
        let mut p = leg(PositionSide::Long, dec!(100), None);
        p.unrealized_pnl = dec!(50);
        assert_eq!(p.drawdown_pct(), Decimal::ZERO);
        // notional 1000, -120 uPnL -> 12%
        p.unrealized_pnl = dec!(-120);
        assert_eq!(p.drawdown_pct(), dec!(12));
    }

    #[test]
    fn terminal_statuses() {
        assert!(StrategyStatus::Closed.is_terminal());
        assert!(StrategyStatus::Killed.is_terminal());
        assert!(!StrategyStatus::Active.is_terminal());
        assert!(!StrategyStatus::Closing.is_terminal());
    }
}
