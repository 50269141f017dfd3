use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{FundarbError, Result};

/// Supported perpetual-futures venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    Binance,
    Bybit,
    Okx,
    Hyperliquid,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Bybit => "bybit",
            Self::Okx => "okx",
            Self::Hyperliquid => "hyperliquid",
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Venue {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(Self::Binance),
            "bybit" => Ok(Self::Bybit),
            "okx" => Ok(Self::Okx),
            "hyperliquid" | "hl" => Ok(Self::Hyperliquid),
            _ => Err("invalid venue; expected binance|bybit|okx|hyperliquid"),
        }
    }
}

pub fn parse_venue(raw: &str) -> Result<Venue> {
    Venue::from_str(raw).map_err(|e| FundarbError::Validation(e.to_string()))
}

/// One funding-rate observation. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingRate {
    pub venue: Venue,
    pub instrument: String,
    /// Rate as a fraction per funding period (e.g. 0.0001 = 1 bps / period)
    pub rate: Decimal,
    pub observed_at: DateTime<Utc>,
    pub next_funding_at: Option<DateTime<Utc>>,
}

/// A single price level of an order book
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Order-book snapshot used for liquidity estimation at analysis time.
/// Bids descending, asks ascending, best level first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub venue: Venue,
    pub instrument: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub observed_at: DateTime<Utc>,
}

impl OrderBookSnapshot {
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Mid-market bid/ask spread as a fraction of the mid price
    pub fn relative_spread(&self) -> Option<Decimal> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        let mid = (bid + ask) / Decimal::TWO;
        if mid.is_zero() {
            return None;
        }
        Some((ask - bid).abs() / mid)
    }

    /// Cumulative bid-side notional within `slippage_budget` of the best bid
    pub fn bid_notional_within(&self, slippage_budget: Decimal) -> Decimal {
        let Some(best) = self.best_bid() else {
            return Decimal::ZERO;
        };
        let floor = best * (Decimal::ONE - slippage_budget);
        self.bids
            .iter()
            .take_while(|l| l.price >= floor)
            .map(|l| l.price * l.size)
            .sum()
    }

    /// Cumulative ask-side notional within `slippage_budget` of the best ask
    pub fn ask_notional_within(&self, slippage_budget: Decimal) -> Decimal {
        let Some(best) = self.best_ask() else {
            return Decimal::ZERO;
        };
        let cap = best * (Decimal::ONE + slippage_budget);
        self.asks
            .iter()
            .take_while(|l| l.price <= cap)
            .map(|l| l.price * l.size)
            .sum()
    }

    /// Liquidity usable at this venue: min of both sides within the budget
    pub fn depth_within(&self, slippage_budget: Decimal) -> Decimal {
        self.bid_notional_within(slippage_budget)
            .min(self.ask_notional_within(slippage_budget))
    }
}
