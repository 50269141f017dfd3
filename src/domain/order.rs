use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Venue;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order status as reported back by a venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Order fully filled
    Filled,
    /// Order partially filled, remainder cancelled (IOC)
    PartiallyFilled,
    /// Order cancelled without any fill
    Cancelled,
    /// Order rejected by the venue
    Rejected,
    /// Order failed (internal or network error)
    Failed,
}

impl OrderStatus {
    pub fn is_filled(&self) -> bool {
        matches!(self, OrderStatus::Filled)
    }

    pub fn has_fill(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::PartiallyFilled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Filled => "FILLED",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Immediate-or-cancel order request submitted to a venue adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub instrument: String,
    pub side: OrderSide,
    /// Quantity in base units
    pub quantity: Decimal,
    /// Only reduce an existing position, never open or flip one
    pub reduce_only: bool,
}

impl OrderRequest {
    pub fn ioc(instrument: &str, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            instrument: instrument.to_string(),
            side,
            quantity,
            reduce_only: false,
        }
    }

    pub fn reduce_only(instrument: &str, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            instrument: instrument.to_string(),
            side,
            quantity,
            reduce_only: true,
        }
    }
}

/// Normalized execution report returned by a venue adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResult {
    pub order_id: String,
    pub venue: Venue,
    pub instrument: String,
    pub side: OrderSide,
    pub filled_qty: Decimal,
    pub avg_price: Decimal,
    pub fees: Decimal,
    pub status: OrderStatus,
    pub executed_at: DateTime<Utc>,
}

impl TradeResult {
    pub fn filled_notional(&self) -> Decimal {
        self.filled_qty * self.avg_price
    }
}
