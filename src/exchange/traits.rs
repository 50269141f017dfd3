use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{FundingRate, OrderBookSnapshot, OrderRequest, PositionSide, TradeResult, Venue};
use crate::error::{FundarbError, Result};

/// Account balance on one venue
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccountBalance {
    pub available: Decimal,
    pub used: Decimal,
}

/// A venue-side position, normalized at the adapter boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenuePosition {
    pub venue: Venue,
    pub instrument: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub liquidation_price: Option<Decimal>,
    pub unrealized_pnl: Decimal,
}

/// Capability contract every venue adapter must satisfy.
///
/// Per-venue signing, symbol translation and endpoint mapping live behind this
/// trait; the core only ever sees the canonical shapes.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn venue(&self) -> Venue;

    async fn get_current_funding_rate(&self, instrument: &str) -> Result<FundingRate>;

    async fn get_funding_rate_history(
        &self,
        instrument: &str,
        hours: u32,
    ) -> Result<Vec<FundingRate>>;

    async fn get_order_book(&self, instrument: &str, depth: u32) -> Result<OrderBookSnapshot>;

    /// Submit an immediate-or-cancel order
    async fn execute_order(&self, request: &OrderRequest) -> Result<TradeResult>;

    async fn get_position(&self, instrument: &str) -> Result<Option<VenuePosition>>;

    /// Reduce-only market close of the whole position. Closing a position
    /// that no longer exists is a no-op returning Ok(false).
    async fn close_position(&self, instrument: &str) -> Result<bool>;

    async fn set_leverage(&self, instrument: &str, leverage: u32) -> Result<bool>;

    async fn get_balance(&self) -> Result<AccountBalance>;
}

/// Explicitly constructed set of venue clients, injected into every component
/// that talks to venues.
#[derive(Clone)]
pub struct ExchangeRegistry {
    clients: HashMap<Venue, Arc<dyn ExchangeClient>>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    pub fn register(mut self, client: Arc<dyn ExchangeClient>) -> Self {
        self.clients.insert(client.venue(), client);
        self
    }

    pub fn get(&self, venue: Venue) -> Result<Arc<dyn ExchangeClient>> {
        self.clients
            .get(&venue)
            .cloned()
            .ok_or_else(|| FundarbError::VenueUnavailable {
                venue: venue.to_string(),
                reason: "no adapter registered".to_string(),
            })
    }

    pub fn venues(&self) -> impl Iterator<Item = Venue> + '_ {
        self.clients.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for ExchangeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
