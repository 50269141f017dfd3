//! In-process paper venue.
//!
//! Stands in behind the `ExchangeClient` capability contract for dry-run mode
//! and tests: funding rates, book shape, and fill behavior are scripted per
//! instrument, and positions are tracked in memory so the supervisor and the
//! close path behave exactly as against a real adapter.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{
    BookLevel, FundingRate, OrderBookSnapshot, OrderRequest, OrderSide, OrderStatus, PositionSide,
    TradeResult, Venue,
};
use crate::error::{FundarbError, Result};
use crate::exchange::traits::{AccountBalance, ExchangeClient, VenuePosition};

/// Scripted response to an order submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperFill {
    /// Fill the full quantity at the touch
    Fill,
    /// Fill only this percentage of the requested quantity
    Partial(u32),
    /// Reject the order outright
    Reject,
    /// Fail with a network-style error
    NetworkError,
}

#[derive(Debug, Clone)]
struct InstrumentState {
    funding_rate: Decimal,
    mark_price: Decimal,
}

#[derive(Default)]
struct PaperState {
    instruments: HashMap<String, InstrumentState>,
    positions: HashMap<String, VenuePosition>,
    leverage: HashMap<String, u32>,
    balance: Decimal,
}

pub struct PaperExchange {
    venue: Venue,
    fill_behavior: Mutex<PaperFill>,
    taker_fee: Decimal,
    /// Random execution-price jitter in basis points (dry-run realism only)
    fill_jitter_bps: u32,
    state: Mutex<PaperState>,
}

impl PaperExchange {
    pub fn new(venue: Venue) -> Self {
        Self {
            venue,
            fill_behavior: Mutex::new(PaperFill::Fill),
            taker_fee: dec!(0.0005),
            fill_jitter_bps: 0,
            state: Mutex::new(PaperState {
                balance: dec!(100000),
                ..Default::default()
            }),
        }
    }

    pub fn with_fill_jitter_bps(mut self, bps: u32) -> Self {
        self.fill_jitter_bps = bps;
        self
    }

    pub async fn set_instrument(&self, instrument: &str, funding_rate: Decimal, mark_price: Decimal) {
        self.state.lock().await.instruments.insert(
            instrument.to_string(),
            InstrumentState {
                funding_rate,
                mark_price,
            },
        );
    }

    pub async fn set_fill_behavior(&self, behavior: PaperFill) {
        *self.fill_behavior.lock().await = behavior;
    }

    pub async fn set_mark_price(&self, instrument: &str, mark_price: Decimal) {
        let mut state = self.state.lock().await;
        if let Some(inst) = state.instruments.get_mut(instrument) {
            inst.mark_price = mark_price;
        }
        if let Some(pos) = state.positions.get_mut(instrument) {
            pos.mark_price = mark_price;
            let diff = match pos.side {
                PositionSide::Long => mark_price - pos.entry_price,
                PositionSide::Short => pos.entry_price - mark_price,
            };
            pos.unrealized_pnl = diff * pos.quantity;
        }
    }

    /// Overwrite the venue-side position directly (supervisor test scaffolding)
    pub async fn set_position(&self, position: VenuePosition) {
        self.state
            .lock()
            .await
            .positions
            .insert(position.instrument.clone(), position);
    }

    pub async fn drop_position(&self, instrument: &str) {
        self.state.lock().await.positions.remove(instrument);
    }

    fn jittered(&self, price: Decimal) -> Decimal {
        if self.fill_jitter_bps == 0 {
            return price;
        }
        let bps = rand::thread_rng().gen_range(0..=self.fill_jitter_bps) as i64;
        price * (Decimal::ONE + Decimal::new(bps, 4))
    }

    fn mark_of(state: &PaperState, instrument: &str) -> Result<Decimal> {
        state
            .instruments
            .get(instrument)
            .map(|i| i.mark_price)
            .ok_or_else(|| {
                FundarbError::MarketDataUnavailable(format!("unknown instrument {}", instrument))
            })
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn get_current_funding_rate(&self, instrument: &str) -> Result<FundingRate> {
        let state = self.state.lock().await;
        let inst = state.instruments.get(instrument).ok_or_else(|| {
            FundarbError::MarketDataUnavailable(format!("unknown instrument {}", instrument))
        })?;
        Ok(FundingRate {
            venue: self.venue,
            instrument: instrument.to_string(),
            rate: inst.funding_rate,
            observed_at: Utc::now(),
            next_funding_at: Some(Utc::now() + ChronoDuration::hours(8)),
        })
    }

    async fn get_funding_rate_history(
        &self,
        instrument: &str,
        hours: u32,
    ) -> Result<Vec<FundingRate>> {
        let state = self.state.lock().await;
        let inst = state.instruments.get(instrument).ok_or_else(|| {
            FundarbError::MarketDataUnavailable(format!("unknown instrument {}", instrument))
        })?;
        // Constant-rate series, one sample per 8h funding period
        let samples = (hours / 8).max(1);
        let now = Utc::now();
        Ok((0..samples)
            .map(|i| FundingRate {
                venue: self.venue,
                instrument: instrument.to_string(),
                rate: inst.funding_rate,
                observed_at: now - ChronoDuration::hours(8 * i as i64),
                next_funding_at: None,
            })
            .collect())
    }

    async fn get_order_book(&self, instrument: &str, depth: u32) -> Result<OrderBookSnapshot> {
        let state = self.state.lock().await;
        let mark = Self::mark_of(&state, instrument)?;
        let depth = depth.clamp(1, 50) as i64;
        let tick = mark * dec!(0.0001);
        let level_size = dec!(100000) / mark.max(Decimal::ONE);
        let bids = (1..=depth)
            .map(|i| BookLevel {
                price: mark - tick * Decimal::from(i),
                size: level_size,
            })
            .collect();
        let asks = (1..=depth)
            .map(|i| BookLevel {
                price: mark + tick * Decimal::from(i),
                size: level_size,
            })
            .collect();
        Ok(OrderBookSnapshot {
            venue: self.venue,
            instrument: instrument.to_string(),
            bids,
            asks,
            observed_at: Utc::now(),
        })
    }

    async fn execute_order(&self, request: &OrderRequest) -> Result<TradeResult> {
        let behavior = *self.fill_behavior.lock().await;
        let mut state = self.state.lock().await;
        let mark = Self::mark_of(&state, &request.instrument)?;

        let (filled_qty, status) = match behavior {
            PaperFill::Fill => (request.quantity, OrderStatus::Filled),
            PaperFill::Partial(pct) => (
                request.quantity * Decimal::from(pct.min(99)) / dec!(100),
                OrderStatus::PartiallyFilled,
            ),
            PaperFill::Reject => (Decimal::ZERO, OrderStatus::Rejected),
            PaperFill::NetworkError => {
                return Err(FundarbError::VenueTimeout(format!(
                    "{} order submission timed out",
                    self.venue
                )));
            }
        };

        let avg_price = self.jittered(mark);
        let fees = filled_qty * avg_price * self.taker_fee;

        if filled_qty > Decimal::ZERO {
            if request.reduce_only {
                let remove = match state.positions.get_mut(&request.instrument) {
                    Some(pos) => {
                        pos.quantity = (pos.quantity - filled_qty).max(Decimal::ZERO);
                        pos.quantity.is_zero()
                    }
                    None => false,
                };
                if remove {
                    state.positions.remove(&request.instrument);
                }
            } else {
                let side = match request.side {
                    OrderSide::Buy => PositionSide::Long,
                    OrderSide::Sell => PositionSide::Short,
                };
                state.positions.insert(
                    request.instrument.clone(),
                    VenuePosition {
                        venue: self.venue,
                        instrument: request.instrument.clone(),
                        side,
                        quantity: filled_qty,
                        entry_price: avg_price,
                        mark_price: mark,
                        liquidation_price: None,
                        unrealized_pnl: Decimal::ZERO,
                    },
                );
            }
            state.balance -= fees;
        }

        debug!(
            "{} paper order {}: {} {} {} -> {}",
            self.venue, request.client_order_id, request.side, filled_qty, request.instrument, status
        );

        Ok(TradeResult {
            order_id: request.client_order_id.clone(),
            venue: self.venue,
            instrument: request.instrument.clone(),
            side: request.side,
            filled_qty,
            avg_price,
            fees,
            status,
            executed_at: Utc::now(),
        })
    }

    async fn get_position(&self, instrument: &str) -> Result<Option<VenuePosition>> {
        Ok(self.state.lock().await.positions.get(instrument).cloned())
    }

    async fn close_position(&self, instrument: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        Ok(state.positions.remove(instrument).is_some())
    }

    async fn set_leverage(&self, instrument: &str, leverage: u32) -> Result<bool> {
        self.state
            .lock()
            .await
            .leverage
            .insert(instrument.to_string(), leverage);
        Ok(true)
    }

    async fn get_balance(&self) -> Result<AccountBalance> {
        let state = self.state.lock().await;
        Ok(AccountBalance {
            available: state.balance,
            used: Decimal::ZERO,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ioc_fill_opens_and_reduce_only_closes() {
        let venue = PaperExchange::new(Venue::Binance);
        venue.set_instrument("BTCUSDT", dec!(0.0001), dec!(50000)).await;

        let open = venue
            .execute_order(&OrderRequest::ioc("BTCUSDT", OrderSide::Buy, dec!(0.5)))
            .await
            .expect("open should fill");
        assert!(open.status.is_filled());

        let pos = venue
            .get_position("BTCUSDT")
            .await
            .expect("query ok")
            .expect("position exists");
        assert_eq!(pos.side, PositionSide::Long);
        assert_eq!(pos.quantity, dec!(0.5));

        let close = venue
            .execute_order(&OrderRequest::reduce_only("BTCUSDT", OrderSide::Sell, dec!(0.5)))
            .await
            .expect("close should fill");
        assert!(close.status.is_filled());
        assert!(venue.get_position("BTCUSDT").await.expect("query ok").is_none());
    }

    #[tokio::test]
    async fn close_position_is_idempotent() {
        let venue = PaperExchange::new(Venue::Bybit);
        venue.set_instrument("ETHUSDT", dec!(0.0002), dec!(3000)).await;
        assert!(!venue.close_position("ETHUSDT").await.expect("no-op close"));

        venue
            .execute_order(&OrderRequest::ioc("ETHUSDT", OrderSide::Sell, dec!(1)))
            .await
            .expect("open");
        assert!(venue.close_position("ETHUSDT").await.expect("real close"));
        assert!(!venue.close_position("ETHUSDT").await.expect("second close is no-op"));
    }

    #[tokio::test]
    async fn scripted_rejection_reports_no_fill() {
        let venue = PaperExchange::new(Venue::Okx);
        venue.set_instrument("BTCUSDT", dec!(0.0001), dec!(50000)).await;
        venue.set_fill_behavior(PaperFill::Reject).await;

        let result = venue
            .execute_order(&OrderRequest::ioc("BTCUSDT", OrderSide::Buy, dec!(1)))
            .await
            .expect("rejection is a result, not an error");
        assert_eq!(result.status, OrderStatus::Rejected);
        assert_eq!(result.filled_qty, Decimal::ZERO);
    }
}
