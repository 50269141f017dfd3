//! Market data collection.
//!
//! Pulls funding rates and order books from venue adapters behind per-venue
//! rate limits, and persists every funding observation so the analyzer's
//! persistence check has a history to read. A venue failing to answer narrows
//! the result instead of failing the whole collection pass.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::adapters::Store;
use crate::config::MarketConfig;
use crate::domain::{FundingRate, OrderBookSnapshot, Venue};
use crate::error::Result;
use crate::exchange::{ExchangeRegistry, RateLimiter};

/// Read seam between the analyzer and the venue adapters
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Fetch the current funding rate on every registered venue, keyed by
    /// instrument. Venues that fail to answer are skipped with a warning.
    async fn collect_current_funding_rates(&self) -> HashMap<String, Vec<FundingRate>>;

    /// Stored funding history for one (instrument, venue), newest first
    async fn funding_rate_history(
        &self,
        instrument: &str,
        venue: Venue,
        hours: u32,
    ) -> Result<Vec<FundingRate>>;

    async fn order_book(
        &self,
        venue: Venue,
        instrument: &str,
        depth: u32,
    ) -> Result<OrderBookSnapshot>;
}

pub struct LiveMarketData {
    registry: Arc<ExchangeRegistry>,
    store: Arc<dyn Store>,
    limiters: HashMap<Venue, RateLimiter>,
    instruments: Vec<String>,
}

impl LiveMarketData {
    pub fn new(registry: Arc<ExchangeRegistry>, store: Arc<dyn Store>, config: &MarketConfig) -> Self {
        let limiters = registry
            .venues()
            .map(|venue| {
                (
                    venue,
                    RateLimiter::new(
                        config.rate_limit_requests,
                        Duration::from_millis(config.rate_limit_window_ms),
                    ),
                )
            })
            .collect();

        Self {
            registry,
            store,
            limiters,
            instruments: config.instruments.clone(),
        }
    }

    async fn throttle(&self, venue: Venue) {
        if let Some(limiter) = self.limiters.get(&venue) {
            limiter.acquire().await;
        }
    }
}

#[async_trait]
impl MarketData for LiveMarketData {
    async fn collect_current_funding_rates(&self) -> HashMap<String, Vec<FundingRate>> {
        let mut by_instrument: HashMap<String, Vec<FundingRate>> = HashMap::new();

        for instrument in &self.instruments {
            for venue in self.registry.venues() {
                let client = match self.registry.get(venue) {
                    Ok(client) => client,
                    Err(_) => continue,
                };
                self.throttle(venue).await;

                match client.get_current_funding_rate(instrument).await {
                    Ok(rate) => {
                        if let Err(e) = self.store.insert_funding_rate(&rate).await {
                            warn!("failed to persist funding rate from {}: {}", venue, e);
                        }
                        by_instrument
                            .entry(instrument.clone())
                            .or_default()
                            .push(rate);
                    }
                    Err(e) => {
                        warn!("{} funding rate for {} unavailable: {}", venue, instrument, e);
                    }
                }
            }
        }

        debug!(
            "collected funding rates for {} instruments",
            by_instrument.len()
        );
        by_instrument
    }

    async fn funding_rate_history(
        &self,
        instrument: &str,
        venue: Venue,
        hours: u32,
    ) -> Result<Vec<FundingRate>> {
        self.store.funding_rate_history(instrument, venue, hours).await
    }

    async fn order_book(
        &self,
        venue: Venue,
        instrument: &str,
        depth: u32,
    ) -> Result<OrderBookSnapshot> {
        let client = self.registry.get(venue)?;
        self.throttle(venue).await;
        client.get_order_book(instrument, depth).await
    }
}

/// Background funding-rate collector. Runs until the task is aborted.
pub async fn run_collector(data: Arc<LiveMarketData>, interval_secs: u64) {
    let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
    info!("funding-rate collector started ({}s interval)", interval_secs);

    loop {
        ticker.tick().await;
        let collected = data.collect_current_funding_rates().await;
        let samples: usize = collected.values().map(Vec::len).sum();
        debug!("collector pass stored {} funding samples", samples);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::adapters::MemoryStore;
    use crate::exchange::PaperExchange;

    fn market_config() -> MarketConfig {
        MarketConfig {
            venues: vec!["binance".to_string(), "bybit".to_string()],
            instruments: vec!["BTCUSDT".to_string()],
            collect_interval_secs: 300,
            rate_limit_requests: 100,
            rate_limit_window_ms: 1000,
        }
    }

    async fn two_venue_data() -> LiveMarketData {
        let binance = PaperExchange::new(Venue::Binance);
        binance.set_instrument("BTCUSDT", dec!(0.0001), dec!(50000)).await;
        let bybit = PaperExchange::new(Venue::Bybit);
        bybit.set_instrument("BTCUSDT", dec!(0.0015), dec!(50010)).await;

        let registry = Arc::new(
            ExchangeRegistry::new()
                .register(Arc::new(binance))
                .register(Arc::new(bybit)),
        );
        LiveMarketData::new(registry, Arc::new(MemoryStore::new()), &market_config())
    }

    #[tokio::test]
    async fn collects_one_rate_per_venue() {
        let data = two_venue_data().await;
        let rates = data.collect_current_funding_rates().await;
        assert_eq!(rates.len(), 1);
        assert_eq!(rates["BTCUSDT"].len(), 2);
    }

    #[tokio::test]
    async fn collection_persists_history() {
        let data = two_venue_data().await;
        data.collect_current_funding_rates().await;
        data.collect_current_funding_rates().await;

        let history = data
            .funding_rate_history("BTCUSDT", Venue::Binance, 72)
            .await
            .expect("history");
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn venue_failure_narrows_the_result() {
        let binance = PaperExchange::new(Venue::Binance);
        binance.set_instrument("BTCUSDT", dec!(0.0001), dec!(50000)).await;
        // bybit never learns the instrument, so its fetch fails
        let bybit = PaperExchange::new(Venue::Bybit);

        let registry = Arc::new(
            ExchangeRegistry::new()
                .register(Arc::new(binance))
                .register(Arc::new(bybit)),
        );
        let data = LiveMarketData::new(registry, Arc::new(MemoryStore::new()), &market_config());

        let rates = data.collect_current_funding_rates().await;
        assert_eq!(rates["BTCUSDT"].len(), 1);
        assert_eq!(rates["BTCUSDT"][0].venue, Venue::Binance);
    }
}
