//! Opportunity analysis.
//!
//! Each cycle takes the current funding rates across venues, pairs the
//! cheapest and the most expensive venue per instrument, and gates the pair
//! on spread size, historical persistence and executable liquidity before
//! scoring it. Analysis never fails a whole cycle: an instrument that cannot
//! be analyzed is skipped with a warning.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::Store;
use crate::config::AppConfig;
use crate::domain::{ArbitrageOpportunity, FundingRate, OrderBookSnapshot};
use crate::error::Result;
use crate::marketdata::MarketData;

pub struct OpportunityAnalyzer {
    market: Arc<dyn MarketData>,
    store: Arc<dyn Store>,
    config: AppConfig,
}

impl OpportunityAnalyzer {
    pub fn new(market: Arc<dyn MarketData>, store: Arc<dyn Store>, config: AppConfig) -> Self {
        Self {
            market,
            store,
            config,
        }
    }

    /// One analysis cycle over all configured instruments.
    ///
    /// Returns surviving opportunities sorted by estimated daily profit,
    /// best first. Every returned opportunity has already been persisted
    /// for audit.
    pub async fn find_opportunities(&self) -> Vec<ArbitrageOpportunity> {
        let rates = self.market.collect_current_funding_rates().await;
        let mut opportunities = Vec::new();

        for (instrument, venue_rates) in &rates {
            if venue_rates.len() < 2 {
                debug!("{}: fewer than two venues quoting, skipping", instrument);
                continue;
            }
            match self.analyze_instrument(instrument, venue_rates).await {
                Ok(Some(opportunity)) => opportunities.push(opportunity),
                Ok(None) => {}
                Err(e) => warn!("{}: analysis failed: {}", instrument, e),
            }
        }

        opportunities.sort_by(|a, b| {
            b.estimated_daily_profit
                .cmp(&a.estimated_daily_profit)
        });

        for opportunity in &opportunities {
            if let Err(e) = self.store.insert_opportunity(opportunity).await {
                warn!("failed to persist opportunity {}: {}", opportunity.id, e);
            }
        }

        if !opportunities.is_empty() {
            info!("analysis cycle produced {} opportunities", opportunities.len());
        }
        opportunities
    }

    async fn analyze_instrument(
        &self,
        instrument: &str,
        venue_rates: &[FundingRate],
    ) -> Result<Option<ArbitrageOpportunity>> {
        let cfg = &self.config.analyzer;

        // Long the venue with the lowest funding rate, short the highest.
        let mut sorted: Vec<&FundingRate> = venue_rates.iter().collect();
        sorted.sort_by(|a, b| a.rate.cmp(&b.rate));
        let long = sorted[0];
        let short = sorted[sorted.len() - 1];

        let rate_spread = (short.rate - long.rate).abs();
        let spread_bps = rate_spread * dec!(10000);
        if spread_bps < cfg.min_spread_bps {
            debug!(
                "{}: spread {} bps below minimum {}",
                instrument, spread_bps, cfg.min_spread_bps
            );
            return Ok(None);
        }

        if !self.spread_is_persistent(instrument, long, short).await? {
            return Ok(None);
        }

        let long_book = self
            .market
            .order_book(long.venue, instrument, cfg.order_book_depth)
            .await?;
        let short_book = self
            .market
            .order_book(short.venue, instrument, cfg.order_book_depth)
            .await?;

        let Some(optimal_notional) = self.size_position(&long_book, &short_book) else {
            debug!("{}: insufficient executable liquidity", instrument);
            return Ok(None);
        };

        // Funding accrues every period; taker fees are paid once per leg.
        // A negative estimate still surfaces so it ranks and is audited;
        // the trading loop decides what actually executes.
        let gross_daily = rate_spread * optimal_notional * self.config.periods_per_day();
        let entry_fees = dec!(2) * cfg.taker_fee * optimal_notional;
        let estimated_daily_profit = gross_daily - entry_fees;
        if estimated_daily_profit <= Decimal::ZERO {
            debug!("{}: fees exceed expected funding capture", instrument);
        }

        let confidence = self.confidence(venue_rates.len(), &long_book, &short_book);
        let risk_score = self.risk_score(instrument, optimal_notional, rate_spread);

        Ok(Some(ArbitrageOpportunity {
            id: Uuid::new_v4(),
            instrument: instrument.to_string(),
            long_venue: long.venue,
            short_venue: short.venue,
            long_rate: long.rate,
            short_rate: short.rate,
            rate_spread,
            spread_bps,
            estimated_daily_profit,
            optimal_notional,
            confidence,
            risk_score,
            discovered_at: Utc::now(),
        }))
    }

    /// The spread must also hold in the trailing window, not just this
    /// instant: both venues need enough samples, and the annualized mean
    /// divergence must clear the configured threshold.
    async fn spread_is_persistent(
        &self,
        instrument: &str,
        long: &FundingRate,
        short: &FundingRate,
    ) -> Result<bool> {
        let cfg = &self.config.analyzer;

        let long_history = self
            .market
            .funding_rate_history(instrument, long.venue, cfg.persistence_window_hours)
            .await?;
        let short_history = self
            .market
            .funding_rate_history(instrument, short.venue, cfg.persistence_window_hours)
            .await?;

        if long_history.len() < cfg.min_samples_per_venue
            || short_history.len() < cfg.min_samples_per_venue
        {
            debug!(
                "{}: insufficient history ({}/{} samples)",
                instrument,
                long_history.len(),
                short_history.len()
            );
            return Ok(false);
        }

        let long_mean = mean_rate(&long_history);
        let short_mean = mean_rate(&short_history);
        let annualized = (short_mean - long_mean).abs() * self.config.periods_per_year();

        if annualized <= cfg.min_funding_rate_threshold {
            debug!(
                "{}: annualized divergence {} below threshold {}",
                instrument, annualized, cfg.min_funding_rate_threshold
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Size the strategy off the thinner of the two books: 80% of the
    /// executable depth within the slippage budget, further capped by the
    /// per-strategy maximum and by 90% of allocated capital.
    fn size_position(
        &self,
        long_book: &OrderBookSnapshot,
        short_book: &OrderBookSnapshot,
    ) -> Option<Decimal> {
        let cfg = &self.config.analyzer;

        let depth = long_book
            .depth_within(cfg.slippage_budget)
            .min(short_book.depth_within(cfg.slippage_budget));

        let optimal = (depth * dec!(0.8))
            .min(self.config.risk.max_position_size)
            .min(cfg.capital_allocation * dec!(0.9));

        (optimal >= self.config.risk.min_position_size).then_some(optimal)
    }

    fn confidence(
        &self,
        venue_count: usize,
        long_book: &OrderBookSnapshot,
        short_book: &OrderBookSnapshot,
    ) -> Decimal {
        let mut confidence = dec!(0.5);
        if venue_count >= 3 {
            confidence += dec!(0.2);
        }
        if venue_count >= 4 {
            confidence += dec!(0.1);
        }

        // Tight books execute close to the touch, which the fee model assumes
        if let (Some(long_spread), Some(short_spread)) =
            (long_book.relative_spread(), short_book.relative_spread())
        {
            let avg = (long_spread + short_spread) / Decimal::TWO;
            if avg < dec!(0.001) {
                confidence += dec!(0.1);
            }
            if avg < dec!(0.0005) {
                confidence += dec!(0.1);
            }
        }

        confidence.min(Decimal::ONE)
    }

    fn risk_score(&self, instrument: &str, notional: Decimal, rate_spread: Decimal) -> Decimal {
        let cfg = &self.config.analyzer;
        let mut score = dec!(0.3);

        // Larger positions are harder to unwind cleanly
        if self.config.risk.max_position_size > Decimal::ZERO {
            score += dec!(0.3) * (notional / self.config.risk.max_position_size);
        }

        // An extreme spread usually signals a crowded or stressed market
        if rate_spread > dec!(0.01) {
            score += dec!(0.2);
        }
        if rate_spread > dec!(0.02) {
            score += dec!(0.2);
        }

        if !cfg
            .low_risk_instruments
            .iter()
            .any(|major| major == instrument)
        {
            score += dec!(0.1);
        }

        score.min(Decimal::ONE)
    }
}

fn mean_rate(history: &[FundingRate]) -> Decimal {
    if history.is_empty() {
        return Decimal::ZERO;
    }
    let sum: Decimal = history.iter().map(|r| r.rate).sum();
    sum / Decimal::from(history.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::adapters::MemoryStore;
    use crate::config::tests::test_config;
    use crate::domain::{BookLevel, Venue};
    use crate::exchange::{ExchangeRegistry, PaperExchange};
    use crate::marketdata::LiveMarketData;

    async fn seed_history(
        store: &MemoryStore,
        instrument: &str,
        venue: Venue,
        rate: Decimal,
        samples: usize,
    ) {
        let now = Utc::now();
        for i in 0..samples {
            store
                .insert_funding_rate(&FundingRate {
                    venue,
                    instrument: instrument.to_string(),
                    rate,
                    observed_at: now - Duration::hours(8 * i as i64),
                    next_funding_at: None,
                })
                .await
                .expect("seed");
        }
    }

    async fn analyzer_with(
        long_rate: Decimal,
        short_rate: Decimal,
        config: AppConfig,
    ) -> (OpportunityAnalyzer, Arc<MemoryStore>) {
        let binance = PaperExchange::new(Venue::Binance);
        binance.set_instrument("BTCUSDT", long_rate, dec!(50000)).await;
        let bybit = PaperExchange::new(Venue::Bybit);
        bybit.set_instrument("BTCUSDT", short_rate, dec!(50010)).await;

        let store = Arc::new(MemoryStore::new());
        seed_history(&store, "BTCUSDT", Venue::Binance, long_rate, 9).await;
        seed_history(&store, "BTCUSDT", Venue::Bybit, short_rate, 9).await;

        let registry = Arc::new(
            ExchangeRegistry::new()
                .register(Arc::new(binance))
                .register(Arc::new(bybit)),
        );
        let market = Arc::new(LiveMarketData::new(
            registry,
            store.clone(),
            &config.market,
        ));
        (
            OpportunityAnalyzer::new(market, store.clone(), config),
            store,
        )
    }

    #[tokio::test]
    async fn pairs_cheapest_long_against_most_expensive_short() {
        let mut config = test_config();
        config.analyzer.min_spread_bps = dec!(10);
        let (analyzer, _) = analyzer_with(dec!(0.0001), dec!(0.0015), config).await;

        let found = analyzer.find_opportunities().await;
        assert_eq!(found.len(), 1);
        let opp = &found[0];
        assert_eq!(opp.long_venue, Venue::Binance);
        assert_eq!(opp.short_venue, Venue::Bybit);
        assert_eq!(opp.rate_spread, dec!(0.0014));
        assert_eq!(opp.spread_bps, dec!(14));
    }

    #[tokio::test]
    async fn profit_nets_out_entry_fees() {
        let mut config = test_config();
        config.analyzer.min_spread_bps = dec!(10);
        let (analyzer, _) = analyzer_with(dec!(0.0001), dec!(0.0015), config).await;

        let found = analyzer.find_opportunities().await;
        let opp = &found[0];
        // sized to max_position_size 5000; 0.0014 * 5000 * 3 - 2 * 0.0005 * 5000
        assert_eq!(opp.optimal_notional, dec!(5000));
        assert_eq!(opp.estimated_daily_profit, dec!(16.0000));
    }

    #[tokio::test]
    async fn thin_spread_is_rejected() {
        // 14 bps spread against the default 30 bps minimum
        let (analyzer, _) = analyzer_with(dec!(0.0001), dec!(0.0015), test_config()).await;
        assert!(analyzer.find_opportunities().await.is_empty());
    }

    #[tokio::test]
    async fn short_history_fails_the_persistence_gate() {
        let mut config = test_config();
        config.analyzer.min_spread_bps = dec!(10);
        config.analyzer.min_samples_per_venue = 50;
        let (analyzer, _) = analyzer_with(dec!(0.0001), dec!(0.0015), config).await;

        assert!(analyzer.find_opportunities().await.is_empty());
    }

    #[tokio::test]
    async fn transient_spike_fails_the_persistence_gate() {
        // Current rates diverge but the trailing means are identical
        let mut config = test_config();
        config.analyzer.min_spread_bps = dec!(10);

        let binance = PaperExchange::new(Venue::Binance);
        binance.set_instrument("BTCUSDT", dec!(0.0001), dec!(50000)).await;
        let bybit = PaperExchange::new(Venue::Bybit);
        bybit.set_instrument("BTCUSDT", dec!(0.0015), dec!(50010)).await;

        let store = Arc::new(MemoryStore::new());
        seed_history(&store, "BTCUSDT", Venue::Binance, dec!(0.0001), 9).await;
        seed_history(&store, "BTCUSDT", Venue::Bybit, dec!(0.0001), 9).await;

        let registry = Arc::new(
            ExchangeRegistry::new()
                .register(Arc::new(binance))
                .register(Arc::new(bybit)),
        );
        let market = Arc::new(LiveMarketData::new(registry, store.clone(), &config.market));
        let analyzer = OpportunityAnalyzer::new(market, store, config);

        assert!(analyzer.find_opportunities().await.is_empty());
    }

    #[tokio::test]
    async fn wide_rate_spread_raises_the_risk_score() {
        // 120 bps spread from two moderate rates; neither rate alone is
        // extreme, the spread between them is
        let (analyzer, _) = analyzer_with(dec!(-0.006), dec!(0.006), test_config()).await;

        let found = analyzer.find_opportunities().await;
        assert_eq!(found.len(), 1);
        // 0.3 base + 0.3 size factor + 0.2 for a spread above 1%
        assert_eq!(found[0].risk_score, dec!(0.8));
    }

    #[tokio::test]
    async fn unprofitable_spread_still_surfaces_for_ranking() {
        let mut config = test_config();
        config.analyzer.min_spread_bps = dec!(10);
        config.analyzer.taker_fee = dec!(0.01);
        let (analyzer, _) = analyzer_with(dec!(0.0001), dec!(0.0015), config).await;

        let found = analyzer.find_opportunities().await;
        assert_eq!(found.len(), 1);
        assert!(found[0].estimated_daily_profit < Decimal::ZERO);
    }

    #[tokio::test]
    async fn persistence_gate_is_deterministic() {
        let mut config = test_config();
        config.analyzer.min_spread_bps = dec!(10);
        let (analyzer, _) = analyzer_with(dec!(0.0001), dec!(0.0015), config).await;

        let long = FundingRate {
            venue: Venue::Binance,
            instrument: "BTCUSDT".to_string(),
            rate: dec!(0.0001),
            observed_at: Utc::now(),
            next_funding_at: None,
        };
        let short = FundingRate {
            venue: Venue::Bybit,
            instrument: "BTCUSDT".to_string(),
            rate: dec!(0.0015),
            observed_at: Utc::now(),
            next_funding_at: None,
        };

        let first = analyzer
            .spread_is_persistent("BTCUSDT", &long, &short)
            .await
            .expect("gate");
        let second = analyzer
            .spread_is_persistent("BTCUSDT", &long, &short)
            .await
            .expect("gate");
        assert!(first);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn sizing_grows_with_depth_until_the_caps() {
        let (analyzer, _) = analyzer_with(dec!(0.0001), dec!(0.0015), test_config()).await;

        // each level carries ~$200 of notional, all within the 0.5% budget
        let book_with = |levels: usize| {
            let mark = dec!(50000);
            OrderBookSnapshot {
                venue: Venue::Binance,
                instrument: "BTCUSDT".to_string(),
                bids: (1..=levels)
                    .map(|i| BookLevel {
                        price: mark - Decimal::from(i as u32),
                        size: dec!(0.004),
                    })
                    .collect(),
                asks: (1..=levels)
                    .map(|i| BookLevel {
                        price: mark + Decimal::from(i as u32),
                        size: dec!(0.004),
                    })
                    .collect(),
                observed_at: Utc::now(),
            }
        };

        let mut previous = Decimal::ZERO;
        for levels in [1, 2, 5, 10, 40] {
            let size = analyzer
                .size_position(&book_with(levels), &book_with(levels))
                .expect("enough depth to size");
            assert!(size >= previous, "size shrank as depth grew");
            previous = size;
        }
        // deep books saturate at the per-strategy maximum
        assert_eq!(previous, dec!(5000));
    }

    #[tokio::test]
    async fn every_surviving_opportunity_is_persisted() {
        let mut config = test_config();
        config.analyzer.min_spread_bps = dec!(10);
        let (analyzer, store) = analyzer_with(dec!(0.0001), dec!(0.0015), config).await;

        let found = analyzer.find_opportunities().await;
        assert_eq!(found.len(), 1);
        // marking only succeeds for a stored opportunity
        assert!(store
            .mark_opportunity(found[0].id, crate::domain::OpportunityOutcome::Rejected)
            .await
            .is_ok());
    }
}
