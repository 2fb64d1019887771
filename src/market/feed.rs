//! Market-data sources

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::trace;

use super::types::MarketTick;
use crate::error::{Error, Result};
use crate::runtime::clock::SharedClock;
use crate::venue::{split_symbol, VenueAdapter};

/// External market-data collaborator
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Latest tick for a symbol on a timeframe
    async fn latest_tick(&self, symbol: &str, timeframe: &str) -> Result<MarketTick>;
}

struct Series {
    price: f64,
    open: f64,
    high: f64,
    low: f64,
    drift: f64,
}

/// Seedable random-walk feed with persistent drift regimes
pub struct SimulatedMarketFeed {
    base_prices: HashMap<String, f64>,
    step: f64,
    clock: SharedClock,
    state: Mutex<(StdRng, HashMap<(String, String), Series>)>,
}

impl SimulatedMarketFeed {
    /// Probability per tick that a series picks a new drift
    const REGIME_SWITCH: f64 = 0.05;

    pub fn new(base_prices: HashMap<String, f64>, step: f64, seed: Option<u64>, clock: SharedClock) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            base_prices,
            step,
            clock,
            state: Mutex::new((rng, HashMap::new())),
        }
    }
}

#[async_trait]
impl MarketDataSource for SimulatedMarketFeed {
    async fn latest_tick(&self, symbol: &str, timeframe: &str) -> Result<MarketTick> {
        let base = split_symbol(symbol)
            .and_then(|(base, _)| self.base_prices.get(base).copied())
            .ok_or_else(|| Error::MarketData(format!("no reference price for {}", symbol)))?;

        let mut guard = self.state.lock().await;
        let (rng, series) = &mut *guard;
        let key = (symbol.to_string(), timeframe.to_string());
        let entry = series.entry(key).or_insert_with(|| Series {
            price: base,
            open: base,
            high: base,
            low: base,
            drift: 0.0,
        });

        if entry.drift == 0.0 || rng.gen_bool(Self::REGIME_SWITCH) {
            entry.drift = rng.gen_range(-0.5..=0.5) * self.step;
        }
        let shock = rng.gen_range(-1.0..=1.0) * self.step;
        entry.price = (entry.price * (1.0 + entry.drift + shock)).max(f64::EPSILON);
        entry.high = entry.high.max(entry.price);
        entry.low = entry.low.min(entry.price);
        let volume = rng.gen_range(50.0..150.0);

        trace!(symbol, timeframe, price = entry.price, "Simulated tick");

        Ok(MarketTick {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            price: entry.price,
            volume,
            high: entry.high,
            low: entry.low,
            change_pct: (entry.price - entry.open) / entry.open * 100.0,
            timestamp: self.clock.now(),
        })
    }
}

/// Feed that reads tickers from a venue adapter
pub struct AdapterMarketFeed {
    adapter: Arc<dyn VenueAdapter>,
    clock: SharedClock,
}

impl AdapterMarketFeed {
    pub fn new(adapter: Arc<dyn VenueAdapter>, clock: SharedClock) -> Self {
        Self { adapter, clock }
    }
}

#[async_trait]
impl MarketDataSource for AdapterMarketFeed {
    async fn latest_tick(&self, symbol: &str, timeframe: &str) -> Result<MarketTick> {
        let ticker = self.adapter.ticker(symbol).await?;
        Ok(MarketTick {
            symbol: ticker.symbol,
            timeframe: timeframe.to_string(),
            price: ticker.last,
            volume: ticker.volume_24h,
            high: ticker.high_24h,
            low: ticker.low_24h,
            change_pct: ticker.change_pct_24h,
            timestamp: self.clock.now(),
        })
    }
}
