//! Signal stage
//!
//! Pulls ticks per symbol / timeframe, keeps a bounded history for each and
//! classifies the indicators into buy / sell / hold. Weak signals are dropped
//! instead of stored. A failing symbol is logged and skipped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use super::indicators::{self, IndicatorPeriods, PriceHistory};
use super::types::{IndicatorValues, MarketSignal, SignalDirection};
use crate::market::{MarketDataSource, MarketTick};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    #[serde(default = "default_fast_period")]
    pub fast_period: usize,
    #[serde(default = "default_slow_period")]
    pub slow_period: usize,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_momentum_period")]
    pub momentum_period: usize,
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,
    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: f64,
    /// Signals below this strength are discarded
    #[serde(default = "default_min_strength")]
    pub min_strength: f64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_fast_period() -> usize { 5 }
fn default_slow_period() -> usize { 20 }
fn default_rsi_period() -> usize { 14 }
fn default_momentum_period() -> usize { 10 }
fn default_rsi_overbought() -> f64 { 70.0 }
fn default_rsi_oversold() -> f64 { 30.0 }
fn default_min_strength() -> f64 { 60.0 }
fn default_history_limit() -> usize { 200 }

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            fast_period: default_fast_period(),
            slow_period: default_slow_period(),
            rsi_period: default_rsi_period(),
            momentum_period: default_momentum_period(),
            rsi_overbought: default_rsi_overbought(),
            rsi_oversold: default_rsi_oversold(),
            min_strength: default_min_strength(),
            history_limit: default_history_limit(),
        }
    }
}

impl SignalConfig {
    fn periods(&self) -> IndicatorPeriods {
        IndicatorPeriods {
            fast: self.fast_period,
            slow: self.slow_period,
            rsi: self.rsi_period,
            momentum: self.momentum_period,
        }
    }
}

/// Direction, strength (0-100) and confidence (0-1) for a set of indicators
pub fn classify(values: &IndicatorValues, config: &SignalConfig) -> (SignalDirection, f64, f64) {
    let trend_pct = if values.sma_slow > 0.0 {
        (values.sma_fast - values.sma_slow) / values.sma_slow * 100.0
    } else {
        0.0
    };

    let direction = if values.sma_fast > values.sma_slow
        && values.rsi < config.rsi_overbought
        && values.momentum > 0.0
    {
        SignalDirection::Buy
    } else if values.sma_fast < values.sma_slow
        && values.rsi > config.rsi_oversold
        && values.momentum < 0.0
    {
        SignalDirection::Sell
    } else {
        SignalDirection::Hold
    };

    if direction == SignalDirection::Hold {
        let strength = (50.0 - trend_pct.abs() * 10.0).clamp(0.0, 50.0);
        return (direction, strength, 0.5);
    }

    let strength = (50.0
        + (trend_pct.abs() * 10.0).min(25.0)
        + (values.momentum.abs() * 5.0).min(15.0)
        + ((values.volume_ratio - 1.0).max(0.0) * 10.0).min(10.0))
    .clamp(0.0, 100.0);

    // RSI inside the supportive band, away from exhaustion
    let rsi_supportive = match direction {
        SignalDirection::Buy => (40.0..config.rsi_overbought).contains(&values.rsi),
        _ => (config.rsi_oversold..=60.0).contains(&values.rsi),
    };
    let confidence = (0.5
        + if rsi_supportive { 0.2 } else { 0.0 }
        + if values.volume_ratio >= 1.0 { 0.15 } else { 0.0 }
        + 0.15 * (values.momentum.abs() / 2.0).min(1.0))
    .clamp(0.0, 1.0);

    (direction, strength, confidence)
}

/// Directional and at least `min_strength`; everything else is discarded
pub fn is_actionable(direction: SignalDirection, strength: f64, config: &SignalConfig) -> bool {
    direction != SignalDirection::Hold && strength >= config.min_strength
}

/// Outcome of one refresh pass
#[derive(Debug, Clone, Default)]
pub struct SignalBatch {
    pub signals: Vec<MarketSignal>,
    pub failures: Vec<(String, String)>,
}

pub struct SignalStage {
    config: SignalConfig,
    histories: HashMap<(String, String), PriceHistory>,
    /// Strong signals of the latest pass, keyed by (symbol, timeframe)
    current: HashMap<(String, String), MarketSignal>,
    last_prices: HashMap<String, (f64, DateTime<Utc>)>,
}

impl SignalStage {
    pub fn new(config: SignalConfig) -> Self {
        Self {
            config,
            histories: HashMap::new(),
            current: HashMap::new(),
            last_prices: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Fold one tick into history; returns a signal only if it is strong enough
    pub fn ingest(&mut self, tick: &MarketTick) -> Option<MarketSignal> {
        let key = (tick.symbol.clone(), tick.timeframe.clone());
        let limit = self.config.history_limit;
        let history = self.histories.entry(key.clone()).or_insert_with(|| PriceHistory::new(limit));
        history.push(tick.price, tick.volume);
        self.last_prices.insert(tick.symbol.clone(), (tick.price, tick.timestamp));

        let values = indicators::compute(history, self.config.periods())?;
        let (direction, strength, confidence) = classify(&values, &self.config);

        if !is_actionable(direction, strength, &self.config) {
            self.current.remove(&key);
            return None;
        }

        let signal = MarketSignal {
            symbol: tick.symbol.clone(),
            timeframe: tick.timeframe.clone(),
            direction,
            strength,
            confidence,
            price: tick.price,
            indicators: values,
            tick_time: tick.timestamp,
        };
        self.current.insert(key, signal.clone());
        Some(signal)
    }

    /// Pull a tick for every symbol / timeframe and classify
    pub async fn refresh(
        &mut self,
        source: &dyn MarketDataSource,
        symbols: &[String],
        timeframes: &[String],
    ) -> SignalBatch {
        let mut batch = SignalBatch::default();
        for symbol in symbols {
            for timeframe in timeframes {
                match source.latest_tick(symbol, timeframe).await {
                    Ok(tick) => {
                        if let Some(signal) = self.ingest(&tick) {
                            debug!(
                                symbol = %signal.symbol,
                                timeframe = %signal.timeframe,
                                direction = ?signal.direction,
                                strength = signal.strength,
                                "Signal"
                            );
                            batch.signals.push(signal);
                        }
                    }
                    Err(e) => {
                        warn!(symbol = %symbol, timeframe = %timeframe, "Signal refresh failed: {}", e);
                        batch.failures.push((format!("{}:{}", symbol, timeframe), e.to_string()));
                    }
                }
            }
        }
        batch
    }

    pub fn current(&self) -> Vec<MarketSignal> {
        let mut signals: Vec<MarketSignal> = self.current.values().cloned().collect();
        signals.sort_by(|a, b| (&a.symbol, &a.timeframe).cmp(&(&b.symbol, &b.timeframe)));
        signals
    }

    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        self.last_prices.get(symbol).map(|(p, _)| *p)
    }

    pub fn last_prices(&self) -> HashMap<String, f64> {
        self.last_prices.iter().map(|(s, (p, _))| (s.clone(), *p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::pipeline::opportunities::{evaluate, OpportunityConfig};
    use async_trait::async_trait;

    fn tick(symbol: &str, price: f64, volume: f64) -> MarketTick {
        MarketTick {
            symbol: symbol.to_string(),
            timeframe: "5m".to_string(),
            price,
            volume,
            high: price,
            low: price,
            change_pct: 0.0,
            timestamp: Utc::now(),
        }
    }

    fn small_config() -> SignalConfig {
        SignalConfig {
            fast_period: 3,
            slow_period: 6,
            rsi_period: 5,
            momentum_period: 3,
            ..Default::default()
        }
    }

    fn values(fast: f64, slow: f64, rsi: f64, momentum: f64, volume_ratio: f64) -> IndicatorValues {
        IndicatorValues { sma_fast: fast, sma_slow: slow, rsi, momentum, volume_ratio }
    }

    #[test]
    fn test_classify_buy_sell_hold() {
        let config = SignalConfig::default();
        let (dir, strength, confidence) = classify(&values(105.0, 100.0, 60.0, 3.0, 1.5), &config);
        assert_eq!(dir, SignalDirection::Buy);
        assert!(strength >= 60.0 && strength <= 100.0);
        assert!((0.0..=1.0).contains(&confidence));

        let (dir, _, _) = classify(&values(95.0, 100.0, 45.0, -3.0, 1.0), &config);
        assert_eq!(dir, SignalDirection::Sell);

        // Overbought uptrend is not a buy
        let (dir, strength, _) = classify(&values(105.0, 100.0, 80.0, 3.0, 1.0), &config);
        assert_eq!(dir, SignalDirection::Hold);
        assert!(strength < config.min_strength);
    }

    #[test]
    fn test_min_strength_is_inclusive() {
        let config = SignalConfig::default();
        assert!(!is_actionable(SignalDirection::Buy, 55.0, &config));
        assert!(is_actionable(SignalDirection::Buy, 60.0, &config));
        assert!(is_actionable(SignalDirection::Sell, 60.0, &config));
        assert!(!is_actionable(SignalDirection::Hold, 90.0, &config));
    }

    #[test]
    fn test_weak_buy_never_becomes_an_opportunity() {
        let config = SignalConfig::default();
        let opportunity_config = OpportunityConfig { min_strength: 60.0, ..Default::default() };
        let mut weak = MarketSignal {
            symbol: "ETH/USDT".to_string(),
            timeframe: "5m".to_string(),
            direction: SignalDirection::Buy,
            strength: 55.0,
            confidence: 0.9,
            price: 100.0,
            indicators: values(101.0, 100.0, 55.0, 2.0, 1.2),
            tick_time: Utc::now(),
        };
        assert!(!is_actionable(weak.direction, weak.strength, &config));
        assert!(evaluate(&weak, &opportunity_config, Utc::now()).is_none());

        weak.strength = 60.0;
        assert!(is_actionable(weak.direction, weak.strength, &config));
        assert!(evaluate(&weak, &opportunity_config, Utc::now()).is_some());
    }

    #[test]
    fn test_uptrend_ingest_emits_buy() {
        let mut stage = SignalStage::new(small_config());
        let mut last = None;
        // Rising with shallow pullbacks keeps RSI below overbought
        let prices = [100.0, 102.0, 100.5, 102.5, 101.0, 103.0, 101.5, 103.5, 102.0, 104.0];
        for p in prices {
            last = stage.ingest(&tick("ETH/USDT", p, 100.0)).or(last);
        }
        let signal = last.expect("uptrend should produce a signal");
        assert_eq!(signal.direction, SignalDirection::Buy);
        assert!(signal.strength >= 60.0);
        assert!(signal.indicators.rsi < 70.0);
        assert_eq!(stage.current().len(), 1);
        assert_eq!(stage.last_price("ETH/USDT"), Some(104.0));
    }

    #[test]
    fn test_flat_market_stores_nothing() {
        let mut stage = SignalStage::new(small_config());
        for _ in 0..20 {
            assert!(stage.ingest(&tick("BTC/USDT", 100.0, 100.0)).is_none());
        }
        assert!(stage.current().is_empty());
    }

    struct PartialFeed;

    #[async_trait]
    impl MarketDataSource for PartialFeed {
        async fn latest_tick(&self, symbol: &str, _timeframe: &str) -> Result<MarketTick> {
            if symbol == "BAD/USDT" {
                return Err(Error::MarketData("feed down".into()));
            }
            Ok(tick(symbol, 100.0, 100.0))
        }
    }

    #[tokio::test]
    async fn test_one_failing_symbol_does_not_abort_batch() {
        let mut stage = SignalStage::new(small_config());
        let symbols = vec!["BAD/USDT".to_string(), "BTC/USDT".to_string()];
        let timeframes = vec!["5m".to_string()];

        let batch = stage.refresh(&PartialFeed, &symbols, &timeframes).await;
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(stage.last_price("BTC/USDT"), Some(100.0));
    }
}
