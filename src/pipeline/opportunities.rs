//! Opportunity stage
//!
//! Promotes strong signals into priced opportunities, filters them by
//! risk/reward, probability and urgency, and keeps the top ranked few.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::types::{MarketSignal, TradingOpportunity, UrgencyClass};
use crate::venue::Side;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityConfig {
    #[serde(default = "default_min_strength")]
    pub min_strength: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Expected move for long entries, percent
    #[serde(default = "default_buy_target_pct")]
    pub buy_target_pct: f64,
    #[serde(default = "default_buy_stop_pct")]
    pub buy_stop_pct: f64,
    #[serde(default = "default_sell_target_pct")]
    pub sell_target_pct: f64,
    #[serde(default = "default_sell_stop_pct")]
    pub sell_stop_pct: f64,
    /// Inclusive
    #[serde(default = "default_min_risk_reward")]
    pub min_risk_reward: f64,
    #[serde(default = "default_min_probability")]
    pub min_probability: f64,
    #[serde(default = "default_min_urgency")]
    pub min_urgency: f64,
    #[serde(default = "default_max_opportunities")]
    pub max_opportunities: usize,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: i64,
}

fn default_min_strength() -> f64 { 70.0 }
fn default_min_confidence() -> f64 { 0.65 }
fn default_buy_target_pct() -> f64 { 5.0 }
fn default_buy_stop_pct() -> f64 { 2.0 }
fn default_sell_target_pct() -> f64 { 4.0 }
fn default_sell_stop_pct() -> f64 { 2.0 }
fn default_min_risk_reward() -> f64 { 1.5 }
fn default_min_probability() -> f64 { 0.6 }
fn default_min_urgency() -> f64 { 0.3 }
fn default_max_opportunities() -> usize { 20 }
fn default_ttl_secs() -> i64 { 900 }

impl Default for OpportunityConfig {
    fn default() -> Self {
        Self {
            min_strength: default_min_strength(),
            min_confidence: default_min_confidence(),
            buy_target_pct: default_buy_target_pct(),
            buy_stop_pct: default_buy_stop_pct(),
            sell_target_pct: default_sell_target_pct(),
            sell_stop_pct: default_sell_stop_pct(),
            min_risk_reward: default_min_risk_reward(),
            min_probability: default_min_probability(),
            min_urgency: default_min_urgency(),
            max_opportunities: default_max_opportunities(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

/// Shorter timeframes are more time-sensitive
fn timeframe_weight(timeframe: &str) -> f64 {
    match timeframe {
        "1m" => 1.0,
        "5m" => 0.8,
        "15m" => 0.6,
        "1h" => 0.4,
        "4h" => 0.2,
        "1d" => 0.1,
        _ => 0.5,
    }
}

/// Price a signal; `None` if it does not pass every filter
pub fn evaluate(signal: &MarketSignal, config: &OpportunityConfig, now: DateTime<Utc>) -> Option<TradingOpportunity> {
    let side = signal.direction.side()?;
    if signal.strength < config.min_strength || signal.confidence < config.min_confidence {
        return None;
    }
    if signal.price <= 0.0 {
        return None;
    }

    let entry = signal.price;
    let (target_pct, stop_pct) = match side {
        Side::Buy => (config.buy_target_pct, config.buy_stop_pct),
        Side::Sell => (config.sell_target_pct, config.sell_stop_pct),
    };
    if stop_pct <= 0.0 {
        return None;
    }
    let (target, stop) = match side {
        Side::Buy => (entry * (1.0 + target_pct / 100.0), entry * (1.0 - stop_pct / 100.0)),
        Side::Sell => (entry * (1.0 - target_pct / 100.0), entry * (1.0 + stop_pct / 100.0)),
    };

    // Ratio of the configured percentages so the boundary compares exactly
    let risk_reward = target_pct / stop_pct;
    let probability = (0.6 * signal.confidence + 0.4 * signal.strength / 100.0).clamp(0.0, 1.0);
    let urgency = (0.4 * signal.strength / 100.0
        + 0.3 * (signal.indicators.momentum.abs() / 5.0).min(1.0)
        + 0.3 * timeframe_weight(&signal.timeframe))
    .clamp(0.0, 1.0);

    if risk_reward < config.min_risk_reward
        || probability < config.min_probability
        || urgency < config.min_urgency
    {
        debug!(
            symbol = %signal.symbol,
            risk_reward,
            probability,
            urgency,
            "Opportunity filtered"
        );
        return None;
    }

    Some(TradingOpportunity {
        id: TradingOpportunity::id_for(&signal.symbol, &signal.timeframe, side, signal.tick_time),
        symbol: signal.symbol.clone(),
        timeframe: signal.timeframe.clone(),
        side,
        entry,
        target,
        stop,
        risk_reward,
        probability,
        urgency,
        urgency_class: UrgencyClass::from_score(urgency),
        signal_strength: signal.strength,
        signal_confidence: signal.confidence,
        created_at: now,
        expires_at: now + Duration::seconds(config.ttl_secs),
    })
}

/// Ranked, bounded list of live opportunities
pub struct OpportunityBook {
    config: OpportunityConfig,
    ranked: Vec<TradingOpportunity>,
}

impl OpportunityBook {
    pub fn new(config: OpportunityConfig) -> Self {
        Self { config, ranked: Vec::new() }
    }

    pub fn config(&self) -> &OpportunityConfig {
        &self.config
    }

    /// Merge fresh signals into the book
    ///
    /// Expired and already-decided opportunities leave the book; an id seen
    /// again keeps its first creation time.
    pub fn scan(&mut self, signals: &[MarketSignal], now: DateTime<Utc>, decided: &HashSet<String>) -> usize {
        let mut by_id: HashMap<String, TradingOpportunity> = self
            .ranked
            .drain(..)
            .filter(|o| !o.is_expired(now) && !decided.contains(&o.id))
            .map(|o| (o.id.clone(), o))
            .collect();

        let mut added = 0;
        for signal in signals {
            if let Some(opportunity) = evaluate(signal, &self.config, now) {
                if decided.contains(&opportunity.id) || by_id.contains_key(&opportunity.id) {
                    continue;
                }
                by_id.insert(opportunity.id.clone(), opportunity);
                added += 1;
            }
        }

        let mut ranked: Vec<TradingOpportunity> = by_id.into_values().collect();
        ranked.sort_by(|a, b| {
            b.rank_score()
                .total_cmp(&a.rank_score())
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked.truncate(self.config.max_opportunities);
        self.ranked = ranked;
        added
    }

    pub fn ranked(&self) -> &[TradingOpportunity] {
        &self.ranked
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{IndicatorValues, SignalDirection};

    fn signal(symbol: &str, direction: SignalDirection, strength: f64, confidence: f64) -> MarketSignal {
        MarketSignal {
            symbol: symbol.to_string(),
            timeframe: "5m".to_string(),
            direction,
            strength,
            confidence,
            price: 100.0,
            indicators: IndicatorValues {
                sma_fast: 101.0,
                sma_slow: 100.0,
                rsi: 55.0,
                momentum: 2.0,
                volume_ratio: 1.2,
            },
            tick_time: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_buy_opportunity_pricing() {
        let now = Utc::now();
        let opp = evaluate(&signal("BTC/USDT", SignalDirection::Buy, 85.0, 0.8), &OpportunityConfig::default(), now)
            .expect("strong buy should qualify");
        assert_eq!(opp.side, Side::Buy);
        assert!((opp.target - 105.0).abs() < 1e-9);
        assert!((opp.stop - 98.0).abs() < 1e-9);
        assert!((opp.risk_reward - 2.5).abs() < 1e-9);
        assert_eq!(opp.expires_at - opp.created_at, Duration::seconds(900));
    }

    #[test]
    fn test_risk_reward_boundary_is_inclusive() {
        let now = Utc::now();
        let sig = signal("ETH/USDT", SignalDirection::Sell, 85.0, 0.8);

        let exact = OpportunityConfig { sell_target_pct: 3.0, sell_stop_pct: 2.0, ..Default::default() };
        let opp = evaluate(&sig, &exact, now).expect("RR of exactly 1.5 is accepted");
        assert_eq!(opp.risk_reward, 1.5);

        let below = OpportunityConfig { sell_target_pct: 2.9, sell_stop_pct: 2.0, ..Default::default() };
        assert!(evaluate(&sig, &below, now).is_none());
    }

    #[test]
    fn test_weak_or_hold_signals_are_ignored() {
        let now = Utc::now();
        let config = OpportunityConfig::default();
        assert!(evaluate(&signal("A/USDT", SignalDirection::Buy, 65.0, 0.9), &config, now).is_none());
        assert!(evaluate(&signal("A/USDT", SignalDirection::Buy, 90.0, 0.5), &config, now).is_none());
        assert!(evaluate(&signal("A/USDT", SignalDirection::Hold, 90.0, 0.9), &config, now).is_none());
    }

    #[test]
    fn test_scan_ranks_bounds_and_skips_decided() {
        let now = Utc::now();
        let mut book = OpportunityBook::new(OpportunityConfig { max_opportunities: 2, ..Default::default() });
        let signals = vec![
            signal("A/USDT", SignalDirection::Buy, 75.0, 0.7),
            signal("B/USDT", SignalDirection::Buy, 95.0, 0.95),
            signal("C/USDT", SignalDirection::Buy, 85.0, 0.8),
        ];

        let mut decided = HashSet::new();
        decided.insert(TradingOpportunity::id_for("C/USDT", "5m", Side::Buy, signals[2].tick_time));

        book.scan(&signals, now, &decided);
        let symbols: Vec<&str> = book.ranked().iter().map(|o| o.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["B/USDT", "A/USDT"]);

        // Rescanning the same signals does not duplicate
        assert_eq!(book.scan(&signals, now, &decided), 0);
        assert_eq!(book.len(), 2);
    }

    #[test]
    fn test_expired_opportunities_leave_the_book() {
        let now = Utc::now();
        let mut book = OpportunityBook::new(OpportunityConfig::default());
        book.scan(&[signal("A/USDT", SignalDirection::Buy, 85.0, 0.8)], now, &HashSet::new());
        assert_eq!(book.len(), 1);

        book.scan(&[], now + Duration::seconds(901), &HashSet::new());
        assert!(book.is_empty());
    }
}
