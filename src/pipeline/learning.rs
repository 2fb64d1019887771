//! Learning stage
//!
//! Grades recent submitted Execute decisions against later prices and nudges the
//! scoring weights used for future decisions. Past decisions are never
//! touched.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::decisions::ScoringWeights;
use super::types::{DecisionOutcome, ExecutionStatus, TradingDecision};
use crate::venue::Side;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Most recent submitted Execute decisions considered
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_step")]
    pub step: f64,
    #[serde(default = "default_min_weight")]
    pub min_weight: f64,
    #[serde(default = "default_max_weight")]
    pub max_weight: f64,
    #[serde(default = "default_low_win_rate")]
    pub low_win_rate: f64,
    #[serde(default = "default_high_win_rate")]
    pub high_win_rate: f64,
}

fn default_window() -> usize { 50 }
fn default_min_samples() -> usize { 5 }
fn default_step() -> f64 { 0.05 }
fn default_min_weight() -> f64 { 0.5 }
fn default_max_weight() -> f64 { 1.5 }
fn default_low_win_rate() -> f64 { 0.45 }
fn default_high_win_rate() -> f64 { 0.6 }

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            min_samples: default_min_samples(),
            step: default_step(),
            min_weight: default_min_weight(),
            max_weight: default_max_weight(),
            low_win_rate: default_low_win_rate(),
            high_win_rate: default_high_win_rate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningReport {
    pub samples: usize,
    pub wins: usize,
    pub win_rate: Option<f64>,
    pub previous: ScoringWeights,
    pub weights: ScoringWeights,
}

impl LearningReport {
    pub fn adjusted(&self) -> bool {
        self.previous != self.weights
    }
}

/// Some(true) if price moved toward the target, None while flat or unpriced
fn grade(decision: &TradingDecision, last_prices: &HashMap<String, f64>) -> Option<bool> {
    let price = *last_prices.get(&decision.symbol)?;
    let moved = match decision.side {
        Side::Buy => price - decision.entry,
        Side::Sell => decision.entry - price,
    };
    if moved == 0.0 {
        None
    } else {
        Some(moved > 0.0)
    }
}

fn win_rate(wins: usize, samples: usize) -> Option<f64> {
    (samples > 0).then(|| wins as f64 / samples as f64)
}

pub fn learn(
    decisions: &[TradingDecision],
    last_prices: &HashMap<String, f64>,
    weights: ScoringWeights,
    config: &LearningConfig,
) -> LearningReport {
    let graded: Vec<(bool, bool)> = decisions
        .iter()
        .rev()
        .filter(|d| d.outcome == DecisionOutcome::Execute && matches!(d.execution, ExecutionStatus::Submitted { .. }))
        .take(config.window)
        .filter_map(|d| grade(d, last_prices).map(|won| (won, d.alignment > 0.0)))
        .collect();

    let samples = graded.len();
    let wins = graded.iter().filter(|(won, _)| *won).count();
    let rate = win_rate(wins, samples);

    let mut next = weights;
    if samples >= config.min_samples {
        if let Some(rate) = rate {
            if rate < config.low_win_rate {
                next.risk += config.step;
                next.quality -= config.step / 2.0;
            } else if rate > config.high_win_rate {
                next.risk -= config.step;
                next.quality += config.step / 2.0;
            }
        }

        let aligned: Vec<bool> = graded.iter().filter(|(_, a)| *a).map(|(w, _)| *w).collect();
        let unaligned: Vec<bool> = graded.iter().filter(|(_, a)| !*a).map(|(w, _)| *w).collect();
        let aligned_rate = win_rate(aligned.iter().filter(|w| **w).count(), aligned.len());
        let unaligned_rate = win_rate(unaligned.iter().filter(|w| **w).count(), unaligned.len());
        if let (Some(a), Some(u)) = (aligned_rate, unaligned_rate) {
            if a > u {
                next.alignment += config.step;
            } else if a < u {
                next.alignment -= config.step;
            }
        }
    }

    LearningReport {
        samples,
        wins,
        win_rate: rate,
        previous: weights,
        weights: next.clamped(config.min_weight, config.max_weight),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::{TradingMode, VenueId};
    use chrono::Utc;

    fn executed(symbol: &str, side: Side, entry: f64, alignment: f64) -> TradingDecision {
        TradingDecision {
            id: format!("decision:{}:{}", symbol, entry),
            opportunity_id: symbol.to_string(),
            symbol: symbol.to_string(),
            timeframe: "5m".to_string(),
            side,
            outcome: DecisionOutcome::Execute,
            score: 80.0,
            quality: 80.0,
            risk_penalty: 5.0,
            alignment,
            reasoning: Vec::new(),
            entry,
            target: entry * 1.05,
            stop: entry * 0.98,
            position_size: 1.0,
            execution_plan: None,
            execution: ExecutionStatus::Submitted {
                venue: VenueId::new("binance"),
                order_id: format!("order-{}", entry),
                mode: TradingMode::Simulated,
            },
            decided_at: Utc::now(),
        }
    }

    fn prices(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(s, p)| (s.to_string(), *p)).collect()
    }

    #[test]
    fn test_losing_streak_raises_risk_weight() {
        let decisions: Vec<TradingDecision> = (0..6).map(|i| executed("BTC/USDT", Side::Buy, 100.0 + i as f64, 5.0)).collect();
        let report = learn(&decisions, &prices(&[("BTC/USDT", 90.0)]), ScoringWeights::default(), &LearningConfig::default());

        assert_eq!(report.samples, 6);
        assert_eq!(report.wins, 0);
        assert!((report.weights.risk - 1.05).abs() < 1e-9);
        assert!((report.weights.quality - 0.975).abs() < 1e-9);
        assert!(report.adjusted());
    }

    #[test]
    fn test_unsubmitted_decisions_are_not_graded() {
        let decisions: Vec<TradingDecision> = (0..6)
            .map(|i| {
                let mut d = executed("BTC/USDT", Side::Buy, 100.0 + i as f64, 5.0);
                d.execution = if i % 2 == 0 {
                    ExecutionStatus::Failed { reason: "insufficient balance".into() }
                } else {
                    ExecutionStatus::Pending
                };
                d
            })
            .collect();
        let report = learn(&decisions, &prices(&[("BTC/USDT", 90.0)]), ScoringWeights::default(), &LearningConfig::default());

        assert_eq!(report.samples, 0);
        assert!(!report.adjusted());
    }

    #[test]
    fn test_too_few_samples_changes_nothing() {
        let decisions = vec![executed("BTC/USDT", Side::Buy, 100.0, 5.0)];
        let report = learn(&decisions, &prices(&[("BTC/USDT", 90.0)]), ScoringWeights::default(), &LearningConfig::default());
        assert!(!report.adjusted());
    }

    #[test]
    fn test_alignment_weight_follows_aligned_wins() {
        let mut decisions = Vec::new();
        for i in 0..3 {
            // aligned longs win, unaligned shorts lose
            decisions.push(executed("ETH/USDT", Side::Buy, 100.0 + i as f64, 5.0));
            decisions.push(executed("ETH/USDT", Side::Sell, 100.0 + i as f64, -5.0));
        }
        let report = learn(&decisions, &prices(&[("ETH/USDT", 110.0)]), ScoringWeights::default(), &LearningConfig::default());
        assert_eq!(report.win_rate, Some(0.5));
        assert!((report.weights.alignment - 1.05).abs() < 1e-9);
        assert_eq!(report.weights.risk, 1.0);
    }

    #[test]
    fn test_weights_stay_within_bounds() {
        let decisions: Vec<TradingDecision> = (0..10).map(|i| executed("BTC/USDT", Side::Buy, 100.0 + i as f64, 5.0)).collect();
        let mut weights = ScoringWeights { quality: 0.5, risk: 1.5, alignment: 1.0 };
        for _ in 0..5 {
            weights = learn(&decisions, &prices(&[("BTC/USDT", 50.0)]), weights, &LearningConfig::default()).weights;
        }
        assert_eq!(weights.quality, 0.5);
        assert_eq!(weights.risk, 1.5);
    }
}
