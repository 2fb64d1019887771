//! Portfolio risk metrics
//!
//! Pure functions over a holdings snapshot and an estimator. Weights are the
//! snapshot's value weights and always sum to 1.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::estimator::RiskEstimator;
use super::types::{RiskMetrics, RiskScores};
use crate::error::{Error, Result};
use crate::market::{PortfolioSnapshot, PositionHolding};

/// Relative weight of each category in the composite score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeWeights {
    pub var: f64,
    pub volatility: f64,
    pub drawdown: f64,
    pub concentration: f64,
    pub correlation: f64,
    pub liquidity: f64,
    pub counterparty: f64,
    pub systemic: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            var: 0.20,
            volatility: 0.15,
            drawdown: 0.15,
            concentration: 0.15,
            correlation: 0.10,
            liquidity: 0.10,
            counterparty: 0.075,
            systemic: 0.075,
        }
    }
}

impl CompositeWeights {
    fn total(&self) -> f64 {
        self.var
            + self.volatility
            + self.drawdown
            + self.concentration
            + self.correlation
            + self.liquidity
            + self.counterparty
            + self.systemic
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_var_trials")]
    pub var_trials: usize,
    #[serde(default = "default_var_confidence")]
    pub var_confidence: f64,
    /// VaR and drawdown step horizon
    #[serde(default = "default_horizon_days")]
    pub horizon_days: f64,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    /// Steps replayed for the trailing equity curve
    #[serde(default = "default_drawdown_steps")]
    pub drawdown_steps: usize,
    #[serde(default)]
    pub weights: CompositeWeights,
}

fn default_var_trials() -> usize { 10_000 }
fn default_var_confidence() -> f64 { 0.95 }
fn default_horizon_days() -> f64 { 1.0 }
fn default_risk_free_rate() -> f64 { 0.02 }
fn default_drawdown_steps() -> usize { 90 }

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            var_trials: default_var_trials(),
            var_confidence: default_var_confidence(),
            horizon_days: default_horizon_days(),
            risk_free_rate: default_risk_free_rate(),
            drawdown_steps: default_drawdown_steps(),
            weights: CompositeWeights::default(),
        }
    }
}

// Values at which a category score saturates at 100
const VAR_PCT_CEILING: f64 = 0.10;
const VOLATILITY_CEILING: f64 = 1.0;
const DRAWDOWN_CEILING: f64 = 0.30;

fn weighted(weights: &[f64], values: &[f64]) -> f64 {
    weights.iter().zip(values).map(|(w, v)| w * v).sum()
}

/// Monte-Carlo VaR as a positive loss fraction
pub fn value_at_risk(
    positions: &[PositionHolding],
    weights: &[f64],
    estimator: &dyn RiskEstimator,
    trials: usize,
    confidence: f64,
    horizon_days: f64,
) -> f64 {
    if trials == 0 || positions.is_empty() {
        return 0.0;
    }
    let mut outcomes: Vec<f64> = (0..trials)
        .map(|_| weighted(weights, &estimator.sample_returns(positions, horizon_days)))
        .collect();
    outcomes.sort_by(|a, b| a.total_cmp(b));

    let index = (((1.0 - confidence) * trials as f64).floor() as usize).min(trials - 1);
    (-outcomes[index]).max(0.0)
}

/// Annualized volatility with correlation-weighted pairwise variance
pub fn portfolio_volatility(
    positions: &[PositionHolding],
    weights: &[f64],
    estimator: &dyn RiskEstimator,
) -> f64 {
    let vols: Vec<f64> = positions.iter().map(|p| estimator.volatility(p)).collect();
    let mut variance = 0.0;
    for i in 0..positions.len() {
        for j in 0..positions.len() {
            let rho = if i == j { 1.0 } else { estimator.correlation(&positions[i], &positions[j]) };
            variance += weights[i] * weights[j] * vols[i] * vols[j] * rho;
        }
    }
    variance.max(0.0).sqrt()
}

pub fn sharpe_ratio(
    positions: &[PositionHolding],
    weights: &[f64],
    estimator: &dyn RiskEstimator,
    risk_free_rate: f64,
) -> f64 {
    let volatility = portfolio_volatility(positions, weights, estimator);
    if volatility <= 0.0 {
        return 0.0;
    }
    let returns: Vec<f64> = positions.iter().map(|p| estimator.expected_return(p)).collect();
    (weighted(weights, &returns) - risk_free_rate) / volatility
}

/// Peak-to-trough decline over a simulated trailing equity curve
pub fn max_drawdown(
    positions: &[PositionHolding],
    weights: &[f64],
    estimator: &dyn RiskEstimator,
    steps: usize,
    horizon_days: f64,
) -> f64 {
    let mut equity = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut worst = 0.0_f64;
    for _ in 0..steps {
        let step = weighted(weights, &estimator.sample_returns(positions, horizon_days));
        equity = (equity * (1.0 + step)).max(0.0);
        peak = peak.max(equity);
        if peak > 0.0 {
            worst = worst.max((peak - equity) / peak);
        }
    }
    worst
}

/// Herfindahl index of position weights
pub fn concentration(weights: &[f64]) -> f64 {
    weights.iter().map(|w| w * w).sum()
}

/// Weight-product-weighted mean absolute pairwise correlation
pub fn correlation_risk(
    positions: &[PositionHolding],
    weights: &[f64],
    estimator: &dyn RiskEstimator,
) -> f64 {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for i in 0..positions.len() {
        for j in (i + 1)..positions.len() {
            let pair = weights[i] * weights[j];
            numerator += pair * estimator.correlation(&positions[i], &positions[j]).abs();
            denominator += pair;
        }
    }
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

pub fn liquidity_risk(positions: &[PositionHolding], weights: &[f64]) -> f64 {
    let illiquidity: Vec<f64> = positions.iter().map(|p| 1.0 - p.liquidity.clamp(0.0, 1.0)).collect();
    weighted(weights, &illiquidity)
}

/// Weight held through decentralized-finance protocols
pub fn defi_exposure(positions: &[PositionHolding], weights: &[f64]) -> f64 {
    positions
        .iter()
        .zip(weights)
        .filter(|(p, _)| p.is_defi)
        .map(|(_, w)| w)
        .sum()
}

/// Venue concentration and DeFi exposure, scored 0-100
pub fn counterparty_score(positions: &[PositionHolding], weights: &[f64]) -> f64 {
    let mut by_venue: HashMap<&str, f64> = HashMap::new();
    for (p, w) in positions.iter().zip(weights) {
        *by_venue.entry(p.venue.as_str()).or_default() += w;
    }
    let venue_hhi: f64 = by_venue.values().map(|w| w * w).sum();
    (venue_hhi * 60.0 + defi_exposure(positions, weights) * 40.0).clamp(0.0, 100.0)
}

/// Macro stress, market-wide correlation and DeFi exposure, scored 0-100
pub fn systemic_score(macro_stress: f64, correlation: f64, defi: f64) -> f64 {
    (macro_stress.clamp(0.0, 1.0) * 60.0 + correlation * 25.0 + defi * 15.0).clamp(0.0, 100.0)
}

fn saturating_score(value: f64, ceiling: f64) -> f64 {
    (value / ceiling).clamp(0.0, 1.0) * 100.0
}

/// Weighted composite clamped to [0, 100]
pub fn composite_score(scores: &RiskScores, weights: &CompositeWeights) -> f64 {
    let total = weights.total();
    if total <= 0.0 {
        return 0.0;
    }
    let sum = scores.var * weights.var
        + scores.volatility * weights.volatility
        + scores.drawdown * weights.drawdown
        + scores.concentration * weights.concentration
        + scores.correlation * weights.correlation
        + scores.liquidity * weights.liquidity
        + scores.counterparty * weights.counterparty
        + scores.systemic * weights.systemic;
    (sum / total).clamp(0.0, 100.0)
}

/// Run every metric over one snapshot
pub fn compute(
    snapshot: &PortfolioSnapshot,
    estimator: &dyn RiskEstimator,
    config: &MetricsConfig,
    now: DateTime<Utc>,
) -> Result<RiskMetrics> {
    let weights = snapshot.weights();
    if weights.is_empty() {
        return Err(Error::InsufficientData("portfolio holds no value".into()));
    }
    let positions = &snapshot.positions;
    let portfolio_value = snapshot.total_value();

    let var_pct = value_at_risk(
        positions,
        &weights,
        estimator,
        config.var_trials,
        config.var_confidence,
        config.horizon_days,
    );
    let volatility = portfolio_volatility(positions, &weights, estimator);
    let sharpe = sharpe_ratio(positions, &weights, estimator, config.risk_free_rate);
    let drawdown = max_drawdown(positions, &weights, estimator, config.drawdown_steps, config.horizon_days);
    let hhi = concentration(&weights);
    let correlation = correlation_risk(positions, &weights, estimator);
    let liquidity = liquidity_risk(positions, &weights);
    let defi = defi_exposure(positions, &weights);

    let scores = RiskScores {
        var: saturating_score(var_pct, VAR_PCT_CEILING),
        volatility: saturating_score(volatility, VOLATILITY_CEILING),
        drawdown: saturating_score(drawdown, DRAWDOWN_CEILING),
        concentration: (hhi * 100.0).clamp(0.0, 100.0),
        correlation: (correlation * 100.0).clamp(0.0, 100.0),
        liquidity: (liquidity * 100.0).clamp(0.0, 100.0),
        counterparty: counterparty_score(positions, &weights),
        systemic: systemic_score(snapshot.macro_stress, correlation, defi),
    };
    let composite = composite_score(&scores, &config.weights);

    let values = [var_pct, volatility, sharpe, drawdown, hhi, correlation, liquidity, composite];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(Error::RiskAssessment("non-finite metric".into()));
    }

    Ok(RiskMetrics {
        portfolio_value,
        position_count: positions.len(),
        var_value: var_pct * portfolio_value,
        var_pct,
        sharpe,
        max_drawdown: drawdown,
        volatility,
        concentration: hhi,
        correlation,
        liquidity,
        scores,
        composite,
        estimator: estimator.name().to_string(),
        computed_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::estimator::tests::FixedEstimator;

    fn book(values: &[f64]) -> PortfolioSnapshot {
        let positions = values
            .iter()
            .enumerate()
            .map(|(i, v)| PositionHolding::new(format!("T{}/USDT", i), *v, "binance"))
            .collect();
        PortfolioSnapshot::new(positions, 0.0, Utc::now())
    }

    fn fast_config() -> MetricsConfig {
        MetricsConfig { var_trials: 200, drawdown_steps: 30, ..Default::default() }
    }

    #[test]
    fn test_skewed_book_is_more_concentrated_than_equal_weights() {
        let skewed = [0.6, 0.4 / 3.0, 0.4 / 3.0, 0.4 / 3.0];
        let equal = [0.25; 4];
        assert!(concentration(&skewed) > concentration(&equal));
        assert!((concentration(&equal) - 0.25).abs() < 1e-12);

        let est = FixedEstimator::calm();
        let skewed = compute(&book(&[600.0, 133.3, 133.3, 133.3]), &est, &fast_config(), Utc::now()).unwrap();
        let equal = compute(&book(&[250.0; 4]), &est, &fast_config(), Utc::now()).unwrap();
        assert!(skewed.scores.concentration > equal.scores.concentration);
    }

    #[test]
    fn test_var_reads_sorted_distribution() {
        let est = FixedEstimator::calm();
        let snapshot = book(&[500.0, 500.0]);
        let weights = snapshot.weights();
        let var = value_at_risk(&snapshot.positions, &weights, &est, 100, 0.95, 1.0);
        assert!((var - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_gains_produce_zero_var_and_drawdown() {
        let est = FixedEstimator { draw: 0.02, ..FixedEstimator::calm() };
        let snapshot = book(&[1.0]);
        let weights = snapshot.weights();
        assert_eq!(value_at_risk(&snapshot.positions, &weights, &est, 50, 0.95, 1.0), 0.0);
        assert_eq!(max_drawdown(&snapshot.positions, &weights, &est, 20, 1.0), 0.0);
    }

    #[test]
    fn test_drawdown_tracks_peak_to_trough() {
        let est = FixedEstimator { draw: -0.10, ..FixedEstimator::calm() };
        let snapshot = book(&[1.0]);
        let dd = max_drawdown(&snapshot.positions, &snapshot.weights(), &est, 2, 1.0);
        assert!((dd - 0.19).abs() < 1e-12);
    }

    #[test]
    fn test_volatility_and_sharpe() {
        let est = FixedEstimator::calm();
        let snapshot = book(&[1.0, 1.0]);
        let weights = snapshot.weights();
        // 0.25 * 0.04 * 2 + 2 * 0.25 * 0.04 * 0.3 = 0.026
        let vol = portfolio_volatility(&snapshot.positions, &weights, &est);
        assert!((vol - 0.026_f64.sqrt()).abs() < 1e-12);

        let sharpe = sharpe_ratio(&snapshot.positions, &weights, &est, 0.02);
        assert!((sharpe - 0.08 / vol).abs() < 1e-12);
    }

    #[test]
    fn test_correlation_and_liquidity_risk() {
        let est = FixedEstimator::calm();
        let mut snapshot = book(&[1.0, 1.0, 2.0]);
        snapshot.positions[2].liquidity = 0.2;
        let weights = snapshot.weights();

        assert!((correlation_risk(&snapshot.positions, &weights, &est) - 0.3).abs() < 1e-12);
        // 0.25 * 0.2 + 0.25 * 0.2 + 0.5 * 0.8
        assert!((liquidity_risk(&snapshot.positions, &weights) - 0.5).abs() < 1e-12);
        assert_eq!(correlation_risk(&snapshot.positions[..1], &[1.0], &est), 0.0);
    }

    #[test]
    fn test_counterparty_reflects_venue_and_defi() {
        let spread = vec![
            PositionHolding::new("A/USDT", 1.0, "binance"),
            PositionHolding::new("B/USDT", 1.0, "kraken"),
        ];
        let stacked = vec![
            PositionHolding::new("A/USDT", 1.0, "binance"),
            PositionHolding::new("B/USDT", 1.0, "binance").defi(),
        ];
        let weights = [0.5, 0.5];
        assert!((counterparty_score(&spread, &weights) - 30.0).abs() < 1e-12);
        assert!((counterparty_score(&stacked, &weights) - 80.0).abs() < 1e-12);
    }

    #[test]
    fn test_composite_always_clamped() {
        let maxed = RiskScores {
            var: 500.0,
            volatility: 500.0,
            drawdown: 500.0,
            concentration: 500.0,
            correlation: 500.0,
            liquidity: 500.0,
            counterparty: 500.0,
            systemic: 500.0,
        };
        assert_eq!(composite_score(&maxed, &CompositeWeights::default()), 100.0);
        let negative = RiskScores { var: -50.0, ..RiskScores::default() };
        assert_eq!(composite_score(&negative, &CompositeWeights::default()), 0.0);

        let est = FixedEstimator { draw: -0.5, volatility: 5.0, ..FixedEstimator::calm() };
        let metrics = compute(&book(&[1.0]), &est, &fast_config(), Utc::now()).unwrap();
        assert!((0.0..=100.0).contains(&metrics.composite));
    }

    #[test]
    fn test_empty_portfolio_is_insufficient_data() {
        let est = FixedEstimator::calm();
        assert!(matches!(
            compute(&book(&[]), &est, &fast_config(), Utc::now()),
            Err(Error::InsufficientData(_))
        ));
    }
}
