//! Return and correlation estimators
//!
//! The engine's control flow only sees [`RiskEstimator`]. Production can swap
//! in data-driven estimates; tests inject deterministic fakes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::sync::Mutex;

use crate::market::PositionHolding;

/// Trading days per year for crypto markets
pub const PERIODS_PER_YEAR: f64 = 365.0;

pub trait RiskEstimator: Send + Sync {
    fn name(&self) -> &str;

    /// Annualized expected return
    fn expected_return(&self, position: &PositionHolding) -> f64;

    /// Annualized volatility
    fn volatility(&self, position: &PositionHolding) -> f64;

    /// Pairwise return correlation in [-1, 1]
    fn correlation(&self, a: &PositionHolding, b: &PositionHolding) -> f64;

    /// One joint draw of per-position returns over `horizon_days`
    fn sample_returns(&self, positions: &[PositionHolding], horizon_days: f64) -> Vec<f64>;
}

/// Correlation between positions sharing an asset class
const SAME_CLASS_CORRELATION: f64 = 0.6;
/// Correlation between any two crypto positions
const MARKET_CORRELATION: f64 = 0.25;

/// Two-factor Monte-Carlo estimator
///
/// Each return loads on a market factor and an asset-class factor so the
/// sampled pairwise correlations match [`RiskEstimator::correlation`].
pub struct MonteCarloEstimator {
    rng: Mutex<StdRng>,
}

impl MonteCarloEstimator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng: Mutex::new(rng) }
    }

    /// Standard normal draw (Box-Muller)
    fn normal(rng: &mut StdRng) -> f64 {
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }
}

impl RiskEstimator for MonteCarloEstimator {
    fn name(&self) -> &str {
        "monte_carlo"
    }

    fn expected_return(&self, position: &PositionHolding) -> f64 {
        position
            .expected_return
            .unwrap_or_else(|| position.asset_class.default_estimates().0)
    }

    fn volatility(&self, position: &PositionHolding) -> f64 {
        position
            .volatility
            .unwrap_or_else(|| position.asset_class.default_estimates().1)
            .max(0.0)
    }

    fn correlation(&self, a: &PositionHolding, b: &PositionHolding) -> f64 {
        if a.symbol == b.symbol {
            1.0
        } else if a.asset_class == b.asset_class {
            SAME_CLASS_CORRELATION
        } else {
            MARKET_CORRELATION
        }
    }

    fn sample_returns(&self, positions: &[PositionHolding], horizon_days: f64) -> Vec<f64> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let market_loading = MARKET_CORRELATION.sqrt();
        let class_loading = (SAME_CLASS_CORRELATION - MARKET_CORRELATION).sqrt();
        let idio_loading = (1.0 - SAME_CLASS_CORRELATION).sqrt();

        let market = Self::normal(&mut rng);
        let mut class_shocks: Vec<(crate::market::AssetClass, f64)> = Vec::new();
        let years = horizon_days / PERIODS_PER_YEAR;

        positions
            .iter()
            .map(|p| {
                let class_shock = match class_shocks.iter().find(|(c, _)| *c == p.asset_class) {
                    Some((_, shock)) => *shock,
                    None => {
                        let shock = Self::normal(&mut rng);
                        class_shocks.push((p.asset_class, shock));
                        shock
                    }
                };
                let z = market_loading * market
                    + class_loading * class_shock
                    + idio_loading * Self::normal(&mut rng);
                self.expected_return(p) * years + self.volatility(p) * years.sqrt() * z
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::market::AssetClass;

    /// Deterministic estimator returning the same draw every time
    pub(crate) struct FixedEstimator {
        pub expected_return: f64,
        pub volatility: f64,
        pub correlation: f64,
        pub draw: f64,
    }

    impl FixedEstimator {
        pub(crate) fn calm() -> Self {
            Self { expected_return: 0.10, volatility: 0.20, correlation: 0.3, draw: -0.01 }
        }
    }

    impl RiskEstimator for FixedEstimator {
        fn name(&self) -> &str {
            "fixed"
        }

        fn expected_return(&self, _position: &PositionHolding) -> f64 {
            self.expected_return
        }

        fn volatility(&self, _position: &PositionHolding) -> f64 {
            self.volatility
        }

        fn correlation(&self, a: &PositionHolding, b: &PositionHolding) -> f64 {
            if a.symbol == b.symbol {
                1.0
            } else {
                self.correlation
            }
        }

        fn sample_returns(&self, positions: &[PositionHolding], _horizon_days: f64) -> Vec<f64> {
            vec![self.draw; positions.len()]
        }
    }

    #[test]
    fn test_class_defaults_and_overrides() {
        let est = MonteCarloEstimator::new(Some(1));
        let stable = PositionHolding::new("USDC/USDT", 100.0, "binance").with_class(AssetClass::Stablecoin);
        assert_eq!(est.volatility(&stable), 0.02);

        let mut hinted = PositionHolding::new("BTC/USDT", 100.0, "binance");
        hinted.volatility = Some(0.5);
        assert_eq!(est.volatility(&hinted), 0.5);
    }

    #[test]
    fn test_correlation_heuristic() {
        let est = MonteCarloEstimator::new(Some(1));
        let btc = PositionHolding::new("BTC/USDT", 1.0, "binance").with_class(AssetClass::Major);
        let eth = PositionHolding::new("ETH/USDT", 1.0, "binance").with_class(AssetClass::Major);
        let uni = PositionHolding::new("UNI/USDT", 1.0, "binance").with_class(AssetClass::DefiToken);
        assert_eq!(est.correlation(&btc, &btc), 1.0);
        assert_eq!(est.correlation(&btc, &eth), SAME_CLASS_CORRELATION);
        assert_eq!(est.correlation(&btc, &uni), MARKET_CORRELATION);
    }

    #[test]
    fn test_seeded_samples_are_reproducible() {
        let positions = vec![
            PositionHolding::new("BTC/USDT", 1.0, "binance"),
            PositionHolding::new("ETH/USDT", 1.0, "binance"),
        ];
        let a = MonteCarloEstimator::new(Some(42));
        let b = MonteCarloEstimator::new(Some(42));
        for _ in 0..10 {
            let ra = a.sample_returns(&positions, 1.0);
            assert_eq!(ra, b.sample_returns(&positions, 1.0));
            assert!(ra.iter().all(|r| r.is_finite()));
        }
    }
}
