//! Market and holdings types consumed by the risk engine and pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::venue::VenueId;

/// One market-data observation for a symbol / timeframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTick {
    pub symbol: String,
    pub timeframe: String,
    pub price: f64,
    pub volume: f64,
    pub high: f64,
    pub low: f64,
    pub change_pct: f64,
    pub timestamp: DateTime<Utc>,
}

/// Coarse asset bucket used for correlation and default estimates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Major,
    LargeCap,
    SmallCap,
    Stablecoin,
    DefiToken,
}

impl Default for AssetClass {
    fn default() -> Self {
        Self::LargeCap
    }
}

impl AssetClass {
    /// Annualized (expected return, volatility) assumed when no hint is given
    pub fn default_estimates(&self) -> (f64, f64) {
        match self {
            AssetClass::Major => (0.15, 0.60),
            AssetClass::LargeCap => (0.20, 0.80),
            AssetClass::SmallCap => (0.30, 1.20),
            AssetClass::Stablecoin => (0.04, 0.02),
            AssetClass::DefiToken => (0.25, 1.00),
        }
    }
}

/// Position as reported by the holdings aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionHolding {
    pub symbol: String,
    /// Market value in quote currency
    pub value: f64,
    pub venue: VenueId,
    #[serde(default)]
    pub asset_class: AssetClass,
    /// Held through a decentralized-finance protocol
    #[serde(default)]
    pub is_defi: bool,
    /// 0 = illiquid, 1 = fully liquid
    #[serde(default = "default_liquidity")]
    pub liquidity: f64,
    /// Annualized expected return, overrides the asset-class default
    #[serde(default)]
    pub expected_return: Option<f64>,
    /// Annualized volatility, overrides the asset-class default
    #[serde(default)]
    pub volatility: Option<f64>,
}

fn default_liquidity() -> f64 {
    0.8
}

impl PositionHolding {
    pub fn new(symbol: impl Into<String>, value: f64, venue: impl Into<VenueId>) -> Self {
        Self {
            symbol: symbol.into(),
            value,
            venue: venue.into(),
            asset_class: AssetClass::default(),
            is_defi: false,
            liquidity: default_liquidity(),
            expected_return: None,
            volatility: None,
        }
    }

    pub fn with_class(mut self, asset_class: AssetClass) -> Self {
        self.asset_class = asset_class;
        self
    }

    pub fn with_liquidity(mut self, liquidity: f64) -> Self {
        self.liquidity = liquidity;
        self
    }

    pub fn defi(mut self) -> Self {
        self.is_defi = true;
        self
    }
}

/// Portfolio holdings at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub positions: Vec<PositionHolding>,
    /// Exogenous macro stress indicator in [0, 1]
    #[serde(default)]
    pub macro_stress: f64,
    pub taken_at: DateTime<Utc>,
}

impl PortfolioSnapshot {
    pub fn new(positions: Vec<PositionHolding>, macro_stress: f64, taken_at: DateTime<Utc>) -> Self {
        Self { positions, macro_stress, taken_at }
    }

    pub fn total_value(&self) -> f64 {
        self.positions.iter().map(|p| p.value.max(0.0)).sum()
    }

    /// Position weights summing to 1, empty when the portfolio has no value
    pub fn weights(&self) -> Vec<f64> {
        let total = self.total_value();
        if total <= 0.0 {
            return Vec::new();
        }
        self.positions.iter().map(|p| p.value.max(0.0) / total).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        let snapshot = PortfolioSnapshot::new(
            vec![
                PositionHolding::new("BTC/USDT", 600.0, "binance"),
                PositionHolding::new("ETH/USDT", 400.0, "binance"),
            ],
            0.0,
            Utc::now(),
        );
        let weights = snapshot.weights();
        assert_eq!(weights, vec![0.6, 0.4]);
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_portfolio_has_no_weights() {
        let snapshot = PortfolioSnapshot::new(Vec::new(), 0.0, Utc::now());
        assert!(snapshot.weights().is_empty());
    }
}
