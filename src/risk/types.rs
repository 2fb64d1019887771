//! Risk engine types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Market,
    Volatility,
    Drawdown,
    Concentration,
    Correlation,
    Liquidity,
    Counterparty,
    Systemic,
    /// Configured limit breached
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Severity from how far a value sits past its threshold
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > 1.5 {
            Severity::Critical
        } else if ratio > 1.2 {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Scalar read off a snapshot, used by limits and protection triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskMetric {
    /// VaR as a fraction of portfolio value
    VarPct,
    MaxDrawdown,
    /// Herfindahl sum of squared weights
    Concentration,
    /// Annualized portfolio volatility
    Volatility,
    CorrelationScore,
    LiquidityScore,
    Composite,
}

impl RiskMetric {
    pub fn read(&self, metrics: &RiskMetrics) -> f64 {
        match self {
            RiskMetric::VarPct => metrics.var_pct,
            RiskMetric::MaxDrawdown => metrics.max_drawdown,
            RiskMetric::Concentration => metrics.concentration,
            RiskMetric::Volatility => metrics.volatility,
            RiskMetric::CorrelationScore => metrics.scores.correlation,
            RiskMetric::LiquidityScore => metrics.scores.liquidity,
            RiskMetric::Composite => metrics.composite,
        }
    }
}

impl fmt::Display for RiskMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskMetric::VarPct => "var_pct",
            RiskMetric::MaxDrawdown => "max_drawdown",
            RiskMetric::Concentration => "concentration",
            RiskMetric::Volatility => "volatility",
            RiskMetric::CorrelationScore => "correlation_score",
            RiskMetric::LiquidityScore => "liquidity_score",
            RiskMetric::Composite => "composite",
        };
        f.write_str(s)
    }
}

/// Per-category scores, each in [0, 100]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskScores {
    pub var: f64,
    pub volatility: f64,
    pub drawdown: f64,
    pub concentration: f64,
    pub correlation: f64,
    pub liquidity: f64,
    pub counterparty: f64,
    pub systemic: f64,
}

/// Immutable output of one assessment cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub portfolio_value: f64,
    pub position_count: usize,
    /// Loss not exceeded at the configured confidence, in quote currency
    pub var_value: f64,
    pub var_pct: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub volatility: f64,
    pub concentration: f64,
    /// Weight-product-weighted mean absolute pairwise correlation
    pub correlation: f64,
    /// Weighted complement of liquidity ratings
    pub liquidity: f64,
    pub scores: RiskScores,
    pub composite: f64,
    pub estimator: String,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub id: String,
    pub category: RiskCategory,
    pub severity: Severity,
    pub current: f64,
    pub threshold: f64,
    pub message: String,
    pub recommendation: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RiskAlert {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
