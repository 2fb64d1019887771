//! Risk limits
//!
//! A limit's observed state is only ever written by [`RiskLimit::observe`],
//! so `breached` cannot drift from `current > limit`.

use serde::{Deserialize, Serialize};

use super::types::{RiskMetric, RiskMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    /// Breach is a policy violation
    Hard,
    /// Breach is a warning
    Soft,
}

/// Configured limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitConfig {
    pub name: String,
    pub kind: LimitKind,
    pub metric: RiskMetric,
    pub limit: f64,
}

impl LimitConfig {
    pub fn new(name: &str, kind: LimitKind, metric: RiskMetric, limit: f64) -> Self {
        Self { name: name.to_string(), kind, metric, limit }
    }
}

pub fn default_limits() -> Vec<LimitConfig> {
    vec![
        LimitConfig::new("var_95", LimitKind::Hard, RiskMetric::VarPct, 0.05),
        LimitConfig::new("max_drawdown", LimitKind::Hard, RiskMetric::MaxDrawdown, 0.20),
        LimitConfig::new("concentration", LimitKind::Soft, RiskMetric::Concentration, 0.40),
        LimitConfig::new("volatility", LimitKind::Soft, RiskMetric::Volatility, 0.80),
        LimitConfig::new("composite", LimitKind::Soft, RiskMetric::Composite, 70.0),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimit {
    name: String,
    kind: LimitKind,
    metric: RiskMetric,
    limit: f64,
    current: f64,
    utilization: f64,
    breached: bool,
}

impl From<LimitConfig> for RiskLimit {
    fn from(config: LimitConfig) -> Self {
        Self {
            name: config.name,
            kind: config.kind,
            metric: config.metric,
            limit: config.limit,
            current: 0.0,
            utilization: 0.0,
            breached: false,
        }
    }
}

impl RiskLimit {
    /// Record the metric's current value and derive utilization and breach
    pub fn observe(&mut self, metrics: &RiskMetrics) {
        self.current = self.metric.read(metrics);
        self.utilization = if self.limit > 0.0 { self.current / self.limit } else { 0.0 };
        self.breached = self.current > self.limit;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> LimitKind {
        self.kind
    }

    pub fn metric(&self) -> RiskMetric {
        self.metric
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn utilization(&self) -> f64 {
        self.utilization
    }

    pub fn breached(&self) -> bool {
        self.breached
    }
}
