//! Protection measures
//!
//! Actionable counterpart to alerts. Each measure watches one metric of the
//! latest snapshot and rate-limits itself through its last-triggered time:
//! Armed -> Triggered -> Armed once the cooldown elapses.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::{RiskMetric, RiskMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionKind {
    ReduceExposure,
    HaltNewEntries,
    HedgeCorrelation,
    EmergencyLiquidation,
}

impl ProtectionKind {
    pub fn action(&self) -> &'static str {
        match self {
            ProtectionKind::ReduceExposure => "Scale down open positions",
            ProtectionKind::HaltNewEntries => "Stop opening new positions",
            ProtectionKind::HedgeCorrelation => "Hedge correlated exposure",
            ProtectionKind::EmergencyLiquidation => "Liquidate to stable assets",
        }
    }

    /// Whether the measure blocks new entries while triggered
    pub fn halts_entries(&self) -> bool {
        matches!(self, ProtectionKind::HaltNewEntries | ProtectionKind::EmergencyLiquidation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionState {
    Armed,
    Triggered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionConfig {
    pub kind: ProtectionKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub metric: RiskMetric,
    /// Fires when the metric reaches this value
    pub threshold: f64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: i64,
}

fn default_enabled() -> bool { true }
fn default_cooldown_secs() -> i64 { 15 * 60 }

pub fn default_protections() -> Vec<ProtectionConfig> {
    vec![
        ProtectionConfig {
            kind: ProtectionKind::ReduceExposure,
            enabled: true,
            metric: RiskMetric::Composite,
            threshold: 75.0,
            cooldown_secs: 30 * 60,
        },
        ProtectionConfig {
            kind: ProtectionKind::HaltNewEntries,
            enabled: true,
            metric: RiskMetric::MaxDrawdown,
            threshold: 0.15,
            cooldown_secs: 60 * 60,
        },
        ProtectionConfig {
            kind: ProtectionKind::HedgeCorrelation,
            enabled: true,
            metric: RiskMetric::CorrelationScore,
            threshold: 70.0,
            cooldown_secs: 60 * 60,
        },
        ProtectionConfig {
            kind: ProtectionKind::EmergencyLiquidation,
            enabled: false,
            metric: RiskMetric::Composite,
            threshold: 90.0,
            cooldown_secs: 4 * 60 * 60,
        },
    ]
}

/// Trigger published for downstream executors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionAction {
    pub kind: ProtectionKind,
    pub metric: RiskMetric,
    pub value: f64,
    pub threshold: f64,
    pub action: String,
    pub triggered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionMeasure {
    config: ProtectionConfig,
    last_triggered: Option<DateTime<Utc>>,
}

impl ProtectionMeasure {
    pub fn new(config: ProtectionConfig) -> Self {
        Self { config, last_triggered: None }
    }

    pub fn kind(&self) -> ProtectionKind {
        self.config.kind
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn last_triggered(&self) -> Option<DateTime<Utc>> {
        self.last_triggered
    }

    pub fn state(&self, now: DateTime<Utc>) -> ProtectionState {
        match self.last_triggered {
            Some(at) if now < at + Duration::seconds(self.config.cooldown_secs) => ProtectionState::Triggered,
            _ => ProtectionState::Armed,
        }
    }

    /// Fire if armed, enabled and the metric is at or past threshold
    pub fn evaluate(&mut self, metrics: &RiskMetrics, now: DateTime<Utc>) -> Option<ProtectionAction> {
        if !self.config.enabled || self.state(now) == ProtectionState::Triggered {
            return None;
        }
        let value = self.config.metric.read(metrics);
        if value < self.config.threshold {
            return None;
        }

        self.last_triggered = Some(now);
        warn!(
            kind = ?self.config.kind,
            metric = %self.config.metric,
            value,
            threshold = self.config.threshold,
            "Protection measure triggered"
        );
        Some(ProtectionAction {
            kind: self.config.kind,
            metric: self.config.metric,
            value,
            threshold: self.config.threshold,
            action: self.config.kind.action().to_string(),
            triggered_at: now,
        })
    }
}

/// Summary row for status output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionStatus {
    pub kind: ProtectionKind,
    pub enabled: bool,
    pub state: ProtectionState,
    pub last_triggered: Option<DateTime<Utc>>,
}

pub struct ProtectionBook {
    measures: Vec<ProtectionMeasure>,
}

impl ProtectionBook {
    pub fn new(configs: Vec<ProtectionConfig>) -> Self {
        Self {
            measures: configs.into_iter().map(ProtectionMeasure::new).collect(),
        }
    }

    pub fn evaluate(&mut self, metrics: &RiskMetrics, now: DateTime<Utc>) -> Vec<ProtectionAction> {
        self.measures
            .iter_mut()
            .filter_map(|m| m.evaluate(metrics, now))
            .collect()
    }

    /// True while any entry-halting measure is inside its cooldown
    pub fn entries_halted(&self, now: DateTime<Utc>) -> bool {
        self.measures
            .iter()
            .any(|m| m.kind().halts_entries() && m.state(now) == ProtectionState::Triggered)
    }

    pub fn status(&self, now: DateTime<Utc>) -> Vec<ProtectionStatus> {
        self.measures
            .iter()
            .map(|m| ProtectionStatus {
                kind: m.kind(),
                enabled: m.enabled(),
                state: m.state(now),
                last_triggered: m.last_triggered(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::types::RiskScores;

    fn metrics(composite: f64, drawdown: f64) -> RiskMetrics {
        RiskMetrics {
            portfolio_value: 1_000.0,
            position_count: 2,
            var_value: 10.0,
            var_pct: 0.01,
            sharpe: 1.0,
            max_drawdown: drawdown,
            volatility: 0.5,
            concentration: 0.5,
            correlation: 0.3,
            liquidity: 0.2,
            scores: RiskScores::default(),
            composite,
            estimator: "fixed".into(),
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn test_armed_triggered_armed_cycle() {
        let mut measure = ProtectionMeasure::new(default_protections()[0].clone());
        let now = Utc::now();
        assert_eq!(measure.state(now), ProtectionState::Armed);

        assert!(measure.evaluate(&metrics(80.0, 0.0), now).is_some());
        assert_eq!(measure.state(now), ProtectionState::Triggered);

        // Rate-limited inside the cooldown
        assert!(measure.evaluate(&metrics(95.0, 0.0), now + Duration::minutes(10)).is_none());

        let later = now + Duration::minutes(31);
        assert_eq!(measure.state(later), ProtectionState::Armed);
        assert!(measure.evaluate(&metrics(80.0, 0.0), later).is_some());
    }

    #[test]
    fn test_below_threshold_stays_armed() {
        let mut measure = ProtectionMeasure::new(default_protections()[0].clone());
        assert!(measure.evaluate(&metrics(60.0, 0.0), Utc::now()).is_none());
        assert!(measure.last_triggered().is_none());
    }

    #[test]
    fn test_disabled_measure_never_fires() {
        let mut book = ProtectionBook::new(default_protections());
        let actions = book.evaluate(&metrics(99.0, 0.0), Utc::now());
        assert!(actions.iter().all(|a| a.kind != ProtectionKind::EmergencyLiquidation));
        assert!(actions.iter().any(|a| a.kind == ProtectionKind::ReduceExposure));
    }

    #[test]
    fn test_drawdown_halts_entries_until_cooldown() {
        let mut book = ProtectionBook::new(default_protections());
        let now = Utc::now();
        assert!(!book.entries_halted(now));

        book.evaluate(&metrics(10.0, 0.2), now);
        assert!(book.entries_halted(now + Duration::minutes(5)));
        assert!(!book.entries_halted(now + Duration::minutes(61)));
    }
}
