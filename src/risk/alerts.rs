//! Risk alerts
//!
//! Observational only. One alert per breach event: a breach that persists
//! across cycles does not re-alert until it clears and recurs. Alerts expire
//! after a severity-dependent TTL during the sweep.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::{info, warn};
use uuid::Uuid;

use super::limits::{LimitKind, RiskLimit};
use super::types::{RiskAlert, RiskCategory, RiskMetric, RiskMetrics, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Herfindahl index above which concentration alerts
    #[serde(default = "default_concentration_threshold")]
    pub concentration_threshold: f64,
    /// Annualized portfolio volatility above which volatility alerts
    #[serde(default = "default_volatility_threshold")]
    pub volatility_threshold: f64,
    /// Liquidity score (0-100) above which liquidity alerts
    #[serde(default = "default_liquidity_threshold")]
    pub liquidity_threshold: f64,
    #[serde(default = "default_ttl_low_secs")]
    pub ttl_low_secs: i64,
    #[serde(default = "default_ttl_medium_secs")]
    pub ttl_medium_secs: i64,
    #[serde(default = "default_ttl_high_secs")]
    pub ttl_high_secs: i64,
    #[serde(default = "default_ttl_critical_secs")]
    pub ttl_critical_secs: i64,
    #[serde(default = "default_max_active")]
    pub max_active: usize,
}

fn default_concentration_threshold() -> f64 { 0.4 }
fn default_volatility_threshold() -> f64 { 0.8 }
fn default_liquidity_threshold() -> f64 { 50.0 }
fn default_ttl_low_secs() -> i64 { 30 * 60 }
fn default_ttl_medium_secs() -> i64 { 60 * 60 }
fn default_ttl_high_secs() -> i64 { 4 * 60 * 60 }
fn default_ttl_critical_secs() -> i64 { 12 * 60 * 60 }
fn default_max_active() -> usize { 100 }

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            concentration_threshold: default_concentration_threshold(),
            volatility_threshold: default_volatility_threshold(),
            liquidity_threshold: default_liquidity_threshold(),
            ttl_low_secs: default_ttl_low_secs(),
            ttl_medium_secs: default_ttl_medium_secs(),
            ttl_high_secs: default_ttl_high_secs(),
            ttl_critical_secs: default_ttl_critical_secs(),
            max_active: default_max_active(),
        }
    }
}

impl AlertConfig {
    pub fn ttl(&self, severity: Severity) -> Duration {
        let secs = match severity {
            Severity::Low => self.ttl_low_secs,
            Severity::Medium => self.ttl_medium_secs,
            Severity::High => self.ttl_high_secs,
            Severity::Critical => self.ttl_critical_secs,
        };
        Duration::seconds(secs)
    }
}

struct Breach {
    key: String,
    category: RiskCategory,
    current: f64,
    threshold: f64,
    floor: Severity,
    message: String,
    recommendation: &'static str,
}

fn breach_key(metric: RiskMetric) -> String {
    format!("metric:{}", metric)
}

pub struct AlertBook {
    config: AlertConfig,
    active: VecDeque<RiskAlert>,
    /// Breaches that already produced an alert and have not cleared
    open_breaches: HashSet<String>,
}

impl AlertBook {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            active: VecDeque::new(),
            open_breaches: HashSet::new(),
        }
    }

    /// Breaches keyed by metric; a limit on a metric supersedes that
    /// metric's threshold alert, so one breach yields one alert
    fn breaches(&self, metrics: &RiskMetrics, limits: &[RiskLimit]) -> Vec<Breach> {
        let mut breaches: Vec<Breach> = Vec::new();

        for limit in limits.iter().filter(|l| l.breached()) {
            let key = breach_key(limit.metric());
            if breaches.iter().any(|b| b.key == key) {
                continue;
            }
            breaches.push(Breach {
                key,
                category: RiskCategory::Limit,
                current: limit.current(),
                threshold: limit.limit(),
                floor: match limit.kind() {
                    LimitKind::Hard => Severity::High,
                    LimitKind::Soft => Severity::Medium,
                },
                message: format!("{:?} limit {} breached: {:.4} > {:.4}", limit.kind(), limit.name(), limit.current(), limit.limit()),
                recommendation: "Bring the metric back under its limit before adding exposure",
            });
        }

        let thresholds = [
            (
                RiskMetric::Concentration,
                RiskCategory::Concentration,
                self.config.concentration_threshold,
                "Rebalance out of the largest positions",
            ),
            (
                RiskMetric::Volatility,
                RiskCategory::Volatility,
                self.config.volatility_threshold,
                "Shift weight toward lower-volatility assets",
            ),
            (
                RiskMetric::LiquidityScore,
                RiskCategory::Liquidity,
                self.config.liquidity_threshold,
                "Reduce exposure to thinly traded positions",
            ),
        ];
        for (metric, category, threshold, recommendation) in thresholds {
            let current = metric.read(metrics);
            let key = breach_key(metric);
            if current <= threshold || breaches.iter().any(|b| b.key == key) {
                continue;
            }
            breaches.push(Breach {
                key,
                category,
                current,
                threshold,
                floor: Severity::Medium,
                message: format!("Portfolio {} {:.3} above {:.3}", metric, current, threshold),
                recommendation,
            });
        }
        breaches
    }

    /// Raise alerts for new breach events, re-arm cleared ones
    pub fn evaluate(&mut self, metrics: &RiskMetrics, limits: &[RiskLimit], now: DateTime<Utc>) -> Vec<RiskAlert> {
        let breaches = self.breaches(metrics, limits);
        let current: HashSet<String> = breaches.iter().map(|b| b.key.clone()).collect();
        self.open_breaches.retain(|key| current.contains(key));

        let mut raised = Vec::new();
        for breach in breaches {
            if !self.open_breaches.insert(breach.key.clone()) {
                continue;
            }
            let ratio = if breach.threshold > 0.0 { breach.current / breach.threshold } else { f64::INFINITY };
            let severity = Severity::from_ratio(ratio).max(breach.floor);
            let alert = RiskAlert {
                id: Uuid::new_v4().to_string(),
                category: breach.category,
                severity,
                current: breach.current,
                threshold: breach.threshold,
                message: breach.message,
                recommendation: breach.recommendation.to_string(),
                created_at: now,
                expires_at: now + self.config.ttl(severity),
            };
            warn!(category = ?alert.category, severity = %alert.severity, "{}", alert.message);

            self.active.push_back(alert.clone());
            while self.active.len() > self.config.max_active {
                self.active.pop_front();
            }
            raised.push(alert);
        }
        raised
    }

    /// Drop expired alerts, returning them
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<RiskAlert> {
        let (expired, kept): (Vec<_>, Vec<_>) = self.active.drain(..).partition(|a| a.is_expired(now));
        self.active = kept.into();
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired risk alerts");
        }
        expired
    }

    pub fn active(&self) -> Vec<RiskAlert> {
        self.active.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::limits::LimitConfig;
    use crate::risk::types::RiskScores;

    fn metrics(concentration: f64, volatility: f64) -> RiskMetrics {
        RiskMetrics {
            portfolio_value: 1_000.0,
            position_count: 3,
            var_value: 10.0,
            var_pct: 0.01,
            sharpe: 1.0,
            max_drawdown: 0.05,
            volatility,
            concentration,
            correlation: 0.3,
            liquidity: 0.2,
            scores: RiskScores { liquidity: 20.0, ..Default::default() },
            composite: 30.0,
            estimator: "fixed".into(),
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn test_one_alert_per_breach_event() {
        let mut book = AlertBook::new(AlertConfig::default());
        let now = Utc::now();

        assert_eq!(book.evaluate(&metrics(0.5, 0.3), &[], now).len(), 1);
        assert!(book.evaluate(&metrics(0.55, 0.3), &[], now).is_empty());

        // Clears, then recurs
        assert!(book.evaluate(&metrics(0.3, 0.3), &[], now).is_empty());
        assert_eq!(book.evaluate(&metrics(0.5, 0.3), &[], now).len(), 1);
        assert_eq!(book.active().len(), 2);
    }

    #[test]
    fn test_severity_scales_with_breach_ratio() {
        let mut book = AlertBook::new(AlertConfig::default());
        let alerts = book.evaluate(&metrics(0.9, 1.0), &[], Utc::now());
        let concentration = alerts.iter().find(|a| a.category == RiskCategory::Concentration).unwrap();
        let volatility = alerts.iter().find(|a| a.category == RiskCategory::Volatility).unwrap();
        assert_eq!(concentration.severity, Severity::Critical);
        assert_eq!(volatility.severity, Severity::High);
    }

    #[test]
    fn test_hard_limit_breach_is_at_least_high() {
        let mut book = AlertBook::new(AlertConfig::default());
        let mut limit = RiskLimit::from(LimitConfig::new("var_95", LimitKind::Hard, RiskMetric::VarPct, 0.009));
        let m = metrics(0.2, 0.3);
        limit.observe(&m);

        let alerts = book.evaluate(&m, &[limit], Utc::now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].category, RiskCategory::Limit);
        assert_eq!(alerts[0].severity, Severity::High);
    }

    #[test]
    fn test_limit_and_threshold_on_same_metric_alert_once() {
        let mut book = AlertBook::new(AlertConfig::default());
        let mut limit = RiskLimit::from(LimitConfig::new("concentration", LimitKind::Soft, RiskMetric::Concentration, 0.40));
        let m = metrics(0.58, 0.3);
        limit.observe(&m);

        let alerts = book.evaluate(&m, &[limit.clone()], Utc::now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].category, RiskCategory::Limit);

        // Limit no longer configured: the threshold alert is the same breach
        assert!(book.evaluate(&m, &[], Utc::now()).is_empty());
    }

    #[test]
    fn test_sweep_expires_by_severity_ttl() {
        let mut book = AlertBook::new(AlertConfig::default());
        let now = Utc::now();
        // medium concentration alert, critical volatility alert
        book.evaluate(&metrics(0.45, 2.0), &[], now);
        assert_eq!(book.active().len(), 2);

        assert!(book.sweep(now + Duration::minutes(59)).is_empty());
        let expired = book.sweep(now + Duration::minutes(61));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].severity, Severity::Medium);

        assert_eq!(book.sweep(now + Duration::hours(13)).len(), 1);
        assert!(book.active().is_empty());
    }
}
