//! Risk engine
//!
//! Runs assessment cycles over the holdings snapshot, keeps the latest valid
//! snapshot plus a bounded history, derives limit state, raises and expires
//! alerts, and evaluates protection measures. Each scheduled task writes its
//! own slice: assessment owns snapshots and limits, the sweep owns alert
//! expiry, protection evaluation owns measure state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::alerts::{AlertBook, AlertConfig};
use super::estimator::RiskEstimator;
use super::limits::{default_limits, LimitConfig, RiskLimit};
use super::metrics::{self, MetricsConfig};
use super::protection::{default_protections, ProtectionAction, ProtectionBook, ProtectionConfig, ProtectionStatus};
use super::types::{RiskAlert, RiskMetrics};
use crate::error::{Error, Result};
use crate::market::HoldingsSource;
use crate::runtime::clock::SharedClock;
use crate::runtime::events::{SharedPublisher, SystemEvent};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default = "default_limits")]
    pub limits: Vec<LimitConfig>,
    #[serde(default = "default_protections")]
    pub protections: Vec<ProtectionConfig>,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Seed for the Monte-Carlo estimator
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_history_limit() -> usize { 1_000 }

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            metrics: MetricsConfig::default(),
            alerts: AlertConfig::default(),
            limits: default_limits(),
            protections: default_protections(),
            history_limit: default_history_limit(),
            seed: None,
        }
    }
}

/// Read-only view of the engine consulted by the decision stage
#[async_trait]
pub trait RiskGate: Send + Sync {
    /// Composite of the latest valid snapshot, `None` before the first one
    async fn composite_score(&self) -> Option<f64>;

    /// True while a protection measure blocks new entries
    async fn entries_halted(&self) -> bool;
}

struct AssessmentState {
    latest: Option<RiskMetrics>,
    history: VecDeque<RiskMetrics>,
    limits: Vec<RiskLimit>,
    stale_cycles: u32,
    last_error: Option<String>,
}

pub struct RiskEngine {
    config: RiskConfig,
    estimator: Arc<dyn RiskEstimator>,
    holdings: Arc<dyn HoldingsSource>,
    clock: SharedClock,
    events: SharedPublisher,
    assessment: RwLock<AssessmentState>,
    alerts: RwLock<AlertBook>,
    protections: RwLock<ProtectionBook>,
}

impl RiskEngine {
    pub fn new(
        config: RiskConfig,
        estimator: Arc<dyn RiskEstimator>,
        holdings: Arc<dyn HoldingsSource>,
        clock: SharedClock,
        events: SharedPublisher,
    ) -> Self {
        let limits = config.limits.iter().cloned().map(RiskLimit::from).collect();
        let alerts = AlertBook::new(config.alerts.clone());
        let protections = ProtectionBook::new(config.protections.clone());

        Self {
            config,
            estimator,
            holdings,
            clock,
            events,
            assessment: RwLock::new(AssessmentState {
                latest: None,
                history: VecDeque::new(),
                limits,
                stale_cycles: 0,
                last_error: None,
            }),
            alerts: RwLock::new(alerts),
            protections: RwLock::new(protections),
        }
    }

    async fn compute(&self) -> Result<RiskMetrics> {
        let snapshot = self.holdings.snapshot().await?;
        let estimator = self.estimator.clone();
        let config = self.config.metrics.clone();
        let now = self.clock.now();

        // Monte-Carlo trials are CPU-bound
        tokio::task::spawn_blocking(move || metrics::compute(&snapshot, estimator.as_ref(), &config, now))
            .await
            .map_err(|e| Error::Internal(format!("risk computation panicked: {}", e)))?
    }

    /// Run one assessment cycle
    ///
    /// On failure the previous snapshot stays authoritative and the stale
    /// counter grows; there is no automatic recovery beyond the next cycle.
    pub async fn assess(&self) -> Result<RiskMetrics> {
        let metrics = match self.compute().await {
            Ok(metrics) => metrics,
            Err(e) => {
                let stale_cycles = {
                    let mut state = self.assessment.write().await;
                    state.stale_cycles += 1;
                    state.last_error = Some(e.to_string());
                    state.stale_cycles
                };
                warn!(stale_cycles, "Risk assessment failed, keeping previous snapshot: {}", e);
                self.events.publish(SystemEvent::RiskCycleFailed {
                    reason: e.to_string(),
                    stale_cycles,
                });
                return Err(e);
            }
        };

        let (limits, newly_breached) = {
            let mut state = self.assessment.write().await;
            state.latest = Some(metrics.clone());
            state.history.push_back(metrics.clone());
            while state.history.len() > self.config.history_limit {
                state.history.pop_front();
            }
            state.stale_cycles = 0;
            state.last_error = None;

            let mut newly_breached = Vec::new();
            for limit in state.limits.iter_mut() {
                let was_breached = limit.breached();
                limit.observe(&metrics);
                if limit.breached() && !was_breached {
                    newly_breached.push(limit.clone());
                }
            }
            (state.limits.clone(), newly_breached)
        };

        let raised = self.alerts.write().await.evaluate(&metrics, &limits, metrics.computed_at);

        info!(
            composite = metrics.composite,
            var_pct = metrics.var_pct,
            sharpe = metrics.sharpe,
            max_drawdown = metrics.max_drawdown,
            positions = metrics.position_count,
            "Risk assessment complete"
        );

        self.events.publish(SystemEvent::RiskSnapshot(metrics.clone()));
        for limit in newly_breached {
            self.events.publish(SystemEvent::LimitBreached(limit));
        }
        for alert in raised {
            self.events.publish(SystemEvent::AlertRaised(alert));
        }

        Ok(metrics)
    }

    /// Expire alerts past their TTL
    pub async fn sweep_alerts(&self) -> usize {
        let expired = self.alerts.write().await.sweep(self.clock.now());
        let count = expired.len();
        for alert in expired {
            self.events.publish(SystemEvent::AlertExpired(alert));
        }
        count
    }

    /// Evaluate protection measures against the latest snapshot
    pub async fn evaluate_protections(&self) -> Vec<ProtectionAction> {
        let Some(latest) = self.latest().await else {
            debug!("No risk snapshot yet, skipping protection evaluation");
            return Vec::new();
        };
        let actions = self.protections.write().await.evaluate(&latest, self.clock.now());
        for action in &actions {
            self.events.publish(SystemEvent::ProtectionTriggered(action.clone()));
        }
        actions
    }

    pub async fn latest(&self) -> Option<RiskMetrics> {
        self.assessment.read().await.latest.clone()
    }

    pub async fn history(&self) -> Vec<RiskMetrics> {
        self.assessment.read().await.history.iter().cloned().collect()
    }

    pub async fn limits(&self) -> Vec<RiskLimit> {
        self.assessment.read().await.limits.clone()
    }

    /// Consecutive failed cycles since the last valid snapshot
    pub async fn stale_cycles(&self) -> u32 {
        self.assessment.read().await.stale_cycles
    }

    pub async fn last_error(&self) -> Option<String> {
        self.assessment.read().await.last_error.clone()
    }

    pub async fn active_alerts(&self) -> Vec<RiskAlert> {
        self.alerts.read().await.active()
    }

    pub async fn protection_status(&self) -> Vec<ProtectionStatus> {
        self.protections.read().await.status(self.clock.now())
    }
}

#[async_trait]
impl RiskGate for RiskEngine {
    async fn composite_score(&self) -> Option<f64> {
        self.assessment.read().await.latest.as_ref().map(|m| m.composite)
    }

    async fn entries_halted(&self) -> bool {
        self.protections.read().await.entries_halted(self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{InMemoryHoldings, PositionHolding};
    use crate::risk::estimator::tests::FixedEstimator;
    use crate::risk::protection::ProtectionKind;
    use crate::risk::types::RiskCategory;
    use crate::runtime::clock::ManualClock;
    use crate::runtime::events::EventBus;
    use chrono::{Duration, Utc};

    struct Harness {
        engine: RiskEngine,
        holdings: Arc<InMemoryHoldings>,
        clock: Arc<ManualClock>,
        bus: EventBus,
    }

    fn positions() -> Vec<PositionHolding> {
        vec![
            PositionHolding::new("BTC/USDT", 5_000.0, "binance"),
            PositionHolding::new("ETH/USDT", 3_000.0, "binance"),
            PositionHolding::new("SOL/USDT", 2_000.0, "kraken"),
        ]
    }

    fn harness(estimator: FixedEstimator, history_limit: usize) -> Harness {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let holdings = Arc::new(InMemoryHoldings::new(positions(), 0.2, clock.clone()));
        let bus = EventBus::new(64);
        let config = RiskConfig {
            metrics: MetricsConfig { var_trials: 100, drawdown_steps: 10, ..Default::default() },
            history_limit,
            ..Default::default()
        };
        let engine = RiskEngine::new(
            config,
            Arc::new(estimator),
            holdings.clone(),
            clock.clone(),
            Arc::new(bus.clone()),
        );
        Harness { engine, holdings, clock, bus }
    }

    #[tokio::test]
    async fn test_assessment_appends_bounded_history() {
        let h = harness(FixedEstimator::calm(), 3);
        assert!(h.engine.composite_score().await.is_none());

        for _ in 0..5 {
            let metrics = h.engine.assess().await.unwrap();
            assert!((0.0..=100.0).contains(&metrics.composite));
        }
        assert_eq!(h.engine.history().await.len(), 3);
        assert!(h.engine.composite_score().await.is_some());
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_previous_snapshot() {
        let h = harness(FixedEstimator::calm(), 10);
        let first = h.engine.assess().await.unwrap();

        h.holdings.replace(Vec::new()).await;
        assert!(h.engine.assess().await.is_err());
        assert!(h.engine.assess().await.is_err());
        assert_eq!(h.engine.latest().await, Some(first));
        assert_eq!(h.engine.stale_cycles().await, 2);
        assert!(h.engine.last_error().await.is_some());

        h.holdings.replace(positions()).await;
        h.engine.assess().await.unwrap();
        assert_eq!(h.engine.stale_cycles().await, 0);
    }

    #[tokio::test]
    async fn test_limit_breach_raises_single_alert() {
        let h = harness(FixedEstimator { draw: -0.06, ..FixedEstimator::calm() }, 10);
        let mut events = h.bus.subscribe();

        h.engine.assess().await.unwrap();
        let limits = h.engine.limits().await;
        for limit in &limits {
            assert_eq!(limit.breached(), limit.current() > limit.limit());
        }
        let var = limits.iter().find(|l| l.name() == "var_95").unwrap();
        assert!(var.breached());

        let first: Vec<_> = events.drain().into_iter().map(|e| e.name()).collect();
        assert!(first.contains(&"limit_breached"));
        assert!(first.contains(&"alert_raised"));

        h.engine.assess().await.unwrap();
        let second: Vec<_> = events.drain().into_iter().map(|e| e.name()).collect();
        assert!(!second.contains(&"limit_breached"));
        assert!(!second.contains(&"alert_raised"));
    }

    #[tokio::test]
    async fn test_concentration_breach_raises_one_alert() {
        let h = harness(FixedEstimator::calm(), 10);
        h.holdings
            .replace(vec![
                PositionHolding::new("BTC/USDT", 7_000.0, "binance"),
                PositionHolding::new("ETH/USDT", 3_000.0, "binance"),
            ])
            .await;
        let mut events = h.bus.subscribe();

        let metrics = h.engine.assess().await.unwrap();
        h.engine.sweep_alerts().await;
        assert!((metrics.concentration - 0.58).abs() < 1e-9);

        let raised: Vec<RiskAlert> = events
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                SystemEvent::AlertRaised(alert) => Some(alert),
                _ => None,
            })
            .collect();
        let concentration = raised
            .iter()
            .filter(|a| a.category == RiskCategory::Concentration || a.message.contains("concentration"))
            .count();
        assert_eq!(concentration, 1);
    }

    #[tokio::test]
    async fn test_alert_sweep_uses_clock() {
        let h = harness(FixedEstimator { draw: -0.06, ..FixedEstimator::calm() }, 10);
        h.engine.assess().await.unwrap();
        let active = h.engine.active_alerts().await.len();
        assert!(active > 0);

        assert_eq!(h.engine.sweep_alerts().await, 0);
        h.clock.advance(Duration::hours(13));
        assert_eq!(h.engine.sweep_alerts().await, active);
        assert!(h.engine.active_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn test_drawdown_protection_halts_entries() {
        let h = harness(FixedEstimator { draw: -0.05, ..FixedEstimator::calm() }, 10);
        assert!(h.engine.evaluate_protections().await.is_empty());

        h.engine.assess().await.unwrap();
        let actions = h.engine.evaluate_protections().await;
        assert!(actions.iter().any(|a| a.kind == ProtectionKind::HaltNewEntries));
        assert!(h.engine.entries_halted().await);

        // Cooldown gates a repeat trigger
        assert!(h.engine.evaluate_protections().await.is_empty());
        h.clock.advance(Duration::hours(2));
        assert!(!h.engine.entries_halted().await);
    }
}
