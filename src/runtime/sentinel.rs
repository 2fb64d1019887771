//! Component wiring
//!
//! Builds the registry, router, risk engine, pipeline and dispatcher from a
//! [`Config`] and registers their periodic jobs.

use chrono::Duration;
use std::sync::Arc;
use tracing::{info, warn};

use super::clock::SharedClock;
use super::events::EventBus;
use super::jobs::SentinelJob;
use super::scheduler::Scheduler;
use crate::config::Config;
use crate::error::Result;
use crate::execution::{ExecutionDispatcher, ExecutionReport};
use crate::market::{InMemoryHoldings, SimulatedMarketFeed};
use crate::pipeline::{DecisionPipeline, TradingDecision};
use crate::risk::{MonteCarloEstimator, RiskEngine, RiskMetrics};
use crate::routing::{Guardrail, RoleRouter, SharedFlags};
use crate::venue::AdapterRegistry;

/// What one sequential pass over every stage produced
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    pub risk: Option<RiskMetrics>,
    pub signals: usize,
    pub opportunities_added: usize,
    pub decisions: Vec<TradingDecision>,
    pub executions: Vec<ExecutionReport>,
    pub alerts_expired: usize,
}

pub struct Sentinel {
    pub config: Config,
    pub clock: SharedClock,
    pub bus: EventBus,
    pub flags: SharedFlags,
    pub registry: Arc<AdapterRegistry>,
    pub router: Arc<RoleRouter>,
    pub holdings: Arc<InMemoryHoldings>,
    pub risk: Arc<RiskEngine>,
    pub pipeline: Arc<DecisionPipeline>,
    pub dispatcher: Arc<ExecutionDispatcher>,
}

impl Sentinel {
    pub fn build(config: Config, clock: SharedClock) -> Result<Self> {
        let bus = EventBus::new(config.events.capacity);
        let flags = SharedFlags::new(config.guardrail);

        let registry = Arc::new(AdapterRegistry::new(config.simulation.clone()));
        let router = Arc::new(RoleRouter::new(&config.routing, Guardrail::new(flags.clone()), registry.clone())?);

        let holdings = Arc::new(InMemoryHoldings::new(
            config.portfolio.positions.clone(),
            config.portfolio.macro_stress,
            clock.clone(),
        ));
        let risk = Arc::new(RiskEngine::new(
            config.risk.clone(),
            Arc::new(MonteCarloEstimator::new(config.risk.seed)),
            holdings.clone(),
            clock.clone(),
            Arc::new(bus.clone()),
        ));

        let feed = Arc::new(SimulatedMarketFeed::new(
            config.simulation.base_prices.clone(),
            config.market.feed_step,
            config.market.seed,
            clock.clone(),
        ));
        let pipeline = Arc::new(DecisionPipeline::new(
            config.pipeline.clone(),
            config.market.symbols.clone(),
            config.market.timeframes.clone(),
            feed,
            risk.clone(),
            clock.clone(),
            Arc::new(bus.clone()),
        ));

        let dispatcher = Arc::new(ExecutionDispatcher::new(
            router.clone(),
            pipeline.clone(),
            config.execution.clone(),
            clock.clone(),
            Arc::new(bus.clone()),
        ));

        info!(
            symbols = config.market.symbols.len(),
            timeframes = config.market.timeframes.len(),
            requested_mode = %config.execution.requested_mode,
            kill_switch = config.guardrail.kill_switch,
            "Sentinel assembled"
        );

        Ok(Self {
            config,
            clock,
            bus,
            flags,
            registry,
            router,
            holdings,
            risk,
            pipeline,
            dispatcher,
        })
    }

    /// Scheduler with every periodic job registered
    pub fn scheduler(&self) -> Scheduler {
        let schedule = &self.config.schedule;
        let mut scheduler = Scheduler::new(self.clock.clone());
        let jobs = [
            (SentinelJob::RiskAssessment(self.risk.clone()), schedule.risk_assessment_secs),
            (SentinelJob::ProtectionCheck(self.risk.clone()), schedule.protection_secs),
            (SentinelJob::AlertSweep(self.risk.clone()), schedule.alert_sweep_secs),
            (SentinelJob::SignalRefresh(self.pipeline.clone()), schedule.signal_refresh_secs),
            (SentinelJob::OpportunityScan(self.pipeline.clone()), schedule.opportunity_scan_secs),
            (SentinelJob::DecisionPass(self.pipeline.clone()), schedule.decision_secs),
            (SentinelJob::Dispatch(self.dispatcher.clone()), schedule.dispatch_secs),
            (SentinelJob::Learning(self.pipeline.clone()), schedule.learning_secs),
        ];
        for (job, secs) in jobs {
            scheduler.add(Arc::new(job), Duration::seconds(secs));
        }
        scheduler
    }

    /// Run every stage once, in dependency order
    pub async fn run_cycle(&self) -> CycleSummary {
        let risk = match self.risk.assess().await {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!("Risk cycle failed: {}", e);
                None
            }
        };
        self.risk.evaluate_protections().await;

        let batch = self.pipeline.refresh_signals().await;
        let opportunities_added = self.pipeline.scan_opportunities().await;
        let decisions = self.pipeline.decide().await;
        let executions = self.dispatcher.dispatch_pending().await;
        let alerts_expired = self.risk.sweep_alerts().await;

        CycleSummary {
            risk,
            signals: batch.signals.len(),
            opportunities_added,
            decisions,
            executions,
            alerts_expired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::clock::{Clock, ManualClock};
    use crate::venue::TradingMode;
    use chrono::Utc;

    fn quick_config() -> Config {
        let mut config = Config::default();
        config.simulation.latency_min_ms = 0;
        config.simulation.latency_max_ms = 0;
        config.simulation.seed = Some(3);
        config.market.seed = Some(3);
        config.market.feed_step = 0.01;
        config.market.timeframes = vec!["1m".to_string()];
        config.risk.seed = Some(3);
        config.risk.metrics.var_trials = 500;
        config.risk.metrics.drawdown_steps = 20;
        config
    }

    #[tokio::test]
    async fn test_cycles_produce_a_risk_snapshot() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sentinel = Sentinel::build(quick_config(), clock.clone()).unwrap();
        let mut summary = CycleSummary::default();
        for _ in 0..30 {
            summary = sentinel.run_cycle().await;
            clock.advance(chrono::Duration::minutes(1));
        }
        let metrics = summary.risk.expect("default portfolio assesses");
        assert!((0.0..=100.0).contains(&metrics.composite));
        assert!(sentinel.risk.latest().await.is_some());
    }

    #[tokio::test]
    async fn test_live_request_without_flags_stays_simulated() {
        let mut config = quick_config();
        config.execution.requested_mode = TradingMode::Live;
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sentinel = Sentinel::build(config, clock.clone()).unwrap();

        for _ in 0..30 {
            for report in sentinel.run_cycle().await.executions {
                assert_eq!(report.mode, TradingMode::Simulated);
            }
            clock.advance(chrono::Duration::minutes(1));
        }
    }

    #[tokio::test]
    async fn test_scheduler_registers_every_job() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sentinel = Sentinel::build(quick_config(), clock.clone()).unwrap();
        let scheduler = sentinel.scheduler();

        let outcomes = scheduler.run_due().await;
        assert_eq!(outcomes.len(), 8);
        assert!(scheduler.status().iter().all(|s| s.next_due > clock.now()));
    }
}
