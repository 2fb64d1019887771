//! Periodic jobs driving the pipeline, execution and risk engine
//!
//! Each job is the only writer of its own slice of state.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::scheduler::Job;
use crate::error::Result;
use crate::execution::ExecutionDispatcher;
use crate::pipeline::DecisionPipeline;
use crate::risk::RiskEngine;

pub enum SentinelJob {
    SignalRefresh(Arc<DecisionPipeline>),
    OpportunityScan(Arc<DecisionPipeline>),
    DecisionPass(Arc<DecisionPipeline>),
    Dispatch(Arc<ExecutionDispatcher>),
    RiskAssessment(Arc<RiskEngine>),
    AlertSweep(Arc<RiskEngine>),
    ProtectionCheck(Arc<RiskEngine>),
    Learning(Arc<DecisionPipeline>),
}

#[async_trait]
impl Job for SentinelJob {
    fn name(&self) -> &str {
        match self {
            SentinelJob::SignalRefresh(_) => "signal_refresh",
            SentinelJob::OpportunityScan(_) => "opportunity_scan",
            SentinelJob::DecisionPass(_) => "decision_pass",
            SentinelJob::Dispatch(_) => "execution_dispatch",
            SentinelJob::RiskAssessment(_) => "risk_assessment",
            SentinelJob::AlertSweep(_) => "alert_sweep",
            SentinelJob::ProtectionCheck(_) => "protection_check",
            SentinelJob::Learning(_) => "learning",
        }
    }

    async fn run(&self) -> Result<()> {
        match self {
            SentinelJob::SignalRefresh(pipeline) => {
                let batch = pipeline.refresh_signals().await;
                debug!(signals = batch.signals.len(), failures = batch.failures.len(), "Signals refreshed");
            }
            SentinelJob::OpportunityScan(pipeline) => {
                pipeline.scan_opportunities().await;
            }
            SentinelJob::DecisionPass(pipeline) => {
                let made = pipeline.decide().await;
                debug!(decisions = made.len(), "Decision pass complete");
            }
            SentinelJob::Dispatch(dispatcher) => {
                let reports = dispatcher.dispatch_pending().await;
                if !reports.is_empty() {
                    let submitted = reports.iter().filter(|r| r.is_submitted()).count();
                    info!(submitted, failed = reports.len() - submitted, "Dispatched executions");
                }
            }
            // A failed cycle keeps the previous snapshot; surface it to the scheduler
            SentinelJob::RiskAssessment(engine) => {
                engine.assess().await?;
            }
            SentinelJob::AlertSweep(engine) => {
                engine.sweep_alerts().await;
            }
            SentinelJob::ProtectionCheck(engine) => {
                engine.evaluate_protections().await;
            }
            SentinelJob::Learning(pipeline) => {
                pipeline.learn().await;
            }
        }
        Ok(())
    }
}
