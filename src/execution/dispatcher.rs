//! Execution dispatcher
//!
//! Hands Execute decisions to a venue. The router picks the venue and the
//! authoritative mode; the dispatcher never asks an adapter for more than
//! the route granted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::pipeline::{DecisionPipeline, ExecutionStatus, TradingDecision, UrgencyClass};
use crate::routing::{IntentCategory, RoleRouter, TradeIntent};
use crate::runtime::clock::SharedClock;
use crate::runtime::events::{SharedPublisher, SystemEvent};
use crate::venue::{tag_venue, with_retry, Order, RetryPolicy, TradingMode, VenueId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Highest mode the dispatcher asks for; the guardrail may clamp it
    #[serde(default)]
    pub requested_mode: TradingMode,
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub decision_id: String,
    pub symbol: String,
    pub venue: VenueId,
    pub mode: TradingMode,
    pub status: ExecutionStatus,
    pub at: DateTime<Utc>,
}

impl ExecutionReport {
    pub fn is_submitted(&self) -> bool {
        matches!(self.status, ExecutionStatus::Submitted { .. })
    }
}

/// Open orders gathered from every known adapter
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub orders: Vec<Order>,
    pub failures: Vec<(VenueId, String)>,
}

/// Time-critical entries go to the sniper venue
fn intent_for(urgency: UrgencyClass) -> IntentCategory {
    match urgency {
        UrgencyClass::Immediate => IntentCategory::Sniper,
        _ => IntentCategory::Spot,
    }
}

pub struct ExecutionDispatcher {
    router: Arc<RoleRouter>,
    pipeline: Arc<DecisionPipeline>,
    config: ExecutionConfig,
    clock: SharedClock,
    events: SharedPublisher,
}

impl ExecutionDispatcher {
    pub fn new(
        router: Arc<RoleRouter>,
        pipeline: Arc<DecisionPipeline>,
        config: ExecutionConfig,
        clock: SharedClock,
        events: SharedPublisher,
    ) -> Self {
        Self { router, pipeline, config, clock, events }
    }

    /// Submit every pending Execute decision and record the outcome on it
    pub async fn dispatch_pending(&self) -> Vec<ExecutionReport> {
        let pending = self.pipeline.pending_executions().await;
        let mut reports = Vec::with_capacity(pending.len());

        for decision in pending {
            let report = self.submit(&decision).await;
            if !self.pipeline.record_execution(&decision.id, report.status.clone()).await {
                warn!(decision = %decision.id, "Decision left the log before its execution was recorded");
            }
            self.events.publish(SystemEvent::Execution(report.clone()));
            reports.push(report);
        }
        reports
    }

    /// Route and submit the entry leg of one decision
    pub async fn submit(&self, decision: &TradingDecision) -> ExecutionReport {
        let Some(plan) = &decision.execution_plan else {
            return self.report(decision, VenueId::new("none"), TradingMode::Simulated, failed("decision has no execution plan"));
        };

        let intent = TradeIntent::new(intent_for(plan.urgency));
        let route = self.router.resolve(&intent, self.config.requested_mode);
        if let Some(reason) = &route.degraded {
            return self.report(decision, route.venue.clone(), route.mode, failed(format!("no route: {}", reason)));
        }
        if decision.position_size <= 0.0 {
            return self.report(decision, route.venue.clone(), route.mode, failed("position size is zero"));
        }

        let request = plan.entry.to_request(&decision.symbol, &decision.id);
        let adapter = route.adapter.clone();
        let result = with_retry(&self.config.retry, "submit_order", || {
            let adapter = adapter.clone();
            let request = request.clone();
            async move { adapter.submit_order(request).await }
        })
        .await;

        let status = match result {
            Ok(ack) => {
                info!(
                    decision = %decision.id,
                    venue = %route.venue,
                    mode = %route.mode,
                    order_id = %ack.order_id,
                    order_status = ?ack.status,
                    "Entry submitted"
                );
                ExecutionStatus::Submitted {
                    venue: route.venue.clone(),
                    order_id: ack.order_id,
                    mode: route.mode,
                }
            }
            Err(e) => {
                let e = tag_venue(&route.venue, e);
                warn!(decision = %decision.id, venue = %route.venue, "Entry submission failed: {}", e);
                failed(e.to_string())
            }
        };
        self.report(decision, route.venue.clone(), route.mode, status)
    }

    /// Re-fetch open orders from every adapter, e.g. after a restart
    pub async fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for adapter in self.router.registry().all_adapters() {
            match adapter.open_orders(None).await {
                Ok(orders) => report.orders.extend(orders),
                Err(e) => {
                    warn!(venue = %adapter.venue(), "Open-order reconciliation failed: {}", e);
                    report.failures.push((adapter.venue().clone(), e.to_string()));
                }
            }
        }
        info!(open_orders = report.orders.len(), failures = report.failures.len(), "Reconciled open orders");
        report
    }

    fn report(&self, decision: &TradingDecision, venue: VenueId, mode: TradingMode, status: ExecutionStatus) -> ExecutionReport {
        ExecutionReport {
            decision_id: decision.id.clone(),
            symbol: decision.symbol.clone(),
            venue,
            mode,
            status,
            at: self.clock.now(),
        }
    }
}

fn failed(reason: impl Into<String>) -> ExecutionStatus {
    ExecutionStatus::Failed { reason: reason.into() }
}
