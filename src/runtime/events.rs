//! Publish-subscribe event bus
//!
//! Producers publish through [`EventPublisher`]; consumers (dashboards,
//! notifiers, the log sink) subscribe without knowing the channel type.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::execution::ExecutionReport;
use crate::pipeline::TradingDecision;
use crate::risk::{ProtectionAction, RiskAlert, RiskLimit, RiskMetrics};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemEvent {
    RiskSnapshot(RiskMetrics),
    RiskCycleFailed { reason: String, stale_cycles: u32 },
    AlertRaised(RiskAlert),
    AlertExpired(RiskAlert),
    LimitBreached(RiskLimit),
    ProtectionTriggered(ProtectionAction),
    Decision(TradingDecision),
    Execution(ExecutionReport),
}

impl SystemEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SystemEvent::RiskSnapshot(_) => "risk_snapshot",
            SystemEvent::RiskCycleFailed { .. } => "risk_cycle_failed",
            SystemEvent::AlertRaised(_) => "alert_raised",
            SystemEvent::AlertExpired(_) => "alert_expired",
            SystemEvent::LimitBreached(_) => "limit_breached",
            SystemEvent::ProtectionTriggered(_) => "protection_triggered",
            SystemEvent::Decision(_) => "decision",
            SystemEvent::Execution(_) => "execution",
        }
    }
}

pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: SystemEvent);
}

pub type SharedPublisher = Arc<dyn EventPublisher>;

/// Broadcast-backed bus; slow subscribers lose the oldest events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SystemEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription { receiver: self.sender.subscribe() }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: SystemEvent) {
        let name = event.name();
        // No subscribers is not an error
        if self.sender.send(event).is_err() {
            debug!(event = name, "Event published with no subscribers");
        }
    }
}

pub struct Subscription {
    receiver: broadcast::Receiver<SystemEvent>,
}

impl Subscription {
    /// Next event, or `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<SystemEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged, dropped oldest events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<SystemEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Drain everything queued right now
    pub fn drain(&mut self) -> Vec<SystemEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(SystemEvent::RiskCycleFailed { reason: "holdings".into(), stale_cycles: 1 });

        assert_eq!(first.recv().await.map(|e| e.name()), Some("risk_cycle_failed"));
        assert_eq!(second.drain().len(), 1);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(SystemEvent::RiskCycleFailed { reason: "none".into(), stale_cycles: 2 });
        // Late subscribers do not see earlier events
        assert!(bus.subscribe().drain().is_empty());
    }

    #[test]
    fn test_slow_subscriber_keeps_newest() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for n in 0..5 {
            bus.publish(SystemEvent::RiskCycleFailed { reason: n.to_string(), stale_cycles: n });
        }
        let events = sub.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], SystemEvent::RiskCycleFailed { stale_cycles: 4, .. }));
    }
}
