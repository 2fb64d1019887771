//! Decision pipeline
//!
//! Signals -> opportunities -> decisions -> learning. Each stage is driven by
//! its own scheduled job and owns its own state; later stages only read from
//! earlier ones.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::decisions::{DecisionConfig, DecisionContext, DecisionLog, ScoringWeights};
use super::learning::{self, LearningConfig, LearningReport};
use super::opportunities::{OpportunityBook, OpportunityConfig};
use super::signals::{SignalBatch, SignalConfig, SignalStage};
use super::types::{
    DecisionOutcome, ExecutionStatus, MarketSignal, SignalDirection, TradingDecision, TradingOpportunity,
};
use crate::market::MarketDataSource;
use crate::risk::RiskGate;
use crate::runtime::clock::SharedClock;
use crate::runtime::events::{SharedPublisher, SystemEvent};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub signals: SignalConfig,
    #[serde(default)]
    pub opportunities: OpportunityConfig,
    #[serde(default)]
    pub decisions: DecisionConfig,
    #[serde(default)]
    pub learning: LearningConfig,
}

/// Net buy/sell balance of the current signals, -1 to 1
fn market_breadth(signals: &[MarketSignal]) -> f64 {
    if signals.is_empty() {
        return 0.0;
    }
    let net: f64 = signals
        .iter()
        .map(|s| match s.direction {
            SignalDirection::Buy => 1.0,
            SignalDirection::Sell => -1.0,
            SignalDirection::Hold => 0.0,
        })
        .sum();
    net / signals.len() as f64
}

pub struct DecisionPipeline {
    symbols: Vec<String>,
    timeframes: Vec<String>,
    source: Arc<dyn MarketDataSource>,
    risk: Arc<dyn RiskGate>,
    clock: SharedClock,
    events: SharedPublisher,
    learning_config: LearningConfig,
    signals: RwLock<SignalStage>,
    opportunities: RwLock<OpportunityBook>,
    decisions: RwLock<DecisionLog>,
    last_learning: RwLock<Option<LearningReport>>,
}

impl DecisionPipeline {
    pub fn new(
        config: PipelineConfig,
        symbols: Vec<String>,
        timeframes: Vec<String>,
        source: Arc<dyn MarketDataSource>,
        risk: Arc<dyn RiskGate>,
        clock: SharedClock,
        events: SharedPublisher,
    ) -> Self {
        Self {
            symbols,
            timeframes,
            source,
            risk,
            clock,
            events,
            learning_config: config.learning,
            signals: RwLock::new(SignalStage::new(config.signals)),
            opportunities: RwLock::new(OpportunityBook::new(config.opportunities)),
            decisions: RwLock::new(DecisionLog::new(config.decisions)),
            last_learning: RwLock::new(None),
        }
    }

    /// Pull fresh ticks and reclassify every symbol / timeframe
    pub async fn refresh_signals(&self) -> SignalBatch {
        let mut stage = self.signals.write().await;
        stage.refresh(self.source.as_ref(), &self.symbols, &self.timeframes).await
    }

    /// Promote current signals; returns how many new opportunities were added
    pub async fn scan_opportunities(&self) -> usize {
        let signals = self.signals.read().await.current();
        let decided = self.decisions.read().await.decided_ids().clone();
        let now = self.clock.now();

        let mut book = self.opportunities.write().await;
        let added = book.scan(&signals, now, &decided);
        if added > 0 {
            info!(added, ranked = book.len(), "Opportunities scanned");
        }
        added
    }

    /// Decide every ranked opportunity not yet decided
    pub async fn decide(&self) -> Vec<TradingDecision> {
        let composite = self.risk.composite_score().await;
        let entries_halted = self.risk.entries_halted().await;
        let breadth = market_breadth(&self.signals.read().await.current());
        let opportunities = self.opportunities.read().await.ranked().to_vec();

        let context = DecisionContext {
            composite,
            entries_halted,
            market_breadth: breadth,
            now: self.clock.now(),
        };

        // Held across the whole pass so two passes cannot decide the same id
        let made = self.decisions.write().await.decide_all(&opportunities, &context);
        for decision in &made {
            self.events.publish(SystemEvent::Decision(decision.clone()));
        }
        made
    }

    /// Grade recent executions and adjust weights for future decisions
    pub async fn learn(&self) -> LearningReport {
        let decisions = self.decisions.read().await.decisions();
        let last_prices = self.signals.read().await.last_prices();

        let report = {
            let mut log = self.decisions.write().await;
            let report = learning::learn(&decisions, &last_prices, log.weights(), &self.learning_config);
            log.set_weights(report.weights);
            report
        };

        if report.adjusted() {
            info!(
                samples = report.samples,
                win_rate = report.win_rate.unwrap_or_default(),
                quality = report.weights.quality,
                risk = report.weights.risk,
                alignment = report.weights.alignment,
                "Scoring weights adjusted"
            );
        }
        *self.last_learning.write().await = Some(report.clone());
        report
    }

    pub async fn pending_executions(&self) -> Vec<TradingDecision> {
        self.decisions.read().await.pending_executions()
    }

    pub async fn record_execution(&self, decision_id: &str, status: ExecutionStatus) -> bool {
        self.decisions.write().await.record_execution(decision_id, status)
    }

    pub async fn signals(&self) -> Vec<MarketSignal> {
        self.signals.read().await.current()
    }

    pub async fn opportunities(&self) -> Vec<TradingOpportunity> {
        self.opportunities.read().await.ranked().to_vec()
    }

    pub async fn decisions(&self) -> Vec<TradingDecision> {
        self.decisions.read().await.decisions()
    }

    pub async fn executed(&self) -> Vec<TradingDecision> {
        self.decisions()
            .await
            .into_iter()
            .filter(|d| d.outcome == DecisionOutcome::Execute)
            .collect()
    }

    pub async fn weights(&self) -> ScoringWeights {
        self.decisions.read().await.weights()
    }

    pub async fn last_learning(&self) -> Option<LearningReport> {
        self.last_learning.read().await.clone()
    }
}
