//! Decision stage
//!
//! Scores each undecided opportunity against portfolio risk and market
//! alignment, then executes, waits or rejects. Every opportunity id is
//! decided at most once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

use super::types::{
    DecisionOutcome, ExecutionLeg, ExecutionPlan, ExecutionStatus, TradingDecision, TradingOpportunity,
    UrgencyClass,
};
use crate::venue::{OrderType, Side, TimeInForce};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    #[serde(default = "default_execute_threshold")]
    pub execute_threshold: f64,
    #[serde(default = "default_wait_threshold")]
    pub wait_threshold: f64,
    /// Fraction of the portfolio put at risk per trade
    #[serde(default = "default_risk_fraction")]
    pub risk_fraction: f64,
    /// Cap on a single position's notional, as a portfolio fraction
    #[serde(default = "default_max_position_fraction")]
    pub max_position_fraction: f64,
    #[serde(default = "default_portfolio_value")]
    pub portfolio_value: f64,
    /// Composite risk score points deducted per point
    #[serde(default = "default_risk_penalty_factor")]
    pub risk_penalty_factor: f64,
    #[serde(default = "default_max_alignment_bonus")]
    pub max_alignment_bonus: f64,
    #[serde(default = "default_log_limit")]
    pub log_limit: usize,
    #[serde(default = "default_decided_id_limit")]
    pub decided_id_limit: usize,
}

fn default_execute_threshold() -> f64 { 70.0 }
fn default_wait_threshold() -> f64 { 50.0 }
fn default_risk_fraction() -> f64 { 0.02 }
fn default_max_position_fraction() -> f64 { 0.25 }
fn default_portfolio_value() -> f64 { 100_000.0 }
fn default_risk_penalty_factor() -> f64 { 0.3 }
fn default_max_alignment_bonus() -> f64 { 10.0 }
fn default_log_limit() -> usize { 500 }
fn default_decided_id_limit() -> usize { 5_000 }

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            execute_threshold: default_execute_threshold(),
            wait_threshold: default_wait_threshold(),
            risk_fraction: default_risk_fraction(),
            max_position_fraction: default_max_position_fraction(),
            portfolio_value: default_portfolio_value(),
            risk_penalty_factor: default_risk_penalty_factor(),
            max_alignment_bonus: default_max_alignment_bonus(),
            log_limit: default_log_limit(),
            decided_id_limit: default_decided_id_limit(),
        }
    }
}

/// Multipliers on each score component, adjusted by the learning stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub quality: f64,
    pub risk: f64,
    pub alignment: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self { quality: 1.0, risk: 1.0, alignment: 1.0 }
    }
}

impl ScoringWeights {
    pub fn clamped(self, min: f64, max: f64) -> Self {
        Self {
            quality: self.quality.clamp(min, max),
            risk: self.risk.clamp(min, max),
            alignment: self.alignment.clamp(min, max),
        }
    }
}

/// Inputs that come from outside the opportunity itself
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext {
    /// Latest composite risk score, `None` before the first valid snapshot
    pub composite: Option<f64>,
    pub entries_halted: bool,
    /// Net direction of current signals, -1 (all sell) to 1 (all buy)
    pub market_breadth: f64,
    pub now: DateTime<Utc>,
}

/// Probability, risk/reward and urgency folded into 0-100
pub fn quality_score(opportunity: &TradingOpportunity) -> f64 {
    opportunity.probability * 50.0
        + (opportunity.risk_reward / 3.0).min(1.0) * 30.0
        + opportunity.urgency * 20.0
}

/// Units to buy or sell so a stop-out loses at most the risk budget
pub fn position_size(opportunity: &TradingOpportunity, config: &DecisionConfig) -> f64 {
    let distance = opportunity.stop_distance();
    if distance <= 0.0 || opportunity.entry <= 0.0 {
        return 0.0;
    }
    let by_risk = config.portfolio_value * config.risk_fraction / distance;
    let by_cap = config.portfolio_value * config.max_position_fraction / opportunity.entry;
    by_risk.min(by_cap).max(0.0)
}

fn slipped(price: f64, side: Side, bps: f64) -> f64 {
    match side {
        Side::Buy => price * (1.0 + bps / 10_000.0),
        Side::Sell => price * (1.0 - bps / 10_000.0),
    }
}

/// Entry and exit legs shaped by urgency
pub fn execution_plan(opportunity: &TradingOpportunity, quantity: f64) -> ExecutionPlan {
    let (order_type, time_in_force, slippage_bps) = match opportunity.urgency_class {
        UrgencyClass::Immediate => (OrderType::Market, TimeInForce::Ioc, 50.0),
        UrgencyClass::High => (OrderType::Limit, TimeInForce::Ioc, 30.0),
        UrgencyClass::Normal => (OrderType::Limit, TimeInForce::Gtc, 15.0),
        UrgencyClass::Low => (OrderType::Limit, TimeInForce::Gtc, 10.0),
    };
    let side = opportunity.side;
    let exit = side.opposite();

    let entry = ExecutionLeg {
        side,
        order_type,
        quantity,
        price: match order_type {
            OrderType::Market => None,
            _ => Some(slipped(opportunity.entry, side, slippage_bps)),
        },
        stop_price: None,
        time_in_force,
    };
    let take_profit = ExecutionLeg {
        side: exit,
        order_type: OrderType::Limit,
        quantity,
        price: Some(opportunity.target),
        stop_price: None,
        time_in_force: TimeInForce::Gtc,
    };
    let stop_loss = ExecutionLeg {
        side: exit,
        order_type: OrderType::Stop,
        quantity,
        price: None,
        stop_price: Some(opportunity.stop),
        time_in_force: TimeInForce::Gtc,
    };

    ExecutionPlan {
        order_type,
        time_in_force,
        entry,
        take_profit,
        stop_loss,
        slippage_bps,
        urgency: opportunity.urgency_class,
    }
}

pub fn decision_id(opportunity_id: &str) -> String {
    format!("decision:{}", opportunity_id)
}

/// Score one opportunity
pub fn decide(
    opportunity: &TradingOpportunity,
    config: &DecisionConfig,
    weights: &ScoringWeights,
    context: &DecisionContext,
) -> TradingDecision {
    let mut reasoning = Vec::new();

    let quality = quality_score(opportunity);
    reasoning.push(format!(
        "quality {:.1} (probability {:.2}, risk/reward {:.2}, urgency {:.2})",
        quality, opportunity.probability, opportunity.risk_reward, opportunity.urgency
    ));

    let composite = match context.composite {
        Some(score) => score.clamp(0.0, 100.0),
        None => {
            reasoning.push("no risk snapshot yet, assuming maximum risk".to_string());
            100.0
        }
    };
    let risk_penalty = composite * config.risk_penalty_factor;
    reasoning.push(format!("risk penalty {:.1} from composite {:.1}", risk_penalty, composite));

    let direction = match opportunity.side {
        Side::Buy => 1.0,
        Side::Sell => -1.0,
    };
    let alignment = config.max_alignment_bonus * (context.market_breadth.clamp(-1.0, 1.0) * direction);
    reasoning.push(format!("market alignment {:+.1}", alignment));

    let score = weights.quality * quality - weights.risk * risk_penalty + weights.alignment * alignment;

    let mut outcome = if score >= config.execute_threshold {
        DecisionOutcome::Execute
    } else if score >= config.wait_threshold {
        DecisionOutcome::Wait
    } else {
        DecisionOutcome::Reject
    };
    if outcome == DecisionOutcome::Execute && context.entries_halted {
        reasoning.push("entries halted by protection measure".to_string());
        outcome = DecisionOutcome::Wait;
    }
    reasoning.push(format!("score {:.1} => {}", score, outcome));

    let (position_size, execution_plan, execution) = if outcome == DecisionOutcome::Execute {
        let size = position_size(opportunity, config);
        (size, Some(execution_plan(opportunity, size)), ExecutionStatus::Pending)
    } else {
        (0.0, None, ExecutionStatus::NotApplicable)
    };

    TradingDecision {
        id: decision_id(&opportunity.id),
        opportunity_id: opportunity.id.clone(),
        symbol: opportunity.symbol.clone(),
        timeframe: opportunity.timeframe.clone(),
        side: opportunity.side,
        outcome,
        score,
        quality,
        risk_penalty,
        alignment,
        reasoning,
        entry: opportunity.entry,
        target: opportunity.target,
        stop: opportunity.stop,
        position_size,
        execution_plan,
        execution,
        decided_at: context.now,
    }
}

/// Bounded decision log plus the set of decided opportunity ids
pub struct DecisionLog {
    config: DecisionConfig,
    weights: ScoringWeights,
    log: VecDeque<TradingDecision>,
    decided: HashSet<String>,
    decided_order: VecDeque<String>,
}

impl DecisionLog {
    pub fn new(config: DecisionConfig) -> Self {
        Self {
            config,
            weights: ScoringWeights::default(),
            log: VecDeque::new(),
            decided: HashSet::new(),
            decided_order: VecDeque::new(),
        }
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    pub fn set_weights(&mut self, weights: ScoringWeights) {
        self.weights = weights;
    }

    pub fn decided_ids(&self) -> &HashSet<String> {
        &self.decided
    }

    /// Decide every undecided, unexpired opportunity
    pub fn decide_all(&mut self, opportunities: &[TradingOpportunity], context: &DecisionContext) -> Vec<TradingDecision> {
        let mut made = Vec::new();
        for opportunity in opportunities {
            if opportunity.is_expired(context.now) || self.decided.contains(&opportunity.id) {
                continue;
            }
            let decision = decide(opportunity, &self.config, &self.weights, context);
            debug!(id = %decision.id, outcome = %decision.outcome, score = decision.score, "Decision");
            if decision.outcome == DecisionOutcome::Execute {
                info!(
                    symbol = %decision.symbol,
                    side = %decision.side,
                    size = decision.position_size,
                    score = decision.score,
                    "Execute decision"
                );
            }
            self.mark_decided(&opportunity.id);
            self.push(decision.clone());
            made.push(decision);
        }
        made
    }

    fn mark_decided(&mut self, opportunity_id: &str) {
        if self.decided.insert(opportunity_id.to_string()) {
            self.decided_order.push_back(opportunity_id.to_string());
        }
        while self.decided_order.len() > self.config.decided_id_limit {
            if let Some(oldest) = self.decided_order.pop_front() {
                self.decided.remove(&oldest);
            }
        }
    }

    fn push(&mut self, decision: TradingDecision) {
        self.log.push_back(decision);
        while self.log.len() > self.config.log_limit {
            self.log.pop_front();
        }
    }

    /// Execute decisions still waiting for submission, oldest first
    pub fn pending_executions(&self) -> Vec<TradingDecision> {
        self.log
            .iter()
            .filter(|d| d.outcome == DecisionOutcome::Execute && d.execution == ExecutionStatus::Pending)
            .cloned()
            .collect()
    }

    pub fn record_execution(&mut self, decision_id: &str, status: ExecutionStatus) -> bool {
        match self.log.iter_mut().find(|d| d.id == decision_id) {
            Some(decision) => {
                decision.execution = status;
                true
            }
            None => false,
        }
    }

    pub fn decisions(&self) -> Vec<TradingDecision> {
        self.log.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }
}
