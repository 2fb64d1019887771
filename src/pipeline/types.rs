//! Decision pipeline types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::venue::{OrderRequest, OrderType, Side, TimeInForce, TradingMode, VenueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalDirection {
    Buy,
    Sell,
    Hold,
}

impl SignalDirection {
    pub fn side(&self) -> Option<Side> {
        match self {
            SignalDirection::Buy => Some(Side::Buy),
            SignalDirection::Sell => Some(Side::Sell),
            SignalDirection::Hold => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValues {
    pub sma_fast: f64,
    pub sma_slow: f64,
    pub rsi: f64,
    /// Percent change over the momentum period
    pub momentum: f64,
    /// Latest volume over the average
    pub volume_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSignal {
    pub symbol: String,
    pub timeframe: String,
    pub direction: SignalDirection,
    /// 0-100
    pub strength: f64,
    /// 0-1
    pub confidence: f64,
    pub price: f64,
    pub indicators: IndicatorValues,
    pub tick_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyClass {
    Low,
    Normal,
    High,
    Immediate,
}

impl UrgencyClass {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            UrgencyClass::Immediate
        } else if score >= 0.6 {
            UrgencyClass::High
        } else if score >= 0.4 {
            UrgencyClass::Normal
        } else {
            UrgencyClass::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingOpportunity {
    /// Deterministic: `symbol:timeframe:side:tick-millis`
    pub id: String,
    pub symbol: String,
    pub timeframe: String,
    pub side: Side,
    pub entry: f64,
    pub target: f64,
    pub stop: f64,
    pub risk_reward: f64,
    pub probability: f64,
    /// 0-1
    pub urgency: f64,
    pub urgency_class: UrgencyClass,
    pub signal_strength: f64,
    pub signal_confidence: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TradingOpportunity {
    pub fn id_for(symbol: &str, timeframe: &str, side: Side, tick_time: DateTime<Utc>) -> String {
        format!("{}:{}:{}:{}", symbol, timeframe, side, tick_time.timestamp_millis())
    }

    pub fn rank_score(&self) -> f64 {
        self.probability * self.risk_reward * self.urgency
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Per-unit loss if the stop is hit
    pub fn stop_distance(&self) -> f64 {
        (self.entry - self.stop).abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Execute,
    Wait,
    Reject,
}

impl fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionOutcome::Execute => write!(f, "execute"),
            DecisionOutcome::Wait => write!(f, "wait"),
            DecisionOutcome::Reject => write!(f, "reject"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLeg {
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    pub time_in_force: TimeInForce,
}

impl ExecutionLeg {
    pub fn to_request(&self, symbol: &str, client_id: &str) -> OrderRequest {
        OrderRequest {
            symbol: symbol.to_string(),
            side: self.side,
            order_type: self.order_type,
            quantity: self.quantity,
            price: self.price,
            stop_price: self.stop_price,
            time_in_force: self.time_in_force,
            chain: None,
            client_id: Some(client_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub entry: ExecutionLeg,
    pub take_profit: ExecutionLeg,
    pub stop_loss: ExecutionLeg,
    pub slippage_bps: f64,
    pub urgency: UrgencyClass,
}

/// Outcome of handing a decision to the order-submission collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Nothing to execute (Wait / Reject)
    NotApplicable,
    Pending,
    Submitted {
        venue: VenueId,
        order_id: String,
        mode: TradingMode,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingDecision {
    pub id: String,
    pub opportunity_id: String,
    pub symbol: String,
    pub timeframe: String,
    pub side: Side,
    pub outcome: DecisionOutcome,
    pub score: f64,
    pub quality: f64,
    pub risk_penalty: f64,
    pub alignment: f64,
    pub reasoning: Vec<String>,
    pub entry: f64,
    pub target: f64,
    pub stop: f64,
    pub position_size: f64,
    pub execution_plan: Option<ExecutionPlan>,
    pub execution: ExecutionStatus,
    pub decided_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urgency_classes() {
        assert_eq!(UrgencyClass::from_score(0.95), UrgencyClass::Immediate);
        assert_eq!(UrgencyClass::from_score(0.6), UrgencyClass::High);
        assert_eq!(UrgencyClass::from_score(0.45), UrgencyClass::Normal);
        assert_eq!(UrgencyClass::from_score(0.1), UrgencyClass::Low);
    }

    #[test]
    fn test_opportunity_id_is_deterministic() {
        let at = Utc::now();
        assert_eq!(
            TradingOpportunity::id_for("BTC/USDT", "5m", Side::Buy, at),
            TradingOpportunity::id_for("BTC/USDT", "5m", Side::Buy, at)
        );
        assert_ne!(
            TradingOpportunity::id_for("BTC/USDT", "5m", Side::Buy, at),
            TradingOpportunity::id_for("BTC/USDT", "5m", Side::Sell, at)
        );
    }
}
