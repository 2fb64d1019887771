//! Decision pipeline
//!
//! Market ticks become signals, strong signals become priced opportunities,
//! and opportunities are scored into execute / wait / reject decisions.
//! A learning pass adjusts scoring weights from realized outcomes.

pub mod decisions;
pub mod engine;
pub mod indicators;
pub mod learning;
pub mod opportunities;
pub mod signals;
pub mod types;

pub use decisions::{DecisionConfig, DecisionContext, DecisionLog, ScoringWeights};
pub use engine::{DecisionPipeline, PipelineConfig};
pub use learning::{LearningConfig, LearningReport};
pub use opportunities::{OpportunityBook, OpportunityConfig};
pub use signals::{SignalBatch, SignalConfig, SignalStage};
pub use types::{
    DecisionOutcome, ExecutionLeg, ExecutionPlan, ExecutionStatus, IndicatorValues, MarketSignal, SignalDirection,
    TradingDecision, TradingOpportunity, UrgencyClass,
};
