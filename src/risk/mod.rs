//! Portfolio risk engine
//!
//! Metrics over a holdings snapshot, limits, alerts and protection measures.
//! Sampling goes through a pluggable estimator.

pub mod alerts;
pub mod engine;
pub mod estimator;
pub mod limits;
pub mod metrics;
pub mod protection;
pub mod types;

pub use alerts::{AlertBook, AlertConfig};
pub use engine::{RiskConfig, RiskEngine, RiskGate};
pub use estimator::{MonteCarloEstimator, RiskEstimator};
pub use limits::{LimitConfig, LimitKind, RiskLimit};
pub use metrics::{CompositeWeights, MetricsConfig};
pub use protection::{
    ProtectionAction, ProtectionConfig, ProtectionKind, ProtectionMeasure, ProtectionState,
    ProtectionStatus,
};
pub use types::{RiskAlert, RiskCategory, RiskMetric, RiskMetrics, RiskScores, Severity};
