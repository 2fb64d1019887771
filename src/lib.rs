//! Trade Sentinel Library
//!
//! Guarded trading orchestrator: a mode guardrail and role router in front of
//! venue adapters, a portfolio risk engine, and a signal-to-decision pipeline
//! whose decisions are dispatched through the router.

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod market;
pub mod pipeline;
pub mod risk;
pub mod routing;
pub mod runtime;
pub mod venue;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
