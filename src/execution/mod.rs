//! Order submission
//!
//! Turns Execute decisions into venue orders through the role router.

pub mod dispatcher;

pub use dispatcher::{ExecutionConfig, ExecutionDispatcher, ExecutionReport, ReconcileReport};
