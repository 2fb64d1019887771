//! Routing
//!
//! The mode guardrail and the role router that consults it.

pub mod guardrail;
pub mod router;

pub use guardrail::{resolve_mode, ActionScope, Guardrail, GuardrailFlags, SharedFlags};
pub use router::{
    GuardrailStatus, IntentCategory, ResolvedRoute, RoleRouter, RoutingConfig, TradeIntent,
    UNROUTED_VENUE,
};
