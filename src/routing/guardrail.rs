//! Mode guardrail
//!
//! Computes the most permissive trading mode the current flags allow. The
//! function is total: a missing affirmative flag downgrades to Simulated
//! instead of returning an error.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::venue::TradingMode;

/// Where an action moves funds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionScope {
    /// Exchange account, fiat rail or custody transfer
    Centralized,
    /// On-chain action from a self-custody wallet
    Decentralized,
}

/// Layered escalation flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GuardrailFlags {
    /// Forces Simulated everywhere
    #[serde(default)]
    pub kill_switch: bool,
    #[serde(default)]
    pub allow_live_exchange: bool,
    #[serde(default)]
    pub allow_defi_actions: bool,
}

impl GuardrailFlags {
    /// Every affirmative flag set, kill-switch off
    pub fn fully_armed() -> Self {
        Self {
            kill_switch: false,
            allow_live_exchange: true,
            allow_defi_actions: true,
        }
    }
}

/// Clamp a requested mode to what the flags allow
pub fn resolve_mode(requested: TradingMode, scope: ActionScope, flags: &GuardrailFlags) -> TradingMode {
    if flags.kill_switch {
        return TradingMode::Simulated;
    }

    let effective = match requested {
        TradingMode::Simulated => TradingMode::Simulated,
        TradingMode::Sandbox => TradingMode::Sandbox,
        TradingMode::Live => {
            let permitted = match scope {
                ActionScope::Centralized => flags.allow_live_exchange,
                ActionScope::Decentralized => flags.allow_live_exchange && flags.allow_defi_actions,
            };
            if permitted {
                TradingMode::Live
            } else {
                TradingMode::Simulated
            }
        }
    };

    if effective != requested {
        debug!(requested = %requested, effective = %effective, ?scope, "Guardrail downgraded mode");
    }
    effective
}

/// Runtime-mutable flag snapshot shared by every guardrail reader
#[derive(Debug, Clone, Default)]
pub struct SharedFlags {
    inner: Arc<RwLock<GuardrailFlags>>,
}

impl SharedFlags {
    pub fn new(flags: GuardrailFlags) -> Self {
        Self { inner: Arc::new(RwLock::new(flags)) }
    }

    /// Current flags; a poisoned lock reads as kill-switch engaged
    pub fn snapshot(&self) -> GuardrailFlags {
        match self.inner.read() {
            Ok(flags) => *flags,
            Err(_) => GuardrailFlags {
                kill_switch: true,
                ..GuardrailFlags::default()
            },
        }
    }

    pub fn replace(&self, flags: GuardrailFlags) {
        match self.inner.write() {
            Ok(mut guard) => *guard = flags,
            Err(poisoned) => *poisoned.into_inner() = flags,
        }
    }

    pub fn engage_kill_switch(&self) {
        warn!("Kill-switch engaged, all routes forced to simulated");
        let mut flags = self.snapshot();
        flags.kill_switch = true;
        self.replace(flags);
    }

    pub fn release_kill_switch(&self) {
        warn!("Kill-switch released");
        let mut flags = self.snapshot();
        flags.kill_switch = false;
        self.replace(flags);
    }
}

/// Guardrail bound to a shared flag snapshot, re-read on every call
#[derive(Debug, Clone, Default)]
pub struct Guardrail {
    flags: SharedFlags,
}

impl Guardrail {
    pub fn new(flags: SharedFlags) -> Self {
        Self { flags }
    }

    pub fn resolve(&self, requested: TradingMode, scope: ActionScope) -> TradingMode {
        resolve_mode(requested, scope, &self.flags.snapshot())
    }

    pub fn flags(&self) -> GuardrailFlags {
        self.flags.snapshot()
    }

    pub fn shared(&self) -> &SharedFlags {
        &self.flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODES: [TradingMode; 3] = [TradingMode::Simulated, TradingMode::Sandbox, TradingMode::Live];
    const SCOPES: [ActionScope; 2] = [ActionScope::Centralized, ActionScope::Decentralized];

    fn all_flag_combinations() -> Vec<GuardrailFlags> {
        let mut combos = Vec::new();
        for bits in 0..8u8 {
            combos.push(GuardrailFlags {
                kill_switch: bits & 1 != 0,
                allow_live_exchange: bits & 2 != 0,
                allow_defi_actions: bits & 4 != 0,
            });
        }
        combos
    }

    #[test]
    fn test_kill_switch_forces_simulated() {
        for flags in all_flag_combinations().into_iter().filter(|f| f.kill_switch) {
            for mode in MODES {
                for scope in SCOPES {
                    assert_eq!(resolve_mode(mode, scope, &flags), TradingMode::Simulated);
                }
            }
        }
    }

    #[test]
    fn test_never_exceeds_requested() {
        for flags in all_flag_combinations() {
            for mode in MODES {
                for scope in SCOPES {
                    assert!(resolve_mode(mode, scope, &flags) <= mode);
                }
            }
        }
    }

    #[test]
    fn test_live_spot_without_allow_is_simulated() {
        let flags = GuardrailFlags::default();
        assert_eq!(
            resolve_mode(TradingMode::Live, ActionScope::Centralized, &flags),
            TradingMode::Simulated
        );
    }

    #[test]
    fn test_defi_live_needs_all_three_conditions() {
        let armed = GuardrailFlags::fully_armed();
        assert_eq!(
            resolve_mode(TradingMode::Live, ActionScope::Decentralized, &armed),
            TradingMode::Live
        );

        let toggles = [
            GuardrailFlags { kill_switch: true, ..armed },
            GuardrailFlags { allow_live_exchange: false, ..armed },
            GuardrailFlags { allow_defi_actions: false, ..armed },
        ];
        for flags in toggles {
            assert_eq!(
                resolve_mode(TradingMode::Live, ActionScope::Decentralized, &flags),
                TradingMode::Simulated
            );
        }
    }

    #[test]
    fn test_centralized_live_ignores_defi_flag() {
        let flags = GuardrailFlags {
            allow_live_exchange: true,
            ..Default::default()
        };
        assert_eq!(
            resolve_mode(TradingMode::Live, ActionScope::Centralized, &flags),
            TradingMode::Live
        );
    }

    #[test]
    fn test_sandbox_allowed_unless_killed() {
        let flags = GuardrailFlags::default();
        assert_eq!(
            resolve_mode(TradingMode::Sandbox, ActionScope::Decentralized, &flags),
            TradingMode::Sandbox
        );
    }

    #[test]
    fn test_runtime_kill_switch_is_seen_immediately() {
        let shared = SharedFlags::new(GuardrailFlags::fully_armed());
        let guardrail = Guardrail::new(shared.clone());
        assert_eq!(guardrail.resolve(TradingMode::Live, ActionScope::Centralized), TradingMode::Live);

        shared.engage_kill_switch();
        assert_eq!(
            guardrail.resolve(TradingMode::Live, ActionScope::Centralized),
            TradingMode::Simulated
        );

        shared.release_kill_switch();
        assert_eq!(guardrail.resolve(TradingMode::Live, ActionScope::Centralized), TradingMode::Live);
    }
}
