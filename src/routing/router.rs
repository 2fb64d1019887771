//! Role router
//!
//! Maps a trade intent to a venue, an adapter handle and a clamped mode.
//! Routes are recomputed per request from the current flags and registry.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use super::guardrail::{ActionScope, Guardrail, GuardrailFlags};
use crate::error::{Error, Result};
use crate::venue::{AdapterRegistry, Chain, ChainFamily, TradingMode, VenueAdapter, VenueId};

/// Venue id used when no route can be configured
pub const UNROUTED_VENUE: &str = "unrouted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    Spot,
    /// Time-sensitive entries routed for execution speed
    Sniper,
    FiatRail,
    Custody,
    Defi,
}

impl IntentCategory {
    pub const CENTRALIZED: [IntentCategory; 4] = [
        IntentCategory::Spot,
        IntentCategory::Sniper,
        IntentCategory::FiatRail,
        IntentCategory::Custody,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentCategory::Spot => "spot",
            IntentCategory::Sniper => "sniper",
            IntentCategory::FiatRail => "fiat_rail",
            IntentCategory::Custody => "custody",
            IntentCategory::Defi => "defi",
        }
    }

    pub fn scope(&self) -> ActionScope {
        match self {
            IntentCategory::Defi => ActionScope::Decentralized,
            _ => ActionScope::Centralized,
        }
    }

    fn default_venue(&self) -> Option<&'static str> {
        match self {
            IntentCategory::Spot => Some("binance"),
            IntentCategory::Sniper => Some("bybit"),
            IntentCategory::FiatRail => Some("coinbase"),
            IntentCategory::Custody => Some("cold-storage"),
            IntentCategory::Defi => None,
        }
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentCategory {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "spot" => Ok(IntentCategory::Spot),
            "sniper" | "speed" => Ok(IntentCategory::Sniper),
            "fiat" | "fiat_rail" => Ok(IntentCategory::FiatRail),
            "custody" | "cold" => Ok(IntentCategory::Custody),
            "defi" => Ok(IntentCategory::Defi),
            other => Err(Error::Configuration(format!("unknown intent category: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub category: IntentCategory,
    pub chain: Option<Chain>,
}

impl TradeIntent {
    pub fn new(category: IntentCategory) -> Self {
        Self { category, chain: None }
    }

    pub fn defi(chain: Chain) -> Self {
        Self { category: IntentCategory::Defi, chain: Some(chain) }
    }
}

/// Venue, handle and authoritative mode for one request
#[derive(Clone)]
pub struct ResolvedRoute {
    pub venue: VenueId,
    pub adapter: Arc<dyn VenueAdapter>,
    pub mode: TradingMode,
    /// Set when the route failed closed
    pub degraded: Option<String>,
}

impl fmt::Debug for ResolvedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedRoute")
            .field("venue", &self.venue)
            .field("adapter", &self.adapter.venue())
            .field("mode", &self.mode)
            .field("degraded", &self.degraded)
            .finish()
    }
}

/// Per-category venue overrides and per-family wallet rails
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Category name to venue id
    #[serde(default)]
    pub venue_overrides: HashMap<String, String>,
    /// Chain family name to wallet venue id
    #[serde(default)]
    pub wallet_rails: HashMap<String, String>,
}

/// Read-only operational view of routing
#[derive(Debug, Clone, Serialize)]
pub struct GuardrailStatus {
    pub flags: GuardrailFlags,
    pub default_venues: BTreeMap<IntentCategory, VenueId>,
    pub wallet_rails: BTreeMap<ChainFamily, VenueId>,
    pub registered_venues: Vec<(VenueId, TradingMode)>,
}

pub struct RoleRouter {
    guardrail: Guardrail,
    registry: Arc<AdapterRegistry>,
    venues: BTreeMap<IntentCategory, VenueId>,
    rails: BTreeMap<ChainFamily, VenueId>,
}

impl RoleRouter {
    pub fn new(config: &RoutingConfig, guardrail: Guardrail, registry: Arc<AdapterRegistry>) -> Result<Self> {
        let mut venues: BTreeMap<IntentCategory, VenueId> = IntentCategory::CENTRALIZED
            .iter()
            .filter_map(|c| c.default_venue().map(|v| (*c, VenueId::new(v))))
            .collect();
        for (name, venue) in &config.venue_overrides {
            let category: IntentCategory = name.parse()?;
            if category == IntentCategory::Defi {
                return Err(Error::Configuration(
                    "defi intents are routed by wallet_rails, not venue_overrides".into(),
                ));
            }
            venues.insert(category, VenueId::new(venue.as_str()));
        }

        let mut rails: BTreeMap<ChainFamily, VenueId> = ChainFamily::ALL
            .iter()
            .map(|f| (*f, VenueId::new(format!("{}-wallet", f))))
            .collect();
        for (name, venue) in &config.wallet_rails {
            let family: ChainFamily = name.parse()?;
            rails.insert(family, VenueId::new(venue.as_str()));
        }

        Ok(Self { guardrail, registry, venues, rails })
    }

    pub fn guardrail(&self) -> &Guardrail {
        &self.guardrail
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    fn rail(&self, family: ChainFamily) -> VenueId {
        self.rails
            .get(&family)
            .cloned()
            .unwrap_or_else(|| VenueId::new(format!("{}-wallet", family)))
    }

    /// Venue an intent maps to, without touching adapters or flags
    pub fn venue_for(&self, intent: &TradeIntent) -> Result<VenueId> {
        match intent.category {
            IntentCategory::Defi => {
                let chain = intent.chain.ok_or_else(|| {
                    Error::Configuration("defi intent requires a target chain".into())
                })?;
                Ok(self.rail(chain.family()))
            }
            category => self.venues.get(&category).cloned().ok_or_else(|| {
                Error::Configuration(format!("no venue configured for {}", category))
            }),
        }
    }

    /// Resolve a route, surfacing configuration errors
    pub fn try_resolve(&self, intent: &TradeIntent, requested: TradingMode) -> Result<ResolvedRoute> {
        let venue = self.venue_for(intent)?;
        let ceiling = self.guardrail.resolve(requested, intent.category.scope());

        let selection = match intent.category {
            IntentCategory::Custody => {
                self.registry.select_custody(&venue, ceiling, |family| self.rail(family))
            }
            _ => self.registry.select(&venue, ceiling),
        };

        debug!(
            intent = %intent.category,
            venue = %venue,
            requested = %requested,
            ceiling = %ceiling,
            mode = %selection.mode,
            "Resolved route"
        );

        Ok(ResolvedRoute {
            venue,
            adapter: selection.adapter,
            mode: selection.mode,
            degraded: None,
        })
    }

    /// Resolve a route, failing closed to a simulated no-route on error
    pub fn resolve(&self, intent: &TradeIntent, requested: TradingMode) -> ResolvedRoute {
        match self.try_resolve(intent, requested) {
            Ok(route) => route,
            Err(e) => self.fail_closed(e),
        }
    }

    /// Resolve from operator-supplied names (CLI and config surfaces)
    pub fn resolve_named(&self, category: &str, chain: Option<&str>, requested: TradingMode) -> ResolvedRoute {
        let intent = category.parse::<IntentCategory>().and_then(|category| {
            let chain = chain.map(str::parse::<Chain>).transpose()?;
            Ok(TradeIntent { category, chain })
        });
        match intent {
            Ok(intent) => self.resolve(&intent, requested),
            Err(e) => self.fail_closed(e),
        }
    }

    fn fail_closed(&self, e: Error) -> ResolvedRoute {
        warn!("Route unavailable, failing closed: {}", e);
        let venue = VenueId::new(UNROUTED_VENUE);
        let selection = self.registry.select(&venue, TradingMode::Simulated);
        ResolvedRoute {
            venue,
            adapter: selection.adapter,
            mode: TradingMode::Simulated,
            degraded: Some(e.to_string()),
        }
    }

    pub fn status(&self) -> GuardrailStatus {
        GuardrailStatus {
            flags: self.guardrail.flags(),
            default_venues: self.venues.clone(),
            wallet_rails: self.rails.clone(),
            registered_venues: self.registry.live_venues(),
        }
    }
}
