//! Adapter registry
//!
//! Real adapters are registered by the operator; simulated stand-ins are
//! created on first use and reused afterwards so their in-memory books
//! survive across routes.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::adapter::VenueAdapter;
use super::multi_chain::MultiChainWallet;
use super::simulated::{SimulatedAdapter, SimulationConfig};
use super::types::{ChainFamily, TradingMode, VenueId};
use crate::error::{Error, Result};

/// Adapter handle chosen for a clamped mode
#[derive(Clone)]
pub struct Selection {
    pub adapter: Arc<dyn VenueAdapter>,
    /// Mode the handle actually runs in, never above the clamped mode
    pub mode: TradingMode,
}

pub struct AdapterRegistry {
    simulation: SimulationConfig,
    live: DashMap<VenueId, Arc<dyn VenueAdapter>>,
    simulated: DashMap<VenueId, Arc<dyn VenueAdapter>>,
    /// Stand-ins owned by a simulated multi-chain wallet, keyed to the wallet
    delegated: DashMap<VenueId, VenueId>,
}

impl AdapterRegistry {
    pub fn new(simulation: SimulationConfig) -> Self {
        Self {
            simulation,
            live: DashMap::new(),
            simulated: DashMap::new(),
            delegated: DashMap::new(),
        }
    }

    /// Register a real (sandbox or live) adapter under its own venue id
    pub fn register(&self, adapter: Arc<dyn VenueAdapter>) -> Result<()> {
        if adapter.mode() == TradingMode::Simulated {
            return Err(Error::Configuration(format!(
                "{} reports simulated mode; simulated stand-ins are created automatically",
                adapter.venue()
            )));
        }
        info!(venue = %adapter.venue(), mode = %adapter.mode(), "Registered venue adapter");
        self.live.insert(adapter.venue().clone(), adapter);
        Ok(())
    }

    /// Venues with a registered real adapter, sorted
    pub fn live_venues(&self) -> Vec<(VenueId, TradingMode)> {
        let mut venues: Vec<_> = self
            .live
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().mode()))
            .collect();
        venues.sort();
        venues
    }

    /// Every adapter that may hold open orders, each order reachable once
    ///
    /// Delegates of a multi-chain wallet are reported through the wallet.
    pub fn all_adapters(&self) -> Vec<Arc<dyn VenueAdapter>> {
        self.live
            .iter()
            .chain(self.simulated.iter().filter(|entry| !self.delegated.contains_key(entry.key())))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Pick the handle for a venue under a clamped mode
    ///
    /// A real adapter is handed out only when its own mode does not exceed
    /// `clamped`; otherwise the venue's simulated stand-in is used.
    pub fn select(&self, venue: &VenueId, clamped: TradingMode) -> Selection {
        if let Some(selection) = self.real(venue, clamped) {
            return selection;
        }
        Selection {
            adapter: self.simulated(venue),
            mode: TradingMode::Simulated,
        }
    }

    /// Same as [`select`](Self::select), with a multi-chain stand-in for the
    /// custody venue
    pub fn select_custody(
        &self,
        venue: &VenueId,
        clamped: TradingMode,
        rail: impl Fn(ChainFamily) -> VenueId,
    ) -> Selection {
        if let Some(selection) = self.real(venue, clamped) {
            return selection;
        }
        if let Some(existing) = self.simulated.get(venue) {
            return Selection {
                adapter: existing.value().clone(),
                mode: TradingMode::Simulated,
            };
        }

        // Delegates are resolved before taking the entry lock on the map
        let rails = ChainFamily::ALL.map(&rail);
        for delegate in &rails {
            self.delegated.insert(delegate.clone(), venue.clone());
        }
        let [evm, solana, bitcoin] = rails.map(|id| self.simulated(&id));
        let wallet: Arc<dyn VenueAdapter> = Arc::new(MultiChainWallet::new(venue.clone(), evm, solana, bitcoin));
        debug!(venue = %venue, "Creating simulated custody wallet");
        let adapter = self.simulated.entry(venue.clone()).or_insert(wallet).clone();
        Selection { adapter, mode: TradingMode::Simulated }
    }

    fn real(&self, venue: &VenueId, clamped: TradingMode) -> Option<Selection> {
        if clamped == TradingMode::Simulated {
            return None;
        }
        let adapter = self.live.get(venue)?.value().clone();
        let mode = adapter.mode();
        if mode > clamped {
            debug!(venue = %venue, adapter_mode = %mode, clamped = %clamped, "Adapter exceeds ceiling, using stand-in");
            return None;
        }
        Some(Selection { adapter, mode })
    }

    fn simulated(&self, venue: &VenueId) -> Arc<dyn VenueAdapter> {
        if let Some(existing) = self.simulated.get(venue) {
            return existing.value().clone();
        }
        self.simulated
            .entry(venue.clone())
            .or_insert_with(|| {
                debug!(venue = %venue, "Creating simulated adapter");
                Arc::new(SimulatedAdapter::new(venue.clone(), self.simulation.clone()))
            })
            .clone()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::venue::types::{
        Balance, Order, OrderAck, OrderRequest, OrderStatus, Side, Ticker, Trade, VenueHealth,
    };
    use async_trait::async_trait;
    use chrono::Utc;

    /// Real-adapter double that acknowledges everything
    pub(crate) struct StubAdapter {
        pub venue: VenueId,
        pub mode: TradingMode,
    }

    impl StubAdapter {
        pub(crate) fn arc(venue: &str, mode: TradingMode) -> Arc<dyn VenueAdapter> {
            Arc::new(Self { venue: VenueId::new(venue), mode })
        }
    }

    #[async_trait]
    impl VenueAdapter for StubAdapter {
        fn venue(&self) -> &VenueId {
            &self.venue
        }

        fn mode(&self) -> TradingMode {
            self.mode
        }

        async fn health(&self) -> VenueHealth {
            VenueHealth {
                venue: self.venue.clone(),
                mode: self.mode,
                alive: true,
                latency_ms: 0,
                detail: None,
            }
        }

        async fn balances(&self, _assets: &[String]) -> Result<Vec<Balance>> {
            Ok(Vec::new())
        }

        async fn ticker(&self, symbol: &str) -> Result<Ticker> {
            Ok(Ticker {
                symbol: symbol.to_string(),
                last: 1.0,
                bid: 1.0,
                ask: 1.0,
                high_24h: 1.0,
                low_24h: 1.0,
                volume_24h: 0.0,
                change_pct_24h: 0.0,
                timestamp: Utc::now(),
            })
        }

        async fn submit_order(&self, _request: OrderRequest) -> Result<OrderAck> {
            Ok(OrderAck { order_id: "stub-1".into(), status: OrderStatus::Open })
        }

        async fn cancel_order(&self, _order_id: &str) -> Result<()> {
            Ok(())
        }

        async fn order(&self, order_id: &str) -> Result<Order> {
            Err(Error::OrderNotFound {
                venue: self.venue.to_string(),
                order_id: order_id.to_string(),
            })
        }

        async fn open_orders(&self, _symbol: Option<&str>) -> Result<Vec<Order>> {
            Ok(Vec::new())
        }

        async fn trades(&self, _symbol: Option<&str>, _limit: usize) -> Result<Vec<Trade>> {
            Ok(Vec::new())
        }
    }

    fn registry() -> AdapterRegistry {
        AdapterRegistry::new(SimulationConfig {
            latency_min_ms: 0,
            latency_max_ms: 0,
            ..Default::default()
        })
    }

    #[test]
    fn test_simulated_clamp_never_hands_out_real_adapter() {
        let registry = registry();
        registry.register(StubAdapter::arc("binance", TradingMode::Live)).unwrap();

        let selection = registry.select(&VenueId::new("binance"), TradingMode::Simulated);
        assert_eq!(selection.mode, TradingMode::Simulated);
        assert_eq!(selection.adapter.mode(), TradingMode::Simulated);
    }

    #[test]
    fn test_live_adapter_refused_under_sandbox_ceiling() {
        let registry = registry();
        registry.register(StubAdapter::arc("binance", TradingMode::Live)).unwrap();

        let selection = registry.select(&VenueId::new("binance"), TradingMode::Sandbox);
        assert_eq!(selection.mode, TradingMode::Simulated);
    }

    #[test]
    fn test_sandbox_adapter_used_under_live_ceiling() {
        let registry = registry();
        registry.register(StubAdapter::arc("bybit", TradingMode::Sandbox)).unwrap();

        let selection = registry.select(&VenueId::new("bybit"), TradingMode::Live);
        assert_eq!(selection.mode, TradingMode::Sandbox);
        assert_eq!(registry.live_venues(), vec![(VenueId::new("bybit"), TradingMode::Sandbox)]);
    }

    #[test]
    fn test_stand_ins_are_reused() {
        let registry = registry();
        let a = registry.select(&VenueId::new("kraken"), TradingMode::Simulated);
        let b = registry.select(&VenueId::new("kraken"), TradingMode::Live);
        assert!(Arc::ptr_eq(&a.adapter, &b.adapter));
    }

    #[test]
    fn test_register_refuses_simulated_adapter() {
        let registry = registry();
        assert!(registry
            .register(StubAdapter::arc("paper", TradingMode::Simulated))
            .is_err());
    }

    #[test]
    fn test_custody_stand_in_is_multi_chain() {
        let registry = registry();
        let selection = registry.select_custody(
            &VenueId::new("cold-storage"),
            TradingMode::Live,
            |family| VenueId::new(format!("{}-wallet", family)),
        );
        assert_eq!(selection.adapter.venue(), &VenueId::new("cold-storage"));
        assert_eq!(selection.mode, TradingMode::Simulated);
        let listed = registry.all_adapters();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].venue(), &VenueId::new("cold-storage"));
    }

    #[tokio::test]
    async fn test_delegate_orders_listed_once() {
        let registry = registry();
        registry.select_custody(&VenueId::new("cold-storage"), TradingMode::Simulated, |family| {
            VenueId::new(format!("{}-wallet", family))
        });
        let evm = registry.select(&VenueId::new("evm-wallet"), TradingMode::Simulated);
        evm.adapter
            .submit_order(OrderRequest::limit("ETH/USDT", Side::Buy, 1.0, 1_000.0))
            .await
            .unwrap();

        let mut open = 0;
        for adapter in registry.all_adapters() {
            open += adapter.open_orders(None).await.unwrap().len();
        }
        assert_eq!(open, 1);
    }
}
