//! Multi-chain wallet
//!
//! Presents one adapter over one wallet per chain family and routes each
//! call by chain. Order ids and tickers carry the family / chain they belong
//! to so follow-up calls reach the same delegate.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;

use super::adapter::VenueAdapter;
use super::types::{
    Balance, Chain, ChainFamily, Order, OrderAck, OrderRequest, Ticker, Trade, TradingMode,
    VenueHealth, VenueId,
};
use crate::error::{Error, Result};

/// Custody adapter delegating to per-family wallets
pub struct MultiChainWallet {
    venue: VenueId,
    evm: Arc<dyn VenueAdapter>,
    solana: Arc<dyn VenueAdapter>,
    bitcoin: Arc<dyn VenueAdapter>,
}

impl MultiChainWallet {
    pub fn new(
        venue: VenueId,
        evm: Arc<dyn VenueAdapter>,
        solana: Arc<dyn VenueAdapter>,
        bitcoin: Arc<dyn VenueAdapter>,
    ) -> Self {
        Self { venue, evm, solana, bitcoin }
    }

    /// Delegate for a chain family
    pub fn delegate(&self, family: ChainFamily) -> &Arc<dyn VenueAdapter> {
        match family {
            ChainFamily::Evm => &self.evm,
            ChainFamily::Solana => &self.solana,
            ChainFamily::Bitcoin => &self.bitcoin,
        }
    }

    fn delegates(&self) -> [(ChainFamily, &Arc<dyn VenueAdapter>); 3] {
        ChainFamily::ALL.map(|family| (family, self.delegate(family)))
    }

    fn unroutable(&self, reason: impl Into<String>) -> Error {
        Error::Configuration(format!("{}: {}", self.venue, reason.into()))
    }

    /// Split a `family:id` order id
    fn split_order_id<'a>(&self, order_id: &'a str) -> Result<(ChainFamily, &'a str)> {
        let (family, inner) = order_id
            .split_once(':')
            .ok_or_else(|| self.unroutable(format!("order id {} has no chain family", order_id)))?;
        Ok((family.parse()?, inner))
    }

    /// Split a `chain:BASE/QUOTE` symbol
    fn split_symbol<'a>(&self, symbol: &'a str) -> Result<(Chain, &'a str)> {
        let (chain, pair) = symbol
            .split_once(':')
            .ok_or_else(|| self.unroutable(format!("symbol {} is not chain-qualified", symbol)))?;
        Ok((chain.parse()?, pair))
    }

    fn qualify(family: ChainFamily, mut order: Order) -> Order {
        order.id = format!("{}:{}", family, order.id);
        order
    }
}

#[async_trait]
impl VenueAdapter for MultiChainWallet {
    fn venue(&self) -> &VenueId {
        &self.venue
    }

    /// Least permissive mode among the delegates
    fn mode(&self) -> TradingMode {
        self.delegates()
            .iter()
            .map(|(_, adapter)| adapter.mode())
            .min()
            .unwrap_or_default()
    }

    async fn health(&self) -> VenueHealth {
        let started = Instant::now();
        let reports = join_all(self.delegates().map(|(_, adapter)| adapter.health())).await;
        let down: Vec<String> = reports
            .iter()
            .filter(|h| !h.alive)
            .map(|h| h.venue.to_string())
            .collect();

        VenueHealth {
            venue: self.venue.clone(),
            mode: self.mode(),
            alive: down.is_empty(),
            latency_ms: started.elapsed().as_millis() as u64,
            detail: (!down.is_empty()).then(|| format!("unhealthy delegates: {}", down.join(", "))),
        }
    }

    async fn balances(&self, assets: &[String]) -> Result<Vec<Balance>> {
        let results = join_all(self.delegates().map(|(_, adapter)| adapter.balances(assets))).await;
        let mut merged = Vec::new();
        for result in results {
            merged.extend(result?);
        }
        Ok(merged)
    }

    async fn ticker(&self, symbol: &str) -> Result<Ticker> {
        let (chain, pair) = self.split_symbol(symbol)?;
        let mut ticker = self.delegate(chain.family()).ticker(pair).await?;
        ticker.symbol = symbol.to_string();
        Ok(ticker)
    }

    async fn submit_order(&self, request: OrderRequest) -> Result<OrderAck> {
        let chain = request
            .chain
            .ok_or_else(|| self.unroutable("wallet orders require a target chain"))?;
        let family = chain.family();
        let ack = self.delegate(family).submit_order(request).await?;
        Ok(OrderAck {
            order_id: format!("{}:{}", family, ack.order_id),
            status: ack.status,
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let (family, inner) = self.split_order_id(order_id)?;
        self.delegate(family).cancel_order(inner).await
    }

    async fn order(&self, order_id: &str) -> Result<Order> {
        let (family, inner) = self.split_order_id(order_id)?;
        let order = self.delegate(family).order(inner).await?;
        Ok(Self::qualify(family, order))
    }

    async fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>> {
        let mut open = Vec::new();
        for (family, adapter) in self.delegates() {
            let orders = adapter.open_orders(symbol).await?;
            open.extend(orders.into_iter().map(|o| Self::qualify(family, o)));
        }
        Ok(open)
    }

    async fn trades(&self, symbol: Option<&str>, limit: usize) -> Result<Vec<Trade>> {
        let mut all = Vec::new();
        for (family, adapter) in self.delegates() {
            for mut trade in adapter.trades(symbol, limit).await? {
                trade.order_id = format!("{}:{}", family, trade.order_id);
                all.push(trade);
            }
        }
        all.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).collect())
    }
}
