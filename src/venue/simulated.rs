//! Simulated venue
//!
//! Honors the full adapter contract with synthesized prices, fills and
//! latency, so callers cannot tell it apart from a real venue except through
//! the reported mode.

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::adapter::VenueAdapter;
use super::types::{
    split_symbol, Balance, Order, OrderAck, OrderRequest, OrderStatus, OrderType, Side, Ticker,
    TimeInForce, Trade, TradingMode, VenueHealth, VenueId,
};
use crate::error::{Error, Result};

/// Simulation parameters shared by every simulated venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_latency_min_ms")]
    pub latency_min_ms: u64,
    #[serde(default = "default_latency_max_ms")]
    pub latency_max_ms: u64,
    /// Taker fee as a fraction of notional
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,
    /// Adverse slippage applied to market fills
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: f64,
    /// Max per-tick relative price move of the random walk
    #[serde(default = "default_price_step")]
    pub price_step: f64,
    /// Probability that a call fails with a connectivity error
    #[serde(default)]
    pub connectivity_failure_rate: f64,
    /// Reference prices per base asset, quoted in stablecoins
    #[serde(default = "default_base_prices")]
    pub base_prices: HashMap<String, f64>,
    /// Starting free balances per asset
    #[serde(default = "default_starting_balances")]
    pub starting_balances: HashMap<String, f64>,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_latency_min_ms() -> u64 { 20 }
fn default_latency_max_ms() -> u64 { 120 }
fn default_fee_rate() -> f64 { 0.001 }
fn default_slippage_bps() -> f64 { 5.0 }
fn default_price_step() -> f64 { 0.002 }

fn default_base_prices() -> HashMap<String, f64> {
    HashMap::from([
        ("BTC".to_string(), 65_000.0),
        ("ETH".to_string(), 3_200.0),
        ("SOL".to_string(), 150.0),
        ("POL".to_string(), 0.5),
    ])
}

fn default_starting_balances() -> HashMap<String, f64> {
    HashMap::from([
        ("USDT".to_string(), 100_000.0),
        ("USDC".to_string(), 50_000.0),
        ("BTC".to_string(), 1.0),
        ("ETH".to_string(), 10.0),
        ("SOL".to_string(), 100.0),
    ])
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            latency_min_ms: default_latency_min_ms(),
            latency_max_ms: default_latency_max_ms(),
            fee_rate: default_fee_rate(),
            slippage_bps: default_slippage_bps(),
            price_step: default_price_step(),
            connectivity_failure_rate: 0.0,
            base_prices: default_base_prices(),
            starting_balances: default_starting_balances(),
            seed: None,
        }
    }
}

const STABLE_ASSETS: [&str; 4] = ["USDT", "USDC", "USD", "DAI"];
const MAX_TRADE_HISTORY: usize = 1_000;

#[derive(Debug, Clone)]
struct PriceState {
    last: f64,
    open: f64,
    high: f64,
    low: f64,
    volume: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Holding {
    free: f64,
    locked: f64,
}

struct SimState {
    rng: StdRng,
    prices: HashMap<String, PriceState>,
    balances: HashMap<String, Holding>,
    orders: HashMap<String, Order>,
    /// Funds held by each resting order: (asset, amount)
    reservations: HashMap<String, (String, f64)>,
    trades: Vec<Trade>,
}

/// In-process stand-in for a venue
pub struct SimulatedAdapter {
    venue: VenueId,
    config: SimulationConfig,
    state: Mutex<SimState>,
}

impl SimulatedAdapter {
    pub fn new(venue: VenueId, config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let balances = config
            .starting_balances
            .iter()
            .map(|(asset, free)| (asset.clone(), Holding { free: *free, locked: 0.0 }))
            .collect();

        Self {
            venue,
            config,
            state: Mutex::new(SimState {
                rng,
                prices: HashMap::new(),
                balances,
                orders: HashMap::new(),
                reservations: HashMap::new(),
                trades: Vec::new(),
            }),
        }
    }

    /// Pin the reference price of a symbol (test and replay helper)
    pub async fn set_price(&self, symbol: &str, price: f64) {
        let mut state = self.state.lock().await;
        let entry = state.prices.entry(symbol.to_string()).or_insert(PriceState {
            last: price,
            open: price,
            high: price,
            low: price,
            volume: 0.0,
        });
        entry.last = price;
        entry.high = entry.high.max(price);
        entry.low = entry.low.min(price);
    }

    /// Simulated network round-trip; also rolls the injected failure
    async fn round_trip(&self) -> Result<()> {
        let (delay, fail) = {
            let mut state = self.state.lock().await;
            let (min, max) = (
                self.config.latency_min_ms,
                self.config.latency_max_ms.max(self.config.latency_min_ms),
            );
            let delay = if max > min { state.rng.gen_range(min..=max) } else { min };
            let fail = self.config.connectivity_failure_rate > 0.0
                && state.rng.gen_bool(self.config.connectivity_failure_rate.min(1.0));
            (delay, fail)
        };

        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if fail {
            return Err(Error::connectivity(self.venue.as_str(), "simulated network timeout"));
        }
        Ok(())
    }

    fn reject(&self, reason: impl Into<String>) -> Error {
        Error::rejection(self.venue.as_str(), reason)
    }

    fn reference_price(&self, symbol: &str) -> Result<f64> {
        let (base, quote) = split_symbol(symbol)
            .ok_or_else(|| self.reject(format!("malformed symbol {}", symbol)))?;
        if !STABLE_ASSETS.contains(&quote) {
            return Err(self.reject(format!("unsupported quote asset {}", quote)));
        }
        self.config
            .base_prices
            .get(base)
            .copied()
            .ok_or_else(|| self.reject(format!("unknown symbol {}", symbol)))
    }

    fn price_entry<'a>(&self, state: &'a mut SimState, symbol: &str) -> Result<&'a mut PriceState> {
        if !state.prices.contains_key(symbol) {
            let price = self.reference_price(symbol)?;
            state.prices.insert(
                symbol.to_string(),
                PriceState { last: price, open: price, high: price, low: price, volume: 0.0 },
            );
        }
        state
            .prices
            .get_mut(symbol)
            .ok_or_else(|| Error::Internal(format!("price state missing for {}", symbol)))
    }

    /// Advance the random walk by one step
    fn step_price(&self, state: &mut SimState, symbol: &str) -> Result<f64> {
        let shock: f64 = state.rng.gen_range(-1.0..=1.0) * self.config.price_step;
        let traded: f64 = state.rng.gen_range(0.0..10.0);
        let entry = self.price_entry(state, symbol)?;
        entry.last = (entry.last * (1.0 + shock)).max(f64::EPSILON);
        entry.high = entry.high.max(entry.last);
        entry.low = entry.low.min(entry.last);
        entry.volume += traded;
        Ok(entry.last)
    }

    fn validate(&self, request: &OrderRequest) -> Result<()> {
        if !request.quantity.is_finite() || request.quantity <= 0.0 {
            return Err(self.reject("quantity must be positive"));
        }
        match request.order_type {
            OrderType::Market => {}
            OrderType::Limit => {
                if !request.price.map_or(false, |p| p.is_finite() && p > 0.0) {
                    return Err(self.reject("limit order requires a positive price"));
                }
            }
            OrderType::Stop => {
                if request.stop_price.is_none() {
                    return Err(self.reject("stop order requires a stop price"));
                }
            }
            OrderType::StopLimit => {
                if request.stop_price.is_none() || request.price.is_none() {
                    return Err(self.reject("stop-limit order requires stop and limit prices"));
                }
            }
        }
        Ok(())
    }

    /// Funds that must be reserved to place the order
    fn required_funds(request: &OrderRequest, reference: f64, fee_rate: f64) -> (String, f64) {
        let (base, quote) = split_symbol(&request.symbol).unwrap_or_default();
        match request.side {
            Side::Buy => {
                let price = request.price.unwrap_or(reference);
                (quote.to_string(), request.quantity * price * (1.0 + fee_rate))
            }
            Side::Sell => (base.to_string(), request.quantity),
        }
    }

    fn fill(&self, state: &mut SimState, order_id: &str, price: f64) {
        let fee_rate = self.config.fee_rate;
        let Some(order) = state.orders.get(order_id).cloned() else {
            return;
        };
        let Some((base, quote)) = split_symbol(&order.symbol) else {
            return;
        };
        let qty = order.remaining;
        let notional = qty * price;
        let fee = notional * fee_rate;

        // Release whatever was reserved, then settle at the fill price
        self.release(state, order_id);

        match order.side {
            Side::Buy => {
                state.balances.entry(quote.to_string()).or_default().free -= notional + fee;
                state.balances.entry(base.to_string()).or_default().free += qty;
            }
            Side::Sell => {
                state.balances.entry(base.to_string()).or_default().free -= qty;
                state.balances.entry(quote.to_string()).or_default().free += notional - fee;
            }
        }

        let now = Utc::now();
        if let Some(order) = state.orders.get_mut(order_id) {
            order.filled += qty;
            order.remaining = 0.0;
            order.fees += fee;
            order.average_fill_price = Some(price);
            order.status = OrderStatus::Filled;
            order.updated_at = now;
        }

        state.trades.push(Trade {
            id: format!("{}-fill-{}", order_id, state.trades.len() + 1),
            order_id: order_id.to_string(),
            venue: self.venue.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            price,
            quantity: qty,
            fee,
            timestamp: now,
        });
        if state.trades.len() > MAX_TRADE_HISTORY {
            state.trades.remove(0);
        }
    }

    fn release(&self, state: &mut SimState, order_id: &str) {
        if let Some((asset, amount)) = state.reservations.remove(order_id) {
            let holding = state.balances.entry(asset).or_default();
            let amount = amount.min(holding.locked);
            holding.locked -= amount;
            holding.free += amount;
        }
    }

    /// Re-evaluate resting orders against the current price
    fn refresh(&self, state: &mut SimState, order_id: &str) {
        let Some(order) = state.orders.get(order_id).cloned() else {
            return;
        };
        if order.status.is_terminal() {
            return;
        }
        let Some(last) = state.prices.get(&order.symbol).map(|p| p.last) else {
            return;
        };

        let crossed = |trigger: f64| match order.side {
            Side::Buy => last >= trigger,
            Side::Sell => last <= trigger,
        };
        let marketable = |limit: f64| match order.side {
            Side::Buy => last <= limit,
            Side::Sell => last >= limit,
        };

        match order.order_type {
            OrderType::Limit => {
                if let Some(limit) = order.price {
                    if marketable(limit) {
                        self.fill(state, order_id, limit);
                    }
                }
            }
            OrderType::Stop => {
                if order.stop_price.map_or(false, crossed) {
                    self.fill(state, order_id, last);
                }
            }
            OrderType::StopLimit => {
                if let (Some(stop), Some(limit)) = (order.stop_price, order.price) {
                    if crossed(stop) && marketable(limit) {
                        self.fill(state, order_id, limit);
                    }
                }
            }
            OrderType::Market => {}
        }
    }
}

#[async_trait]
impl VenueAdapter for SimulatedAdapter {
    fn venue(&self) -> &VenueId {
        &self.venue
    }

    fn mode(&self) -> TradingMode {
        TradingMode::Simulated
    }

    async fn health(&self) -> VenueHealth {
        let started = Instant::now();
        let result = self.round_trip().await;
        VenueHealth {
            venue: self.venue.clone(),
            mode: self.mode(),
            alive: result.is_ok(),
            latency_ms: started.elapsed().as_millis() as u64,
            detail: result.err().map(|e| e.to_string()),
        }
    }

    async fn balances(&self, assets: &[String]) -> Result<Vec<Balance>> {
        self.round_trip().await?;
        let state = self.state.lock().await;
        let mut balances: Vec<Balance> = state
            .balances
            .iter()
            .filter(|(asset, _)| assets.is_empty() || assets.contains(asset))
            .map(|(asset, h)| Balance::new(self.venue.clone(), asset.clone(), h.free, h.locked))
            .collect();
        balances.sort_by(|a, b| a.asset.cmp(&b.asset));
        Ok(balances)
    }

    async fn ticker(&self, symbol: &str) -> Result<Ticker> {
        self.round_trip().await?;
        let mut state = self.state.lock().await;
        let last = self.step_price(&mut state, symbol)?;
        let spread = last * self.config.slippage_bps / 10_000.0;
        let entry = self.price_entry(&mut state, symbol)?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            last,
            bid: last - spread,
            ask: last + spread,
            high_24h: entry.high,
            low_24h: entry.low,
            volume_24h: entry.volume,
            change_pct_24h: (last - entry.open) / entry.open * 100.0,
            timestamp: Utc::now(),
        })
    }

    async fn submit_order(&self, request: OrderRequest) -> Result<OrderAck> {
        self.validate(&request)?;
        self.round_trip().await?;

        let mut state = self.state.lock().await;

        // Idempotent resubmission by client id
        if let Some(client_id) = &request.client_id {
            let existing = format!("{}-{}", self.venue, client_id);
            if let Some(order) = state.orders.get(&existing) {
                return Ok(OrderAck { order_id: order.id.clone(), status: order.status });
            }
        }

        let last = self.step_price(&mut state, &request.symbol)?;
        let (asset, required) = Self::required_funds(&request, last, self.config.fee_rate);
        let available = state.balances.get(&asset).map(|h| h.free).unwrap_or(0.0);
        if available < required {
            return Err(self.reject(format!(
                "insufficient {} balance: {:.6} available, {:.6} required",
                asset, available, required
            )));
        }

        let order_id = match &request.client_id {
            Some(client_id) => format!("{}-{}", self.venue, client_id),
            None => format!("{}-{}", self.venue, Uuid::new_v4()),
        };

        let holding = state.balances.entry(asset.clone()).or_default();
        holding.free -= required;
        holding.locked += required;
        state.reservations.insert(order_id.clone(), (asset, required));

        let now = Utc::now();
        state.orders.insert(
            order_id.clone(),
            Order {
                id: order_id.clone(),
                venue: self.venue.clone(),
                symbol: request.symbol.clone(),
                side: request.side,
                order_type: request.order_type,
                quantity: request.quantity,
                price: request.price,
                stop_price: request.stop_price,
                status: OrderStatus::Open,
                filled: 0.0,
                remaining: request.quantity,
                average_fill_price: None,
                fees: 0.0,
                created_at: now,
                updated_at: now,
            },
        );

        if request.order_type == OrderType::Market {
            let slip = last * self.config.slippage_bps / 10_000.0;
            let price = match request.side {
                Side::Buy => last + slip,
                Side::Sell => last - slip,
            };
            self.fill(&mut state, &order_id, price);
        } else {
            self.refresh(&mut state, &order_id);
        }

        // Unfilled immediate orders expire instead of resting
        let resting = state
            .orders
            .get(&order_id)
            .map(|o| !o.status.is_terminal())
            .unwrap_or(false);
        if resting && request.time_in_force != TimeInForce::Gtc {
            self.release(&mut state, &order_id);
            if let Some(order) = state.orders.get_mut(&order_id) {
                order.status = OrderStatus::Expired;
                order.updated_at = now;
            }
        }

        let status = state
            .orders
            .get(&order_id)
            .map(|o| o.status)
            .unwrap_or(OrderStatus::Rejected);
        debug!(venue = %self.venue, order_id = %order_id, ?status, "Simulated order accepted");

        Ok(OrderAck { order_id, status })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.round_trip().await?;
        let mut state = self.state.lock().await;
        let order = state.orders.get(order_id).cloned().ok_or_else(|| Error::OrderNotFound {
            venue: self.venue.to_string(),
            order_id: order_id.to_string(),
        })?;

        match order.status {
            OrderStatus::Canceled => Ok(()),
            status if status.is_terminal() => {
                Err(self.reject(format!("order {} already {:?}", order_id, status)))
            }
            _ => {
                self.release(&mut state, order_id);
                if let Some(order) = state.orders.get_mut(order_id) {
                    order.status = OrderStatus::Canceled;
                    order.updated_at = Utc::now();
                }
                Ok(())
            }
        }
    }

    async fn order(&self, order_id: &str) -> Result<Order> {
        self.round_trip().await?;
        let mut state = self.state.lock().await;
        self.refresh(&mut state, order_id);
        state.orders.get(order_id).cloned().ok_or_else(|| Error::OrderNotFound {
            venue: self.venue.to_string(),
            order_id: order_id.to_string(),
        })
    }

    async fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>> {
        self.round_trip().await?;
        let mut state = self.state.lock().await;
        let ids: Vec<String> = state.orders.keys().cloned().collect();
        for id in &ids {
            self.refresh(&mut state, id);
        }
        let mut open: Vec<Order> = state
            .orders
            .values()
            .filter(|o| !o.status.is_terminal())
            .filter(|o| symbol.map_or(true, |s| o.symbol == s))
            .cloned()
            .collect();
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(open)
    }

    async fn trades(&self, symbol: Option<&str>, limit: usize) -> Result<Vec<Trade>> {
        self.round_trip().await?;
        let state = self.state.lock().await;
        let matching: Vec<Trade> = state
            .trades
            .iter()
            .filter(|t| symbol.map_or(true, |s| t.symbol == s))
            .cloned()
            .collect();
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.into_iter().skip(skip).collect())
    }
}
