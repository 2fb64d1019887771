//! Venue layer
//!
//! The adapter contract shared by exchanges and wallets, the simulated
//! stand-in, the multi-chain delegating wallet and the registry that hands
//! out handles per clamped mode.

pub mod adapter;
pub mod multi_chain;
pub mod registry;
pub mod simulated;
pub mod types;

pub use adapter::{tag_venue, with_retry, RetryPolicy, VenueAdapter};
pub use multi_chain::MultiChainWallet;
pub use registry::{AdapterRegistry, Selection};
pub use simulated::{SimulatedAdapter, SimulationConfig};
pub use types::{
    split_symbol, Balance, Chain, ChainFamily, Order, OrderAck, OrderRequest, OrderStatus,
    OrderType, Side, Ticker, TimeInForce, Trade, TradingMode, VenueHealth, VenueId,
};
