//! Market inputs
//!
//! Market ticks and portfolio holdings arrive from external collaborators
//! through these traits. In-memory and simulated sources back the runtime
//! when no external feed is wired in.

pub mod feed;
pub mod holdings;
pub mod types;

pub use feed::{AdapterMarketFeed, MarketDataSource, SimulatedMarketFeed};
pub use holdings::{HoldingsSource, InMemoryHoldings};
pub use types::{AssetClass, MarketTick, PortfolioSnapshot, PositionHolding};
