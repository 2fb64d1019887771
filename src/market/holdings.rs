//! Portfolio holdings sources

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::types::{PortfolioSnapshot, PositionHolding};
use crate::error::Result;
use crate::runtime::clock::SharedClock;

/// External holdings-aggregation collaborator
#[async_trait]
pub trait HoldingsSource: Send + Sync {
    async fn snapshot(&self) -> Result<PortfolioSnapshot>;
}

/// Holdings kept in memory, replaced wholesale by the owner
pub struct InMemoryHoldings {
    positions: RwLock<Vec<PositionHolding>>,
    macro_stress: f64,
    clock: SharedClock,
}

impl InMemoryHoldings {
    pub fn new(positions: Vec<PositionHolding>, macro_stress: f64, clock: SharedClock) -> Self {
        Self {
            positions: RwLock::new(positions),
            macro_stress: macro_stress.clamp(0.0, 1.0),
            clock,
        }
    }

    pub async fn replace(&self, positions: Vec<PositionHolding>) {
        *self.positions.write().await = positions;
    }
}

#[async_trait]
impl HoldingsSource for InMemoryHoldings {
    async fn snapshot(&self) -> Result<PortfolioSnapshot> {
        let positions = self.positions.read().await.clone();
        let macro_stress = self.macro_stress;
        Ok(PortfolioSnapshot::new(positions, macro_stress, self.clock.now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::clock::ManualClock;
    use chrono::Utc;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_snapshot_reflects_replacement() {
        let start = Utc::now();
        let holdings = InMemoryHoldings::new(Vec::new(), 2.0, Arc::new(ManualClock::new(start)));
        holdings
            .replace(vec![PositionHolding::new("BTC/USDT", 1_000.0, "binance")])
            .await;

        let snapshot = holdings.snapshot().await.unwrap();
        assert_eq!(snapshot.positions.len(), 1);
        assert_eq!(snapshot.macro_stress, 1.0);
        assert_eq!(snapshot.taken_at, start);
    }
}
