//! Technical indicators over a bounded price history

use std::collections::VecDeque;

use super::types::IndicatorValues;

/// Bounded (price, volume) series, oldest first
#[derive(Debug, Clone)]
pub struct PriceHistory {
    samples: VecDeque<(f64, f64)>,
    max_samples: usize,
}

impl PriceHistory {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            max_samples: max_samples.max(1),
        }
    }

    pub fn push(&mut self, price: f64, volume: f64) {
        self.samples.push_back((price, volume));
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last_price(&self) -> Option<f64> {
        self.samples.back().map(|(p, _)| *p)
    }

    fn prices(&self) -> impl DoubleEndedIterator<Item = f64> + '_ {
        self.samples.iter().map(|(p, _)| *p)
    }

    /// Simple moving average of the last `period` prices
    pub fn sma(&self, period: usize) -> Option<f64> {
        if period == 0 || self.samples.len() < period {
            return None;
        }
        Some(self.prices().rev().take(period).sum::<f64>() / period as f64)
    }

    /// RSI from simple average gains and losses over `period` changes
    pub fn rsi(&self, period: usize) -> Option<f64> {
        if period == 0 || self.samples.len() < period + 1 {
            return None;
        }
        let recent: Vec<f64> = self.prices().rev().take(period + 1).collect();
        let (mut gains, mut losses) = (0.0, 0.0);
        for pair in recent.windows(2) {
            // reversed: pair[0] is newer
            let change = pair[0] - pair[1];
            if change > 0.0 {
                gains += change;
            } else {
                losses -= change;
            }
        }
        if losses == 0.0 {
            return Some(if gains == 0.0 { 50.0 } else { 100.0 });
        }
        let rs = gains / losses;
        Some(100.0 - 100.0 / (1.0 + rs))
    }

    /// Percent change over `period` samples
    pub fn momentum(&self, period: usize) -> Option<f64> {
        if self.samples.len() < period + 1 {
            return None;
        }
        let last = self.last_price()?;
        let past = self.prices().rev().nth(period)?;
        if past <= 0.0 {
            return None;
        }
        Some((last / past - 1.0) * 100.0)
    }

    /// Latest volume relative to the average of the last `period`
    pub fn volume_ratio(&self, period: usize) -> Option<f64> {
        if period == 0 || self.samples.len() < period {
            return None;
        }
        let volumes: Vec<f64> = self.samples.iter().rev().take(period).map(|(_, v)| *v).collect();
        let average = volumes.iter().sum::<f64>() / period as f64;
        if average <= 0.0 {
            return Some(1.0);
        }
        Some(volumes[0] / average)
    }
}

/// Periods for each indicator
#[derive(Debug, Clone, Copy)]
pub struct IndicatorPeriods {
    pub fast: usize,
    pub slow: usize,
    pub rsi: usize,
    pub momentum: usize,
}

/// Every indicator, or `None` until the history is long enough
pub fn compute(history: &PriceHistory, periods: IndicatorPeriods) -> Option<IndicatorValues> {
    Some(IndicatorValues {
        sma_fast: history.sma(periods.fast)?,
        sma_slow: history.sma(periods.slow)?,
        rsi: history.rsi(periods.rsi)?,
        momentum: history.momentum(periods.momentum)?,
        volume_ratio: history.volume_ratio(periods.slow)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(prices: &[f64]) -> PriceHistory {
        let mut h = PriceHistory::new(100);
        for p in prices {
            h.push(*p, 100.0);
        }
        h
    }

    #[test]
    fn test_sma() {
        let h = history(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(h.sma(2), Some(3.5));
        assert_eq!(h.sma(4), Some(2.5));
        assert_eq!(h.sma(5), None);
    }

    #[test]
    fn test_rsi_extremes() {
        assert_eq!(history(&[1.0, 2.0, 3.0, 4.0]).rsi(3), Some(100.0));
        assert_eq!(history(&[4.0, 3.0, 2.0, 1.0]).rsi(3), Some(0.0));
        assert_eq!(history(&[2.0, 2.0, 2.0]).rsi(2), Some(50.0));
    }

    #[test]
    fn test_rsi_balanced_moves() {
        let rsi = history(&[10.0, 11.0, 10.0]).rsi(2).unwrap();
        assert!((rsi - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_momentum_and_volume() {
        let mut h = history(&[100.0, 101.0, 102.0, 110.0]);
        assert!((h.momentum(3).unwrap() - 10.0).abs() < 1e-9);
        h.push(111.0, 300.0);
        // (100 + 100 + 300) / 3
        assert!((h.volume_ratio(3).unwrap() - 1.8).abs() < 1e-9);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut h = PriceHistory::new(3);
        for p in 0..10 {
            h.push(p as f64, 1.0);
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.last_price(), Some(9.0));
    }
}
