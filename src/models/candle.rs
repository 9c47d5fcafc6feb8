use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Timeframe;

/// A fully closed OHLC candle. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub timeframe: Timeframe,
}

impl Candle {
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn total_range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.close.max(self.open)
    }

    pub fn lower_wick(&self) -> f64 {
        self.close.min(self.open) - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn body_top(&self) -> f64 {
        self.close.max(self.open)
    }

    pub fn body_bottom(&self) -> f64 {
        self.close.min(self.open)
    }
}

/// Ordered sequence of closed candles for a single timeframe.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self { candles }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn tail(&self, n: usize) -> CandleSeries {
        let start = self.candles.len().saturating_sub(n);
        CandleSeries::new(self.candles[start..].to_vec())
    }

    pub fn slice(&self, start: usize, end: usize) -> CandleSeries {
        let s = start.min(self.candles.len());
        let e = end.min(self.candles.len()).max(s);
        CandleSeries::new(self.candles[s..e].to_vec())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.candles.iter()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn highs_max(&self) -> f64 {
        self.candles
            .iter()
            .map(|c| c.high)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn lows_min(&self) -> f64 {
        self.candles
            .iter()
            .map(|c| c.low)
            .fold(f64::INFINITY, f64::min)
    }

    /// Mean absolute body size over the last `n` candles.
    pub fn mean_body(&self, n: usize) -> f64 {
        let tail = self.tail(n);
        if tail.is_empty() {
            return 0.0;
        }
        tail.iter().map(|c| c.body()).sum::<f64>() / tail.len() as f64
    }

    pub fn any_low_below(&self, price: f64) -> bool {
        self.candles.iter().any(|c| c.low < price)
    }

    pub fn any_high_above(&self, price: f64) -> bool {
        self.candles.iter().any(|c| c.high > price)
    }

    pub fn any_close_above(&self, price: f64) -> bool {
        self.candles.iter().any(|c| c.close > price)
    }

    pub fn any_close_below(&self, price: f64) -> bool {
        self.candles.iter().any(|c| c.close < price)
    }

    pub fn push(&mut self, candle: Candle) {
        self.candles.push(candle);
    }
}

impl std::ops::Index<usize> for CandleSeries {
    type Output = Candle;
    fn index(&self, index: usize) -> &Self::Output {
        &self.candles[index]
    }
}

impl IntoIterator for CandleSeries {
    type Item = Candle;
    type IntoIter = std::vec::IntoIter<Candle>;
    fn into_iter(self) -> Self::IntoIter {
        self.candles.into_iter()
    }
}

impl<'a> IntoIterator for &'a CandleSeries {
    type Item = &'a Candle;
    type IntoIter = std::slice::Iter<'a, Candle>;
    fn into_iter(self) -> Self::IntoIter {
        self.candles.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::make_candles;

    fn bullish_candle() -> Candle {
        Candle {
            timestamp: Utc::now(),
            open: 100.0,
            high: 115.0,
            low: 95.0,
            close: 110.0,
            timeframe: Timeframe::M15,
        }
    }

    fn bearish_candle() -> Candle {
        Candle {
            timestamp: Utc::now(),
            open: 110.0,
            high: 115.0,
            low: 95.0,
            close: 100.0,
            timeframe: Timeframe::M15,
        }
    }

    #[test]
    fn candle_body_and_range() {
        let c = bullish_candle();
        assert!((c.body() - 10.0).abs() < 1e-9);
        assert!((c.total_range() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn candle_wicks() {
        let c = bullish_candle(); // O=100, H=115, L=95, C=110
        assert!((c.upper_wick() - 5.0).abs() < 1e-9);
        assert!((c.lower_wick() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn candle_bullish_bearish() {
        assert!(bullish_candle().is_bullish());
        assert!(!bullish_candle().is_bearish());
        assert!(bearish_candle().is_bearish());
        assert!(!bearish_candle().is_bullish());
    }

    #[test]
    fn series_tail_and_slice() {
        let s = make_candles(&[
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 108.0, 100.0, 106.0),
            (106.0, 112.0, 104.0, 110.0),
        ]);
        assert_eq!(s.len(), 3);
        let tail = s.tail(2);
        assert_eq!(tail.len(), 2);
        assert!((tail[0].open - 102.0).abs() < 1e-9);
        let slice = s.slice(1, 3);
        assert_eq!(slice.len(), 2);
    }

    #[test]
    fn series_extremes() {
        let s = make_candles(&[
            (100.0, 200.0, 50.0, 150.0),
            (150.0, 300.0, 80.0, 250.0),
            (250.0, 280.0, 60.0, 270.0),
        ]);
        assert!((s.highs_max() - 300.0).abs() < 1e-9);
        assert!((s.lows_min() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn mean_body_over_tail() {
        let s = make_candles(&[
            (100.0, 106.0, 99.0, 104.0),  // body 4
            (104.0, 108.0, 103.0, 106.0), // body 2
        ]);
        assert!((s.mean_body(2) - 3.0).abs() < 1e-9);
        assert!((s.mean_body(1) - 2.0).abs() < 1e-9);
    }
}
