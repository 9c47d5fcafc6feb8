use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{CandleSeries, SwingKind, Timeframe};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwingPoint {
    pub kind: SwingKind,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub timeframe: Timeframe,
    /// Index of the swing candle within the series it was detected on.
    pub index: usize,
    /// Close time of the candle that confirmed this swing. No consumer may
    /// act on the swing before this moment.
    pub confirmed_at: DateTime<Utc>,
    pub broken: bool,
}

/// Fractal swing detection with a confirmation lag.
///
/// A candle is a swing high when its high is the maximum over `lookback`
/// candles on each side. The swing only exists once `lookback +
/// confirmation_lag` further candles have closed, so a detected swing can
/// never depend on data newer than its confirmation candle.
pub struct SwingDetector {
    pub lookback: usize,
    pub confirmation_lag: usize,
}

impl SwingDetector {
    pub fn new(lookback: usize, confirmation_lag: usize) -> Self {
        Self {
            lookback,
            confirmation_lag,
        }
    }

    /// All confirmed swings in the series, in index order.
    pub fn detect(&self, candles: &CandleSeries) -> Vec<SwingPoint> {
        let lb = self.lookback;
        let lag = self.confirmation_lag;
        let len = candles.len();
        if len < lb * 2 + lag + 1 {
            return Vec::new();
        }

        let mut swings = Vec::new();

        // Last index whose right window plus confirmation candles all exist.
        let last_confirmable = len - 1 - lb - lag;

        for i in lb..=last_confirmable {
            let confirm_idx = i + lb + lag;
            let confirmed_at = candles[confirm_idx].timestamp;

            let current_high = candles[i].high;
            let is_swing_high = (i - lb..=i + lb).all(|j| j == i || candles[j].high <= current_high);
            if is_swing_high {
                swings.push(SwingPoint {
                    kind: SwingKind::High,
                    price: current_high,
                    timestamp: candles[i].timestamp,
                    timeframe: candles[i].timeframe,
                    index: i,
                    confirmed_at,
                    broken: false,
                });
            }

            let current_low = candles[i].low;
            let is_swing_low = (i - lb..=i + lb).all(|j| j == i || candles[j].low >= current_low);
            if is_swing_low {
                swings.push(SwingPoint {
                    kind: SwingKind::Low,
                    price: current_low,
                    timestamp: candles[i].timestamp,
                    timeframe: candles[i].timeframe,
                    index: i,
                    confirmed_at,
                    broken: false,
                });
            }
        }

        swings
    }

    pub fn highs(&self, candles: &CandleSeries) -> Vec<SwingPoint> {
        self.detect(candles)
            .into_iter()
            .filter(|s| s.kind == SwingKind::High)
            .collect()
    }

    pub fn lows(&self, candles: &CandleSeries) -> Vec<SwingPoint> {
        self.detect(candles)
            .into_iter()
            .filter(|s| s.kind == SwingKind::Low)
            .collect()
    }
}
