use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::swings::SwingPoint;
use crate::models::{Bias, CandleSeries, StructureKind, SwingKind, Timeframe, ZoneKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureEvent {
    pub kind: StructureKind,
    pub bias: Bias,
    /// The swing level whose break produced this event.
    pub level: f64,
    pub timestamp: DateTime<Utc>,
    pub timeframe: Timeframe,
}

/// Premium/discount partition of the current leg.
///
/// A band of `buffer` around equilibrium counts as neither side, so
/// price hovering at the midpoint never flips zone classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealingRange {
    pub high: f64,
    pub low: f64,
    pub equilibrium: f64,
    pub buffer: f64,
}

impl DealingRange {
    pub fn classify(&self, price: f64) -> ZoneKind {
        if price > self.equilibrium + self.buffer {
            ZoneKind::Premium
        } else if price < self.equilibrium - self.buffer {
            ZoneKind::Discount
        } else {
            ZoneKind::Equilibrium
        }
    }
}

/// Structure break detection over confirmed swings.
///
/// A break requires a body close beyond the swing level; wicks through
/// a level are sweeps, not breaks. Classification depends on the bias
/// in force when the break happens:
///
/// - with-bias break: BOS
/// - counter-bias break with displacement after an inducement sweep: MSS
/// - any other counter-bias break: CHoCH
pub struct StructureAnalyzer {
    pub displacement_mean_window: usize,
    pub equilibrium_buffer_percent: f64,
}

#[derive(Debug, Clone, Default)]
pub struct StructureReport {
    pub events: Vec<StructureEvent>,
    pub bias: Bias,
    pub dealing_range: Option<DealingRange>,
}

impl StructureAnalyzer {
    pub fn new(displacement_mean_window: usize, equilibrium_buffer_percent: f64) -> Self {
        Self {
            displacement_mean_window,
            equilibrium_buffer_percent,
        }
    }

    pub fn analyze(
        &self,
        candles: &CandleSeries,
        swings: &[SwingPoint],
        idm_swept: bool,
    ) -> StructureReport {
        let mut highs: Vec<SwingPoint> = swings
            .iter()
            .filter(|s| s.kind == SwingKind::High)
            .cloned()
            .collect();
        let mut lows: Vec<SwingPoint> = swings
            .iter()
            .filter(|s| s.kind == SwingKind::Low)
            .cloned()
            .collect();

        let mut events = Vec::new();
        let mut bias = Bias::Neutral;

        for i in 0..candles.len() {
            let c = &candles[i];

            // Only swings already confirmed by this candle's close are breakable.
            let target_high = highs
                .iter_mut()
                .filter(|s| !s.broken && s.confirmed_at <= c.timestamp)
                .max_by(|a, b| a.timestamp.cmp(&b.timestamp));

            if let Some(sh) = target_high {
                if c.close > sh.price {
                    sh.broken = true;
                    let level = sh.price;
                    let kind = self.classify_break(candles, i, bias, Bias::Bullish, idm_swept);
                    bias = Bias::Bullish;
                    events.push(StructureEvent {
                        kind,
                        bias,
                        level,
                        timestamp: c.timestamp,
                        timeframe: c.timeframe,
                    });
                }
            }

            let target_low = lows
                .iter_mut()
                .filter(|s| !s.broken && s.confirmed_at <= c.timestamp)
                .max_by(|a, b| a.timestamp.cmp(&b.timestamp));

            if let Some(sl) = target_low {
                if c.close < sl.price {
                    sl.broken = true;
                    let level = sl.price;
                    let kind = self.classify_break(candles, i, bias, Bias::Bearish, idm_swept);
                    bias = Bias::Bearish;
                    events.push(StructureEvent {
                        kind,
                        bias,
                        level,
                        timestamp: c.timestamp,
                        timeframe: c.timeframe,
                    });
                }
            }
        }

        let dealing_range = self.dealing_range(&highs, &lows);

        StructureReport {
            events,
            bias,
            dealing_range,
        }
    }

    fn classify_break(
        &self,
        candles: &CandleSeries,
        break_idx: usize,
        prior_bias: Bias,
        break_bias: Bias,
        idm_swept: bool,
    ) -> StructureKind {
        if prior_bias == break_bias || prior_bias == Bias::Neutral {
            return StructureKind::Bos;
        }
        if idm_swept && self.has_displacement(candles, break_idx) {
            StructureKind::Mss
        } else {
            StructureKind::Choch
        }
    }

    /// Displacement: the breaking candle's body is at least the mean body
    /// of the trailing window.
    fn has_displacement(&self, candles: &CandleSeries, idx: usize) -> bool {
        let window = candles.slice(idx.saturating_sub(self.displacement_mean_window), idx);
        if window.is_empty() {
            return false;
        }
        let mean = window.mean_body(window.len());
        candles[idx].body() >= mean
    }

    /// Range between the most recent confirmed swing high and swing low.
    fn dealing_range(&self, highs: &[SwingPoint], lows: &[SwingPoint]) -> Option<DealingRange> {
        let sh = highs.iter().max_by(|a, b| a.timestamp.cmp(&b.timestamp))?;
        let sl = lows.iter().max_by(|a, b| a.timestamp.cmp(&b.timestamp))?;
        let (high, low) = (sh.price.max(sl.price), sl.price.min(sh.price));
        let rng = high - low;
        if rng <= 0.0 {
            return None;
        }
        Some(DealingRange {
            high,
            low,
            equilibrium: low + rng * 0.5,
            buffer: rng * self.equilibrium_buffer_percent,
        })
    }
}
