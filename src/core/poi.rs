use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ZoneStrengthWeights;
use crate::models::{Bias, BlockClass, CandleSeries, Direction, Timeframe};

/// Canonical reason codes carried on POIs and surfaced in observation
/// records.
pub mod reason {
    pub const DECISION_ZONE: &str = "decision_zone";
    pub const EXTREME_ZONE: &str = "extreme_zone";
    pub const MID_RANGE_TRAP: &str = "mid_range_trap";
    pub const INVALIDATED: &str = "invalidated";
    pub const ALREADY_MITIGATED: &str = "already_mitigated";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poi {
    pub direction: Direction,
    pub high: f64,
    pub low: f64,
    pub midpoint: f64,
    pub timestamp: DateTime<Utc>,
    pub timeframe: Timeframe,
    pub block_class: BlockClass,
    pub zone_strength: f64,
    pub has_adjacent_fvg: bool,
    pub mitigated: bool,
    pub invalidated: bool,
    pub permission_to_trade: bool,
    pub reason_code: &'static str,
}

/// Order-block detection and hierarchy classification.
///
/// The hierarchy is re-derived from the full block set every cycle, never
/// patched incrementally: for bullish blocks the highest unmitigated one is
/// DECISION, the lowest is EXTREME and everything between is a TRAP with
/// permission withheld. Bearish blocks invert. Equidistant candidates
/// resolve by price first, then by the earlier formation time.
pub struct PoiIdentifier {
    pub ob_lookback: usize,
    pub displacement_mean_window: usize,
    pub fvg_min_gap_percent: f64,
    pub weights: ZoneStrengthWeights,
    pub liquidity_proximity_percent: f64,
}

impl PoiIdentifier {
    pub fn new(
        ob_lookback: usize,
        displacement_mean_window: usize,
        fvg_min_gap_percent: f64,
        weights: ZoneStrengthWeights,
        liquidity_proximity_percent: f64,
    ) -> Self {
        Self {
            ob_lookback,
            displacement_mean_window,
            fvg_min_gap_percent,
            weights,
            liquidity_proximity_percent,
        }
    }

    /// Full POI set for the series, classified and scored.
    ///
    /// `htf_bias` and `liquidity_levels` only feed the confluence score;
    /// detection itself is purely price-driven.
    pub fn identify(
        &self,
        candles: &CandleSeries,
        htf_bias: Bias,
        liquidity_levels: &[f64],
    ) -> Vec<Poi> {
        let mut pois = self.detect_blocks(candles);
        self.classify_hierarchy(&mut pois);
        for poi in &mut pois {
            poi.zone_strength = self.score(poi, htf_bias, liquidity_levels);
        }
        pois
    }

    /// Order blocks: the last opposite-direction candle before a
    /// displacement move that closes beyond it. The displacement candle
    /// body must be at least the mean body of the trailing window,
    /// otherwise the impulse is noise and no block is recorded.
    fn detect_blocks(&self, candles: &CandleSeries) -> Vec<Poi> {
        let len = candles.len();
        let mut pois = Vec::new();
        if len < 3 {
            return pois;
        }

        let start = len.saturating_sub(self.ob_lookback).max(1);

        for idx in start..len {
            let prev = &candles[idx - 1];
            let curr = &candles[idx];

            let mean = candles
                .slice(idx.saturating_sub(self.displacement_mean_window), idx)
                .mean_body(self.displacement_mean_window);
            let displaced = curr.body() >= mean && mean > 0.0;

            // Bullish OB: down candle, then displacement up through its high.
            if prev.is_bearish() && curr.is_bullish() && curr.close > prev.high && displaced {
                let after = candles.slice(idx + 1, len);
                pois.push(self.build_poi(
                    Direction::Long,
                    prev.high,
                    prev.low,
                    prev.timestamp,
                    prev.timeframe,
                    self.bullish_fvg_adjacent(candles, idx),
                    &after,
                ));
            }

            // Bearish OB: up candle, then displacement down through its low.
            if prev.is_bullish() && curr.is_bearish() && curr.close < prev.low && displaced {
                let after = candles.slice(idx + 1, len);
                pois.push(self.build_poi(
                    Direction::Short,
                    prev.high,
                    prev.low,
                    prev.timestamp,
                    prev.timeframe,
                    self.bearish_fvg_adjacent(candles, idx),
                    &after,
                ));
            }
        }

        pois
    }

    fn build_poi(
        &self,
        direction: Direction,
        high: f64,
        low: f64,
        timestamp: DateTime<Utc>,
        timeframe: Timeframe,
        has_adjacent_fvg: bool,
        after: &CandleSeries,
    ) -> Poi {
        let midpoint = (high + low) / 2.0;

        // Mitigation: a later close into the deep half of the zone.
        // Invalidation: a later body close through the far boundary.
        let (mitigated, invalidated) = match direction {
            Direction::Long => (
                after.any_close_below(midpoint),
                after.any_close_below(low),
            ),
            Direction::Short => (
                after.any_close_above(midpoint),
                after.any_close_above(high),
            ),
        };

        Poi {
            direction,
            high,
            low,
            midpoint,
            timestamp,
            timeframe,
            block_class: BlockClass::Trap,
            zone_strength: 0.0,
            has_adjacent_fvg,
            mitigated,
            invalidated,
            permission_to_trade: false,
            reason_code: reason::MID_RANGE_TRAP,
        }
    }

    /// FVG adjacency for a bullish OB at `idx - 1` with displacement at
    /// `idx`: the candle after the displacement leaves a gap above the
    /// block candle's high.
    fn bullish_fvg_adjacent(&self, candles: &CandleSeries, idx: usize) -> bool {
        match candles.get(idx + 1) {
            Some(next) => {
                let gap = next.low - candles[idx - 1].high;
                gap > 0.0 && gap / candles[idx - 1].high >= self.fvg_min_gap_percent
            }
            None => false,
        }
    }

    fn bearish_fvg_adjacent(&self, candles: &CandleSeries, idx: usize) -> bool {
        match candles.get(idx + 1) {
            Some(next) => {
                let gap = candles[idx - 1].low - next.high;
                gap > 0.0 && gap / candles[idx - 1].low >= self.fvg_min_gap_percent
            }
            None => false,
        }
    }

    fn classify_hierarchy(&self, pois: &mut [Poi]) {
        self.classify_side(pois, Direction::Long);
        self.classify_side(pois, Direction::Short);
    }

    fn classify_side(&self, pois: &mut [Poi], direction: Direction) {
        let mut live: Vec<usize> = pois
            .iter()
            .enumerate()
            .filter(|(_, p)| p.direction == direction)
            .map(|(i, _)| i)
            .collect();

        // Invalidated and mitigated blocks drop out of the ranking first.
        live.retain(|&i| {
            if pois[i].invalidated {
                pois[i].block_class = BlockClass::Invalid;
                pois[i].permission_to_trade = false;
                pois[i].reason_code = reason::INVALIDATED;
                false
            } else if pois[i].mitigated {
                pois[i].block_class = BlockClass::Invalid;
                pois[i].permission_to_trade = false;
                pois[i].reason_code = reason::ALREADY_MITIGATED;
                false
            } else {
                true
            }
        });

        if live.is_empty() {
            return;
        }

        // Total order: price, then formation time (earlier wins ties).
        let by_price = |&a: &usize, &b: &usize| {
            pois[a]
                .midpoint
                .partial_cmp(&pois[b].midpoint)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(pois[a].timestamp.cmp(&pois[b].timestamp))
        };

        let (decision_idx, extreme_idx) = match direction {
            // Bullish demand: nearest (highest) block decides, the deepest
            // (lowest) is the extreme origin.
            Direction::Long => (
                *live.iter().max_by(|a, b| by_price(a, b)).unwrap_or(&live[0]),
                *live.iter().min_by(|a, b| by_price(a, b)).unwrap_or(&live[0]),
            ),
            Direction::Short => (
                *live.iter().min_by(|a, b| by_price(a, b)).unwrap_or(&live[0]),
                *live.iter().max_by(|a, b| by_price(a, b)).unwrap_or(&live[0]),
            ),
        };

        for &i in &live {
            if i == decision_idx {
                pois[i].block_class = BlockClass::Decision;
                pois[i].permission_to_trade = true;
                pois[i].reason_code = reason::DECISION_ZONE;
            } else if i == extreme_idx {
                pois[i].block_class = BlockClass::Extreme;
                pois[i].permission_to_trade = true;
                pois[i].reason_code = reason::EXTREME_ZONE;
            } else {
                pois[i].block_class = BlockClass::Trap;
                pois[i].permission_to_trade = false;
                pois[i].reason_code = reason::MID_RANGE_TRAP;
            }
        }
    }

    /// 0-100 confluence score, monotone in the confluences present.
    fn score(&self, poi: &Poi, htf_bias: Bias, liquidity_levels: &[f64]) -> f64 {
        if poi.block_class == BlockClass::Invalid {
            return 0.0;
        }

        let mut score = self.weights.base;
        if poi.has_adjacent_fvg {
            score += self.weights.adjacent_fvg;
        }
        if htf_bias.matches(poi.direction) {
            score += self.weights.htf_alignment;
        }
        let near_liquidity = liquidity_levels.iter().any(|&level| {
            (level - poi.midpoint).abs() / poi.midpoint <= self.liquidity_proximity_percent
        });
        if near_liquidity {
            score += self.weights.liquidity_proximity;
        }

        score.min(100.0)
    }
}
