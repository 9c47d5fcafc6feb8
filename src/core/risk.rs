use serde::{Deserialize, Serialize};

use crate::core::liquidity::LiquidityPool;
use crate::core::swings::SwingPoint;
use crate::models::{CandleSeries, Direction, PoolSide, SlSource, SwingKind, TpSource};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskTargets {
    pub stop_loss: f64,
    pub take_profit: f64,
    pub sl_source: SlSource,
    pub tp_source: TpSource,
    pub risk_distance: f64,
    pub reward_distance: f64,
    pub risk_reward: f64,
}

/// Structural stop placement and liquidity-based profit targets.
///
/// The stop goes beyond the most protective of the last few confirmed
/// swings on the entry side, padded by a small buffer. The target is the
/// nearest unswept pool on the profit side. Either leg falls back to an
/// ATR multiple when no structure or pool qualifies, and the fallback is
/// always labelled as such.
pub struct RiskCalculator {
    pub sl_swing_lookback: usize,
    pub sl_buffer_percent: f64,
    pub atr_period: usize,
    pub atr_sl_multiplier: f64,
    pub atr_tp_multiplier: f64,
}

impl RiskCalculator {
    pub fn new(
        sl_swing_lookback: usize,
        sl_buffer_percent: f64,
        atr_period: usize,
        atr_sl_multiplier: f64,
        atr_tp_multiplier: f64,
    ) -> Self {
        Self {
            sl_swing_lookback,
            sl_buffer_percent,
            atr_period,
            atr_sl_multiplier,
            atr_tp_multiplier,
        }
    }

    pub fn targets(
        &self,
        entry: f64,
        direction: Direction,
        swings: &[SwingPoint],
        pools: &[LiquidityPool],
        candles: &CandleSeries,
    ) -> RiskTargets {
        let atr = calc_atr(candles, self.atr_period);

        let (stop_loss, sl_source) = match self.structural_stop(entry, direction, swings) {
            Some(sl) => (sl, SlSource::Structural),
            None => {
                let sl = match direction {
                    Direction::Long => entry - atr * self.atr_sl_multiplier,
                    Direction::Short => entry + atr * self.atr_sl_multiplier,
                };
                (sl, SlSource::AtrFallback)
            }
        };

        let (take_profit, tp_source) = match self.liquidity_target(entry, direction, pools) {
            Some(tp) => (tp, TpSource::Liquidity),
            None => {
                let tp = match direction {
                    Direction::Long => entry + atr * self.atr_tp_multiplier,
                    Direction::Short => entry - atr * self.atr_tp_multiplier,
                };
                (tp, TpSource::AtrFallback)
            }
        };

        let risk_distance = (entry - stop_loss).abs();
        let reward_distance = (take_profit - entry).abs();
        let risk_reward = if risk_distance > 0.0 {
            round2(reward_distance / risk_distance)
        } else {
            0.0
        };

        RiskTargets {
            stop_loss: round2(stop_loss),
            take_profit: round2(take_profit),
            sl_source,
            tp_source,
            risk_distance: round2(risk_distance),
            reward_distance: round2(reward_distance),
            risk_reward,
        }
    }

    /// Most protective extreme among the last `sl_swing_lookback` confirmed
    /// swings on the entry side, buffered away from price.
    fn structural_stop(
        &self,
        entry: f64,
        direction: Direction,
        swings: &[SwingPoint],
    ) -> Option<f64> {
        let guard_kind = match direction {
            Direction::Long => SwingKind::Low,
            Direction::Short => SwingKind::High,
        };

        let mut candidates: Vec<&SwingPoint> = swings
            .iter()
            .filter(|s| s.kind == guard_kind)
            .filter(|s| match direction {
                Direction::Long => s.price < entry,
                Direction::Short => s.price > entry,
            })
            .collect();
        candidates.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        candidates.truncate(self.sl_swing_lookback);

        let buffer = entry * self.sl_buffer_percent;
        match direction {
            Direction::Long => candidates
                .iter()
                .map(|s| s.price)
                .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.min(p))))
                .map(|p| p - buffer),
            Direction::Short => candidates
                .iter()
                .map(|s| s.price)
                .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))))
                .map(|p| p + buffer),
        }
    }

    fn liquidity_target(
        &self,
        entry: f64,
        direction: Direction,
        pools: &[LiquidityPool],
    ) -> Option<f64> {
        let candidates = pools.iter().filter(|p| !p.swept).filter(|p| match direction {
            Direction::Long => p.side == PoolSide::Bsl && p.price > entry,
            Direction::Short => p.side == PoolSide::Ssl && p.price < entry,
        });

        match direction {
            Direction::Long => candidates
                .map(|p| p.price)
                .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.min(p)))),
            Direction::Short => candidates
                .map(|p| p.price)
                .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p)))),
        }
    }
}

pub fn calc_atr(candles: &CandleSeries, period: usize) -> f64 {
    if candles.len() < period {
        return candles.last().map_or(0.0, |c| c.high - c.low);
    }

    let mut trs: Vec<f64> = Vec::with_capacity(candles.len());
    trs.push(candles[0].high - candles[0].low);

    for i in 1..candles.len() {
        let hl = candles[i].high - candles[i].low;
        let hc = (candles[i].high - candles[i - 1].close).abs();
        let lc = (candles[i].low - candles[i - 1].close).abs();
        trs.push(hl.max(hc).max(lc));
    }

    let start = trs.len().saturating_sub(period);
    let slice = &trs[start..];
    slice.iter().sum::<f64>() / slice.len() as f64
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::liquidity::PoolKind;
    use crate::test_helpers::{base_time, make_candles};
    use crate::models::Timeframe;
    use chrono::Duration;

    fn calculator() -> RiskCalculator {
        RiskCalculator::new(3, 0.001, 14, 1.5, 3.0)
    }

    fn swing(kind: SwingKind, price: f64, minutes: i64) -> SwingPoint {
        SwingPoint {
            kind,
            price,
            timestamp: base_time() + Duration::minutes(minutes),
            timeframe: Timeframe::M15,
            index: 0,
            confirmed_at: base_time() + Duration::minutes(minutes + 45),
            broken: false,
        }
    }

    fn pool(side: PoolSide, price: f64, swept: bool) -> LiquidityPool {
        LiquidityPool {
            side,
            kind: PoolKind::EqualExtremes,
            price,
            touches: 2,
            first_touch: base_time(),
            last_touch: base_time(),
            swept,
            swept_at: None,
            strength: 0.65,
        }
    }

    fn flat_candles() -> CandleSeries {
        make_candles(&(0..20).map(|_| (100.0, 102.0, 98.0, 101.0)).collect::<Vec<_>>())
    }

    #[test]
    fn structural_stop_below_recent_lows_for_long() {
        let swings = vec![
            swing(SwingKind::Low, 96.0, 0),
            swing(SwingKind::Low, 97.5, 15),
            swing(SwingKind::Low, 98.0, 30),
        ];
        let pools = vec![pool(PoolSide::Bsl, 115.0, false)];
        let t = calculator().targets(100.0, Direction::Long, &swings, &pools, &flat_candles());

        assert_eq!(t.sl_source, SlSource::Structural);
        // Lowest of the last three lows (96.0) minus the 0.1% buffer.
        assert!((t.stop_loss - (96.0 - 0.1)).abs() < 1e-6);
        assert_eq!(t.tp_source, TpSource::Liquidity);
        assert!((t.take_profit - 115.0).abs() < 1e-6);
        assert!(t.risk_reward > 1.0);
    }

    #[test]
    fn only_recent_swings_count_for_the_stop() {
        // Four lows; the oldest (deepest) must be ignored with lookback 3.
        let swings = vec![
            swing(SwingKind::Low, 80.0, 0), // too old
            swing(SwingKind::Low, 96.0, 15),
            swing(SwingKind::Low, 97.5, 30),
            swing(SwingKind::Low, 98.0, 45),
        ];
        let t = calculator().targets(100.0, Direction::Long, &swings, &[], &flat_candles());
        assert!((t.stop_loss - (96.0 - 0.1)).abs() < 1e-6);
    }

    #[test]
    fn atr_fallback_when_no_structure() {
        let t = calculator().targets(100.0, Direction::Long, &[], &[], &flat_candles());
        assert_eq!(t.sl_source, SlSource::AtrFallback);
        assert_eq!(t.tp_source, TpSource::AtrFallback);
        assert!(t.stop_loss < 100.0);
        assert!(t.take_profit > 100.0);
    }

    #[test]
    fn short_stop_above_recent_highs() {
        let swings = vec![
            swing(SwingKind::High, 104.0, 0),
            swing(SwingKind::High, 103.0, 15),
        ];
        let pools = vec![pool(PoolSide::Ssl, 88.0, false)];
        let t = calculator().targets(100.0, Direction::Short, &swings, &pools, &flat_candles());
        assert_eq!(t.sl_source, SlSource::Structural);
        assert!((t.stop_loss - (104.0 + 0.1)).abs() < 1e-6);
        assert!((t.take_profit - 88.0).abs() < 1e-6);
    }

    #[test]
    fn swept_pools_never_become_targets() {
        let pools = vec![
            pool(PoolSide::Bsl, 110.0, true),
            pool(PoolSide::Bsl, 120.0, false),
        ];
        let t = calculator().targets(100.0, Direction::Long, &[], &pools, &flat_candles());
        assert!((t.take_profit - 120.0).abs() < 1e-6);
    }

    #[test]
    fn atr_uses_last_range_for_short_series() {
        let candles = make_candles(&[(100.0, 105.0, 95.0, 102.0)]);
        assert!((calc_atr(&candles, 14) - 10.0).abs() < 1e-9);
    }
}
