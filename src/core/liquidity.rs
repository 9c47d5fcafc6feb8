use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::core::swings::SwingPoint;
use crate::models::{CandleSeries, Direction, PoolSide, SwingKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    /// Cluster of near-equal swing extremes.
    EqualExtremes,
    /// Single unclustered swing point.
    SwingPoint,
    /// Previous-day high or low.
    PreviousDay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityPool {
    pub side: PoolSide,
    pub kind: PoolKind,
    pub price: f64,
    pub touches: usize,
    pub first_touch: DateTime<Utc>,
    pub last_touch: DateTime<Utc>,
    pub swept: bool,
    pub swept_at: Option<DateTime<Utc>>,
    pub strength: f64,
}

impl LiquidityPool {
    /// External pools are the draw for the narrative's sweep stage:
    /// previous-day extremes and multi-touch equal-extreme clusters.
    pub fn is_external(&self) -> bool {
        matches!(self.kind, PoolKind::PreviousDay | PoolKind::EqualExtremes)
    }
}

/// Resting-liquidity mapping from confirmed swings plus the prior day's
/// extremes.
pub struct LiquidityMapper {
    pub equal_level_tolerance_percent: f64,
    pub min_pool_touches: usize,
}

impl LiquidityMapper {
    pub fn new(equal_level_tolerance_percent: f64, min_pool_touches: usize) -> Self {
        Self {
            equal_level_tolerance_percent,
            min_pool_touches,
        }
    }

    pub fn detect_pools(&self, candles: &CandleSeries, swings: &[SwingPoint]) -> Vec<LiquidityPool> {
        let mut pools = Vec::new();

        let highs: Vec<&SwingPoint> = swings.iter().filter(|s| s.kind == SwingKind::High).collect();
        let lows: Vec<&SwingPoint> = swings.iter().filter(|s| s.kind == SwingKind::Low).collect();

        pools.extend(self.cluster(&highs, PoolSide::Bsl, candles));
        pools.extend(self.cluster(&lows, PoolSide::Ssl, candles));

        // Unclustered swing points are single-touch pools.
        for s in &highs {
            if !self.near_existing(&pools, PoolSide::Bsl, s.price) {
                pools.push(self.single(s, PoolSide::Bsl, candles));
            }
        }
        for s in &lows {
            if !self.near_existing(&pools, PoolSide::Ssl, s.price) {
                pools.push(self.single(s, PoolSide::Ssl, candles));
            }
        }

        pools.extend(self.previous_day_pools(candles));

        pools.sort_by(|a, b| b.strength.partial_cmp(&a.strength).unwrap_or(std::cmp::Ordering::Equal));
        pools
    }

    /// Nearest unswept pool on the profit side of the trade.
    pub fn nearest_target<'a>(
        &self,
        pools: &'a [LiquidityPool],
        current_price: f64,
        direction: Direction,
    ) -> Option<&'a LiquidityPool> {
        let candidates = pools.iter().filter(|p| !p.swept).filter(|p| match direction {
            Direction::Long => p.side == PoolSide::Bsl && p.price > current_price,
            Direction::Short => p.side == PoolSide::Ssl && p.price < current_price,
        });

        match direction {
            Direction::Long => candidates.min_by(|a, b| {
                a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal)
            }),
            Direction::Short => candidates.max_by(|a, b| {
                a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal)
            }),
        }
    }

    /// The most recently swept external pool, if any.
    pub fn latest_external_sweep<'a>(&self, pools: &'a [LiquidityPool]) -> Option<&'a LiquidityPool> {
        pools
            .iter()
            .filter(|p| p.swept && p.is_external())
            .max_by_key(|p| p.swept_at)
    }

    fn near_existing(&self, pools: &[LiquidityPool], side: PoolSide, price: f64) -> bool {
        pools.iter().any(|p| {
            p.side == side && (p.price - price).abs() / price < self.equal_level_tolerance_percent * 2.0
        })
    }

    fn single(&self, s: &SwingPoint, side: PoolSide, candles: &CandleSeries) -> LiquidityPool {
        let (swept, swept_at) = self.sweep_state(side, s.price, s.timestamp, candles);
        LiquidityPool {
            side,
            kind: PoolKind::SwingPoint,
            price: s.price,
            touches: 1,
            first_touch: s.timestamp,
            last_touch: s.timestamp,
            swept,
            swept_at,
            strength: 0.3,
        }
    }

    fn cluster(
        &self,
        levels: &[&SwingPoint],
        side: PoolSide,
        candles: &CandleSeries,
    ) -> Vec<LiquidityPool> {
        if levels.len() < self.min_pool_touches {
            return Vec::new();
        }

        let mut pools = Vec::new();
        let mut used = vec![false; levels.len()];

        for i in 0..levels.len() {
            if used[i] {
                continue;
            }

            let mut prices = vec![levels[i].price];
            let mut times = vec![levels[i].timestamp];
            used[i] = true;

            for j in (i + 1)..levels.len() {
                if used[j] {
                    continue;
                }
                let avg = prices.iter().sum::<f64>() / prices.len() as f64;
                if (levels[j].price - avg).abs() / avg < self.equal_level_tolerance_percent {
                    prices.push(levels[j].price);
                    times.push(levels[j].timestamp);
                    used[j] = true;
                }
            }

            if prices.len() >= self.min_pool_touches {
                let avg = prices.iter().sum::<f64>() / prices.len() as f64;
                let first = *times.iter().min().unwrap();
                let last = *times.iter().max().unwrap();
                let touches = prices.len();
                let (swept, swept_at) = self.sweep_state(side, avg, last, candles);

                // More touches, stronger pool.
                let strength = (0.5 + 0.15 * (touches as f64 - 1.0)).min(1.0);

                pools.push(LiquidityPool {
                    side,
                    kind: PoolKind::EqualExtremes,
                    price: round2(avg),
                    touches,
                    first_touch: first,
                    last_touch: last,
                    swept,
                    swept_at,
                    strength,
                });
            }
        }

        pools
    }

    /// PDH/PDL from a daily partition of the series. The prior calendar
    /// day (UTC) supplies one BSL and one SSL pool.
    fn previous_day_pools(&self, candles: &CandleSeries) -> Vec<LiquidityPool> {
        let today = match candles.last() {
            Some(c) => c.timestamp.date_naive(),
            None => return Vec::new(),
        };

        let prev_day: Vec<_> = candles
            .iter()
            .filter(|c| {
                let d = c.timestamp.date_naive();
                d < today && d.num_days_from_ce() == today.num_days_from_ce() - 1
            })
            .collect();

        if prev_day.is_empty() {
            return Vec::new();
        }

        let pdh = prev_day.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let pdl = prev_day.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let last_ts = prev_day.last().map(|c| c.timestamp).unwrap_or_default();
        let first_ts = prev_day.first().map(|c| c.timestamp).unwrap_or_default();

        let (pdh_swept, pdh_swept_at) = self.sweep_state(PoolSide::Bsl, pdh, last_ts, candles);
        let (pdl_swept, pdl_swept_at) = self.sweep_state(PoolSide::Ssl, pdl, last_ts, candles);

        vec![
            LiquidityPool {
                side: PoolSide::Bsl,
                kind: PoolKind::PreviousDay,
                price: pdh,
                touches: 1,
                first_touch: first_ts,
                last_touch: last_ts,
                swept: pdh_swept,
                swept_at: pdh_swept_at,
                strength: 0.9,
            },
            LiquidityPool {
                side: PoolSide::Ssl,
                kind: PoolKind::PreviousDay,
                price: pdl,
                touches: 1,
                first_touch: first_ts,
                last_touch: last_ts,
                swept: pdl_swept,
                swept_at: pdl_swept_at,
                strength: 0.9,
            },
        ]
    }

    fn sweep_state(
        &self,
        side: PoolSide,
        level: f64,
        after: DateTime<Utc>,
        candles: &CandleSeries,
    ) -> (bool, Option<DateTime<Utc>>) {
        let hit = candles.iter().find(|c| {
            c.timestamp > after
                && match side {
                    PoolSide::Bsl => c.high > level,
                    PoolSide::Ssl => c.low < level,
                }
        });
        match hit {
            Some(c) => (true, Some(c.timestamp)),
            None => (false, None),
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::swings::SwingDetector;
    use crate::test_helpers::{base_time, make_candles};
    use chrono::Duration;
    use crate::models::{Candle, Timeframe};

    fn mapper() -> LiquidityMapper {
        LiquidityMapper::new(0.0008, 2)
    }

    fn detect(candles: &CandleSeries) -> Vec<LiquidityPool> {
        let swings = SwingDetector::new(2, 1).detect(candles);
        mapper().detect_pools(candles, &swings)
    }

    /// Two peaks at almost exactly the same level.
    fn equal_highs_series() -> CandleSeries {
        let mut data = Vec::new();
        for i in 0..4 {
            let v = 100.0 + i as f64 * 2.5;
            data.push((v, v + 0.5, v - 0.5, v));
        }
        data.push((110.0, 110.02, 109.5, 109.8)); // first peak
        for i in 0..4 {
            let v = 107.5 - i as f64 * 2.5;
            data.push((v, v + 0.5, v - 0.5, v));
        }
        for i in 0..4 {
            let v = 100.6 + i as f64 * 2.5;
            data.push((v, v + 0.5, v - 0.5, v));
        }
        data.push((110.0, 110.03, 109.5, 109.7)); // second peak
        for i in 0..6 {
            let v = 107.5 - i as f64 * 2.5;
            data.push((v, v + 0.5, v - 0.5, v));
        }
        make_candles(&data)
    }

    #[test]
    fn equal_highs_cluster_into_bsl_pool() {
        let pools = detect(&equal_highs_series());
        let cluster = pools
            .iter()
            .find(|p| p.side == PoolSide::Bsl && p.kind == PoolKind::EqualExtremes);
        assert!(cluster.is_some(), "pools: {:?}", pools.iter().map(|p| (p.side, p.kind, p.price, p.touches)).collect::<Vec<_>>());
        assert!(cluster.unwrap().touches >= 2);
    }

    #[test]
    fn pool_strength_grows_with_touches() {
        let pools = detect(&equal_highs_series());
        let cluster = pools
            .iter()
            .find(|p| p.kind == PoolKind::EqualExtremes)
            .unwrap();
        let single = pools
            .iter()
            .find(|p| p.kind == PoolKind::SwingPoint)
            .unwrap();
        assert!(cluster.strength > single.strength);
    }

    #[test]
    fn previous_day_extremes_become_pools() {
        // One full day of candles, then a candle the next day.
        let base = base_time();
        let mut candles = Vec::new();
        for i in 0..4 {
            candles.push(Candle {
                timestamp: base + Duration::hours(i * 3),
                open: 100.0,
                high: 108.0 + i as f64,
                low: 92.0 - i as f64,
                close: 101.0,
                timeframe: Timeframe::H4,
            });
        }
        candles.push(Candle {
            timestamp: base + Duration::days(1),
            open: 101.0,
            high: 103.0,
            low: 99.0,
            close: 102.0,
            timeframe: Timeframe::H4,
        });
        let series = CandleSeries::new(candles);
        let pools = mapper().detect_pools(&series, &[]);

        let pdh = pools.iter().find(|p| p.kind == PoolKind::PreviousDay && p.side == PoolSide::Bsl);
        let pdl = pools.iter().find(|p| p.kind == PoolKind::PreviousDay && p.side == PoolSide::Ssl);
        assert!((pdh.unwrap().price - 111.0).abs() < 1e-9);
        assert!((pdl.unwrap().price - 89.0).abs() < 1e-9);
        assert!(!pdh.unwrap().swept);
    }

    #[test]
    fn nearest_target_skips_swept_pools() {
        let now = base_time();
        let pool = |side, price, swept| LiquidityPool {
            side,
            kind: PoolKind::EqualExtremes,
            price,
            touches: 2,
            first_touch: now,
            last_touch: now,
            swept,
            swept_at: if swept { Some(now) } else { None },
            strength: 0.65,
        };
        let pools = vec![
            pool(PoolSide::Bsl, 105.0, true),
            pool(PoolSide::Bsl, 115.0, false),
            pool(PoolSide::Ssl, 90.0, false),
        ];
        let m = mapper();

        let long_target = m.nearest_target(&pools, 100.0, Direction::Long).unwrap();
        assert!((long_target.price - 115.0).abs() < 1e-9);

        let short_target = m.nearest_target(&pools, 100.0, Direction::Short).unwrap();
        assert!((short_target.price - 90.0).abs() < 1e-9);
    }

    #[test]
    fn latest_external_sweep_prefers_most_recent() {
        let now = base_time();
        let mut early = LiquidityPool {
            side: PoolSide::Bsl,
            kind: PoolKind::PreviousDay,
            price: 110.0,
            touches: 1,
            first_touch: now,
            last_touch: now,
            swept: true,
            swept_at: Some(now),
            strength: 0.9,
        };
        let mut late = early.clone();
        late.side = PoolSide::Ssl;
        late.price = 90.0;
        late.swept_at = Some(now + Duration::hours(2));
        early.swept_at = Some(now + Duration::hours(1));

        let pools = vec![early, late];
        let latest = mapper().latest_external_sweep(&pools).unwrap();
        assert_eq!(latest.side, PoolSide::Ssl);
    }
}
