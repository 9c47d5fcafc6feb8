use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::config::{EngineConfig, SessionTime, ZoneStrengthWeights};
use crate::models::{Candle, CandleSeries, Timeframe};

pub fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Create candles from (open, high, low, close) tuples with auto-incrementing
/// timestamps at the given timeframe's spacing.
pub fn make_candles_tf(tf: Timeframe, data: &[(f64, f64, f64, f64)]) -> CandleSeries {
    let base = base_time();
    let step = tf.as_seconds() as i64;

    let candles: Vec<Candle> = data
        .iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| Candle {
            timestamp: base + Duration::seconds(i as i64 * step),
            open: o,
            high: h,
            low: l,
            close: c,
            timeframe: tf,
        })
        .collect();

    CandleSeries::new(candles)
}

/// 15m candles from (open, high, low, close) tuples.
pub fn make_candles(data: &[(f64, f64, f64, f64)]) -> CandleSeries {
    make_candles_tf(Timeframe::M15, data)
}

/// Create n rising (bullish) candles starting from `start` price.
pub fn make_bullish_trend(n: usize, start: f64) -> CandleSeries {
    let base = base_time();

    let candles: Vec<Candle> = (0..n)
        .map(|i| {
            let open = start + i as f64 * 10.0;
            let close = open + 8.0;
            Candle {
                timestamp: base + Duration::minutes(15 * i as i64),
                open,
                high: close + 2.0,
                low: open - 1.0,
                close,
                timeframe: Timeframe::M15,
            }
        })
        .collect();

    CandleSeries::new(candles)
}

/// Create n falling (bearish) candles starting from `start` price.
pub fn make_bearish_trend(n: usize, start: f64) -> CandleSeries {
    let base = base_time();

    let candles: Vec<Candle> = (0..n)
        .map(|i| {
            let open = start - i as f64 * 10.0;
            let close = open - 8.0;
            Candle {
                timestamp: base + Duration::minutes(15 * i as i64),
                open,
                high: open + 1.0,
                low: close - 2.0,
                close,
                timeframe: Timeframe::M15,
            }
        })
        .collect();

    CandleSeries::new(candles)
}

/// An EngineConfig suitable for testing — no env access needed.
pub fn default_test_config() -> EngineConfig {
    let mut sessions = HashMap::new();
    sessions.insert(
        "asian".to_string(),
        SessionTime {
            start: (20, 0),
            end: (0, 0),
        },
    );
    sessions.insert(
        "london".to_string(),
        SessionTime {
            start: (2, 0),
            end: (5, 0),
        },
    );
    sessions.insert(
        "ny_am".to_string(),
        SessionTime {
            start: (7, 0),
            end: (10, 0),
        },
    );
    sessions.insert(
        "ny_pm".to_string(),
        SessionTime {
            start: (13, 30),
            end: (16, 0),
        },
    );

    EngineConfig {
        symbol: "XAU-USD".to_string(),
        htf: Timeframe::H4,
        ltf: Timeframe::M15,
        swing_lookback: 2,
        swing_confirmation_lag: 1,
        equilibrium_buffer_percent: 0.02,
        ob_lookback: 30,
        displacement_mean_window: 20,
        fvg_min_gap_percent: 0.0005,
        zone_strength: ZoneStrengthWeights::default(),
        liquidity_proximity_percent: 0.005,
        equal_level_tolerance_percent: 0.0008,
        min_pool_touches: 2,
        type1_min_strength: 70.0,
        type2_min_strength: 30.0,
        max_positions_per_direction: 1,
        sl_swing_lookback: 3,
        sl_buffer_percent: 0.001,
        atr_period: 14,
        atr_sl_multiplier: 1.5,
        atr_tp_multiplier: 3.0,
        staleness_multiplier: 2,
        sessions,
        killzones: vec![
            "london".to_string(),
            "ny_am".to_string(),
            "ny_pm".to_string(),
        ],
        poll_interval_secs: 30,
        log_level: "ERROR".to_string(),
    }
}
