use chrono::{DateTime, Duration, Utc};

use smc_trading_engine::config::EngineConfig;
use smc_trading_engine::models::{Candle, Timeframe};

pub fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .map(|t| t.with_timezone(&Utc))
        .unwrap()
}

/// Candles from (open, high, low, close) tuples, spaced one timeframe
/// apart and ending exactly at `end`.
pub fn candles_ending_at(
    tf: Timeframe,
    end: DateTime<Utc>,
    data: &[(f64, f64, f64, f64)],
) -> Vec<Candle> {
    let step = Duration::seconds(tf.as_seconds() as i64);
    let n = data.len() as i64;
    data.iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| Candle {
            timestamp: end - step * (n - 1 - i as i64) as i32,
            open: o,
            high: h,
            low: l,
            close: c,
            timeframe: tf,
        })
        .collect()
}

/// Swing high at 105, pullback into a swing low at 98, then a
/// displacement close through the high. Produces a confirmed bullish
/// structure break under default detector settings.
pub fn bullish_break_data() -> Vec<(f64, f64, f64, f64)> {
    vec![
        (100.0, 101.0, 99.0, 100.5),
        (100.5, 103.0, 100.0, 102.5),
        (102.5, 105.0, 102.0, 104.5), // swing high 105
        (104.5, 104.8, 101.0, 101.5),
        (101.5, 102.0, 99.5, 100.0),
        (100.0, 100.5, 98.0, 98.5), // swing low 98
        (98.5, 100.0, 98.2, 99.5),
        (99.5, 102.0, 99.0, 101.5),
        (101.5, 106.0, 101.0, 105.8), // body close through 105
        (105.8, 107.0, 105.0, 106.5),
    ]
}

/// Flat candles that produce no structure at all.
pub fn flat_data(n: usize) -> Vec<(f64, f64, f64, f64)> {
    (0..n).map(|_| (100.0, 100.5, 99.5, 100.0)).collect()
}

pub fn test_config() -> EngineConfig {
    let mut cfg = EngineConfig::from_env();
    cfg.symbol = "TEST-USD".to_string();
    cfg.htf = Timeframe::H4;
    cfg.ltf = Timeframe::M15;
    cfg.log_level = "ERROR".to_string();
    cfg
}
