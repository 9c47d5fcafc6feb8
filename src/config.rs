use crate::models::Timeframe;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type SharedConfig = Arc<RwLock<EngineConfig>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTime {
    pub start: (u32, u32),
    pub end: (u32, u32),
}

/// Component weights for the 0-100 zone strength score.
///
/// Defaults sum to 100; the score is monotone in the number of
/// confluences present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneStrengthWeights {
    pub base: f64,
    pub adjacent_fvg: f64,
    pub htf_alignment: f64,
    pub liquidity_proximity: f64,
}

impl Default for ZoneStrengthWeights {
    fn default() -> Self {
        Self {
            base: 40.0,
            adjacent_fvg: 25.0,
            htf_alignment: 20.0,
            liquidity_proximity: 15.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub symbol: String,

    // Timeframes
    pub htf: Timeframe,
    pub ltf: Timeframe,

    // Swing detection
    pub swing_lookback: usize,
    pub swing_confirmation_lag: usize,

    // Dealing range
    pub equilibrium_buffer_percent: f64,

    // POI detection
    pub ob_lookback: usize,
    pub displacement_mean_window: usize,
    pub fvg_min_gap_percent: f64,
    pub zone_strength: ZoneStrengthWeights,
    pub liquidity_proximity_percent: f64,

    // Liquidity pools
    pub equal_level_tolerance_percent: f64,
    pub min_pool_touches: usize,

    // Entry thresholds
    pub type1_min_strength: f64,
    pub type2_min_strength: f64,
    pub max_positions_per_direction: usize,

    // Risk
    pub sl_swing_lookback: usize,
    pub sl_buffer_percent: f64,
    pub atr_period: usize,
    pub atr_sl_multiplier: f64,
    pub atr_tp_multiplier: f64,

    // Data freshness (multiples of the timeframe duration)
    pub staleness_multiplier: u32,

    // Sessions (stored as (hour, minute) ET pairs)
    pub sessions: HashMap<String, SessionTime>,
    /// Session names in which entries are allowed.
    pub killzones: Vec<String>,

    // Driver
    pub poll_interval_secs: u64,

    // Logging
    pub log_level: String,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };

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
            symbol: env("SYMBOL", "XAU-USD"),
            htf: Timeframe::from_str_loose(&env("HTF", "4h")).unwrap_or(Timeframe::H4),
            ltf: Timeframe::from_str_loose(&env("LTF", "15m")).unwrap_or(Timeframe::M15),
            swing_lookback: env("SWING_LOOKBACK", "2").parse().unwrap_or(2),
            swing_confirmation_lag: env("SWING_CONFIRMATION_LAG", "1").parse().unwrap_or(1),
            equilibrium_buffer_percent: env("EQ_BUFFER_PCT", "0.02").parse().unwrap_or(0.02),
            ob_lookback: env("OB_LOOKBACK", "30").parse().unwrap_or(30),
            displacement_mean_window: 20,
            fvg_min_gap_percent: env("FVG_MIN_GAP", "0.0005").parse().unwrap_or(0.0005),
            zone_strength: ZoneStrengthWeights::default(),
            liquidity_proximity_percent: 0.005,
            equal_level_tolerance_percent: env("EQUAL_LEVEL_TOL", "0.0008")
                .parse()
                .unwrap_or(0.0008),
            min_pool_touches: 2,
            type1_min_strength: env("TYPE1_MIN_STRENGTH", "70").parse().unwrap_or(70.0),
            type2_min_strength: env("TYPE2_MIN_STRENGTH", "30").parse().unwrap_or(30.0),
            max_positions_per_direction: env("MAX_POSITIONS_PER_DIRECTION", "1")
                .parse()
                .unwrap_or(1),
            sl_swing_lookback: 3,
            sl_buffer_percent: env("SL_BUFFER_PCT", "0.001").parse().unwrap_or(0.001),
            atr_period: env("ATR_PERIOD", "14").parse().unwrap_or(14),
            atr_sl_multiplier: 1.5,
            atr_tp_multiplier: 3.0,
            staleness_multiplier: env("STALENESS_MULTIPLIER", "2").parse().unwrap_or(2),
            sessions,
            killzones: env("KILLZONES", "london,ny_am,ny_pm")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            poll_interval_secs: env("POLL_INTERVAL_SECS", "30").parse().unwrap_or(30),
            log_level: env("LOG_LEVEL", "INFO"),
        }
    }

    pub fn shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }
}
