use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::swings::SwingPoint;
use crate::models::{CandleSeries, Direction, SwingKind};

pub mod reason {
    pub const PENDING: &str = "idm_pending";
    pub const SWEPT: &str = "idm_swept";
    pub const WRONG_WAY_BREAK: &str = "idm_wrong_way_break";
}

/// An inducement level: the minor pullback extreme that retail stops
/// cluster behind. Price is expected to sweep it before the real move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inducement {
    /// Trade direction this inducement guards. A long setup is induced by
    /// a sweep of the pullback low below price.
    pub direction: Direction,
    pub level: f64,
    pub timestamp: DateTime<Utc>,
    /// No sweep may be credited from candles closed before this moment.
    pub confirmed_at: DateTime<Utc>,
    pub swept: bool,
    pub swept_at: Option<DateTime<Utc>>,
    /// A body close through the level instead of a wick rejection. The
    /// inducement is dead and the setup premise with it.
    pub violated: bool,
    pub reason_code: &'static str,
}

/// Identifies the active inducement and validates its sweep.
///
/// A sweep is strictly directional: for a long inducement the candle must
/// wick below the level and close back above it. A close beyond the level
/// is a break, not a sweep, and permanently retires the inducement. Once
/// swept the flag never un-sets.
pub struct InducementDetector;

impl InducementDetector {
    pub fn new() -> Self {
        Self
    }

    /// The most recent confirmed minor swing against the setup direction.
    pub fn identify(&self, swings: &[SwingPoint], direction: Direction) -> Option<Inducement> {
        let guard_kind = match direction {
            Direction::Long => SwingKind::Low,
            Direction::Short => SwingKind::High,
        };

        let swing = swings
            .iter()
            .filter(|s| s.kind == guard_kind)
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp))?;

        Some(Inducement {
            direction,
            level: swing.price,
            timestamp: swing.timestamp,
            confirmed_at: swing.confirmed_at,
            swept: false,
            swept_at: None,
            violated: false,
            reason_code: reason::PENDING,
        })
    }

    /// Scan candles after the inducement's confirmation for a sweep or a
    /// violating break. Does nothing once the inducement is resolved.
    pub fn check_sweep(&self, idm: &mut Inducement, candles: &CandleSeries) {
        if idm.swept || idm.violated {
            return;
        }

        for c in candles.iter().filter(|c| c.timestamp > idm.confirmed_at) {
            match idm.direction {
                Direction::Long => {
                    if c.low < idm.level {
                        if c.close > idm.level {
                            idm.swept = true;
                            idm.swept_at = Some(c.timestamp);
                            idm.reason_code = reason::SWEPT;
                        } else {
                            idm.violated = true;
                            idm.reason_code = reason::WRONG_WAY_BREAK;
                        }
                        return;
                    }
                }
                Direction::Short => {
                    if c.high > idm.level {
                        if c.close < idm.level {
                            idm.swept = true;
                            idm.swept_at = Some(c.timestamp);
                            idm.reason_code = reason::SWEPT;
                        } else {
                            idm.violated = true;
                            idm.reason_code = reason::WRONG_WAY_BREAK;
                        }
                        return;
                    }
                }
            }
        }
    }
}

impl Default for InducementDetector {
    fn default() -> Self {
        Self::new()
    }
}
