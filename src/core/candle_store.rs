use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::models::{Candle, CandleSeries, Timeframe};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("out-of-order candle on {timeframe}: {incoming} <= {last}")]
    OutOfOrder {
        timeframe: Timeframe,
        incoming: DateTime<Utc>,
        last: DateTime<Utc>,
    },
}

/// Append-only store of closed candles, one series per timeframe.
///
/// Candles must arrive in strictly increasing timestamp order within a
/// timeframe; anything else is rejected so no analysis ever sees
/// rewritten history.
#[derive(Debug, Default)]
pub struct CandleStore {
    series: HashMap<Timeframe, CandleSeries>,
}

impl CandleStore {
    pub fn new() -> Self {
        Self {
            series: HashMap::new(),
        }
    }

    pub fn append(&mut self, candle: Candle) -> Result<(), StoreError> {
        let tf = candle.timeframe;
        let series = self.series.entry(tf).or_default();

        if let Some(last) = series.last() {
            if candle.timestamp <= last.timestamp {
                return Err(StoreError::OutOfOrder {
                    timeframe: tf,
                    incoming: candle.timestamp,
                    last: last.timestamp,
                });
            }
        }

        series.push(candle);
        Ok(())
    }

    /// Append a batch, skipping anything already on record. Overlapping
    /// fetch windows are normal for a polling feed, so skips log at
    /// debug only.
    pub fn extend(&mut self, candles: Vec<Candle>) -> usize {
        let mut accepted = 0;
        for candle in candles {
            match self.append(candle) {
                Ok(()) => accepted += 1,
                Err(e) => debug!(error = %e, "skipping candle"),
            }
        }
        accepted
    }

    pub fn series(&self, tf: Timeframe) -> Option<&CandleSeries> {
        self.series.get(&tf)
    }

    pub fn last(&self, tf: Timeframe) -> Option<&Candle> {
        self.series.get(&tf).and_then(|s| s.last())
    }

    pub fn len(&self, tf: Timeframe) -> usize {
        self.series.get(&tf).map_or(0, |s| s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(|s| s.is_empty())
    }

    /// A timeframe is stale when its newest candle closed more than
    /// `staleness_multiplier` timeframe durations before `now`.
    pub fn is_stale(&self, tf: Timeframe, now: DateTime<Utc>, staleness_multiplier: u32) -> bool {
        match self.last(tf) {
            Some(last) => {
                let max_age =
                    Duration::seconds(tf.as_seconds() as i64 * staleness_multiplier as i64);
                now - last.timestamp > max_age
            }
            None => true,
        }
    }
}
