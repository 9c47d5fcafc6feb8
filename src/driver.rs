use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::SharedConfig;
use crate::engine::SmcEngine;
use crate::models::{Candle, Timeframe};
use crate::observer::{ObservationRecord, ObservationSink};
use crate::strategies::signals::Signal;

/// Source of closed candles. Implementations own their transport; the
/// driver only ever sees finished bars.
#[async_trait]
pub trait CandleFeed: Send + Sync {
    async fn fetch(&mut self, tf: Timeframe, limit: usize) -> Result<Vec<Candle>>;
}

/// Downstream consumer of generated signals.
#[async_trait]
pub trait ExecutionHandler: Send + Sync {
    async fn submit(&mut self, signal: &Signal) -> Result<()>;
}

const FETCH_LIMIT: usize = 175;

/// Polling loop around the engine: fetch, ingest, evaluate, observe.
///
/// Feed and execution failures are logged and the loop keeps running;
/// only Ctrl+C stops it.
pub struct EngineDriver {
    config: SharedConfig,
    engine: SmcEngine,
    feed: Box<dyn CandleFeed>,
    execution: Option<Box<dyn ExecutionHandler>>,
    sink: Box<dyn ObservationSink>,
}

impl EngineDriver {
    pub fn new(
        config: SharedConfig,
        engine: SmcEngine,
        feed: Box<dyn CandleFeed>,
        sink: Box<dyn ObservationSink>,
    ) -> Self {
        Self {
            config,
            engine,
            feed,
            execution: None,
            sink,
        }
    }

    pub fn with_execution(mut self, execution: Box<dyn ExecutionHandler>) -> Self {
        self.execution = Some(execution);
        self
    }

    pub async fn run(&mut self) -> Result<()> {
        {
            let cfg = self.config.read().await;
            info!("Engine running on {} ({} / {})", cfg.symbol, cfg.htf, cfg.ltf);
        }
        info!("Press Ctrl+C to stop.");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down...");
                    return Ok(());
                }
                _ = self.tick() => {}
            }
        }
    }

    async fn tick(&mut self) {
        let (symbol, htf, ltf, poll_secs) = {
            let cfg = self.config.read().await;
            (cfg.symbol.clone(), cfg.htf, cfg.ltf, cfg.poll_interval_secs)
        };

        for tf in [htf, ltf] {
            match self.feed.fetch(tf, FETCH_LIMIT).await {
                Ok(candles) => {
                    self.engine.ingest_batch(candles);
                }
                Err(e) => {
                    warn!(timeframe = %tf, "feed error: {}", e);
                }
            }
        }

        let outcome = self.engine.evaluate_cycle(Utc::now());

        if let Some(signal) = &outcome.signal {
            if let Some(execution) = self.execution.as_mut() {
                if let Err(e) = execution.submit(signal).await {
                    error!("execution error: {}", e);
                }
            }
        }

        self.sink.record(&ObservationRecord::new(&symbol, outcome));

        tokio::time::sleep(tokio::time::Duration::from_secs(poll_secs)).await;
    }
}

/// A CandleFeed that replays pre-loaded data. A cursor controls which
/// candles are visible so a forward walk only ever sees closed bars.
pub struct ReplayFeed {
    data: std::collections::HashMap<Timeframe, Vec<Candle>>,
    now: chrono::DateTime<Utc>,
}

impl ReplayFeed {
    pub fn new() -> Self {
        Self {
            data: std::collections::HashMap::new(),
            now: Utc::now(),
        }
    }

    /// Candles must be sorted oldest-first.
    pub fn load(&mut self, tf: Timeframe, candles: Vec<Candle>) {
        self.data.insert(tf, candles);
    }

    pub fn set_time(&mut self, t: chrono::DateTime<Utc>) {
        self.now = t;
    }

    pub fn current_time(&self) -> chrono::DateTime<Utc> {
        self.now
    }

    pub fn earliest_time(&self) -> Option<chrono::DateTime<Utc>> {
        self.data
            .values()
            .filter_map(|v| v.first().map(|c| c.timestamp))
            .min()
    }

    pub fn latest_time(&self) -> Option<chrono::DateTime<Utc>> {
        self.data
            .values()
            .filter_map(|v| v.last().map(|c| c.timestamp))
            .max()
    }
}

impl Default for ReplayFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CandleFeed for ReplayFeed {
    async fn fetch(&mut self, tf: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        let empty = Vec::new();
        let all = self.data.get(&tf).unwrap_or(&empty);

        // Rightmost candle at or before the cursor.
        let end = all.partition_point(|c| c.timestamp <= self.now);
        if end == 0 {
            return Ok(Vec::new());
        }
        let start = end.saturating_sub(limit);
        Ok(all[start..end].to_vec())
    }
}
