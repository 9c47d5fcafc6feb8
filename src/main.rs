use anyhow::{Context, Result};
use chrono::Duration;
use tracing::info;

use smc_trading_engine::config::EngineConfig;
use smc_trading_engine::driver::{CandleFeed, ReplayFeed};
use smc_trading_engine::engine::SmcEngine;
use smc_trading_engine::models::Candle;
use smc_trading_engine::observer::{init_tracing, LogSink, ObservationRecord, ObservationSink};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = EngineConfig::from_env();
    init_tracing(&cfg.log_level);

    let path = std::env::var("CANDLE_FILE")
        .context("CANDLE_FILE must point at a JSONL candle file")?;
    let feed = load_feed(&path)?;

    replay(cfg, feed).await
}

/// One candle per line, oldest-first, any mix of timeframes.
fn load_feed(path: &str) -> Result<ReplayFeed> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    let mut by_tf: std::collections::HashMap<_, Vec<Candle>> = std::collections::HashMap::new();

    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        let candle: Candle = serde_json::from_str(line).context("malformed candle line")?;
        by_tf.entry(candle.timeframe).or_default().push(candle);
    }

    let mut feed = ReplayFeed::new();
    for (tf, mut candles) in by_tf {
        candles.sort_by_key(|c| c.timestamp);
        info!("Loaded {} {} candles", candles.len(), tf);
        feed.load(tf, candles);
    }
    Ok(feed)
}

/// Forward walk over the loaded data in LTF steps. Each step only sees
/// candles closed at or before the cursor.
async fn replay(cfg: EngineConfig, mut feed: ReplayFeed) -> Result<()> {
    let start = feed.earliest_time().context("candle file is empty")?;
    let end = feed.latest_time().context("candle file is empty")?;
    let step = Duration::from_std(cfg.ltf.as_duration()).context("timeframe step")?;

    info!("Replaying {} from {} to {}", cfg.symbol, start, end);

    let symbol = cfg.symbol.clone();
    let (htf, ltf) = (cfg.htf, cfg.ltf);
    let mut engine = SmcEngine::new(cfg);
    let mut sink = LogSink;
    let mut signals = 0usize;

    let mut cursor = start;
    while cursor <= end {
        feed.set_time(cursor);
        for tf in [htf, ltf] {
            let candles = feed.fetch(tf, usize::MAX).await?;
            engine.ingest_batch(candles);
        }

        let outcome = engine.evaluate_cycle(cursor);
        if outcome.signal.is_some() {
            signals += 1;
        }
        sink.record(&ObservationRecord::new(&symbol, outcome));

        cursor += step;
    }

    info!("Replay complete: {} signals", signals);
    Ok(())
}
