use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::engine::CycleOutcome;

/// Install the global subscriber. RUST_LOG overrides the configured level.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();
}

/// One evaluation cycle flattened for downstream consumers. Every cycle
/// produces a record whether or not a signal fired; blocked cycles carry
/// the gate code that stopped them.
#[derive(Debug, Clone, Serialize)]
pub struct ObservationRecord {
    pub symbol: String,
    #[serde(flatten)]
    pub outcome: CycleOutcome,
}

impl ObservationRecord {
    pub fn new(symbol: &str, outcome: CycleOutcome) -> Self {
        Self {
            symbol: symbol.to_string(),
            outcome,
        }
    }
}

/// Destination for cycle records. A failing sink must never take the
/// engine down with it.
pub trait ObservationSink: Send + Sync {
    fn record(&mut self, record: &ObservationRecord);
}

/// Default sink: one JSON line per cycle through the log layer.
pub struct LogSink;

impl ObservationSink for LogSink {
    fn record(&mut self, record: &ObservationRecord) {
        match serde_json::to_string(record) {
            Ok(line) => info!(target: "observation", "{}", line),
            Err(e) => warn!("observation serialization failed: {}", e),
        }
    }
}

/// Sink that keeps records in memory, used in tests and backfills.
#[derive(Default)]
pub struct MemorySink {
    pub records: Vec<ObservationRecord>,
}

impl ObservationSink for MemorySink {
    fn record(&mut self, record: &ObservationRecord) {
        self.records.push(record.clone());
    }
}
