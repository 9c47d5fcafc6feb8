use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::narrative::NarrativeState;
use crate::core::risk::RiskTargets;
use crate::models::{BlockClass, Direction, EntryType, ZoneKind};

/// A fully-gated trade signal. By construction a Signal only exists when
/// every pre-filter gate has passed; there is no such thing as a blocked
/// Signal object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    pub entry_type: EntryType,
    pub entry_price: f64,
    pub block_class: BlockClass,
    pub zone_strength: f64,
    pub zone: ZoneKind,
    pub session: String,
    pub narrative_state: NarrativeState,
    pub risk: RiskTargets,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}
