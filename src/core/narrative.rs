use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::models::Bias;

/// Stages of the institutional precondition chain, in order. Each stage
/// can only be reached from the one before it; no event ever jumps the
/// machine forward past an unvisited stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeState {
    Idle,
    HtfBiasSet,
    ExternalLiquiditySwept,
    HtfPoiReached,
    LtfStructureShift,
    LtfPoiMitigated,
    EntryAllowed,
}

impl NarrativeState {
    /// Position in the chain, 0 (idle) through 6 (entry allowed).
    pub fn stage(self) -> u8 {
        match self {
            NarrativeState::Idle => 0,
            NarrativeState::HtfBiasSet => 1,
            NarrativeState::ExternalLiquiditySwept => 2,
            NarrativeState::HtfPoiReached => 3,
            NarrativeState::LtfStructureShift => 4,
            NarrativeState::LtfPoiMitigated => 5,
            NarrativeState::EntryAllowed => 6,
        }
    }
}

impl fmt::Display for NarrativeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NarrativeState::Idle => "idle",
            NarrativeState::HtfBiasSet => "htf_bias_set",
            NarrativeState::ExternalLiquiditySwept => "external_liquidity_swept",
            NarrativeState::HtfPoiReached => "htf_poi_reached",
            NarrativeState::LtfStructureShift => "ltf_structure_shift",
            NarrativeState::LtfPoiMitigated => "ltf_poi_mitigated",
            NarrativeState::EntryAllowed => "entry_allowed",
        };
        write!(f, "{s}")
    }
}

/// Confirmed observations that can move the machine. Raw price action
/// never drives a transition directly; the engine translates closed-candle
/// analysis into these events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeEvent {
    BiasEstablished(Bias),
    ExternalLiquiditySwept,
    HtfPoiReached,
    LtfStructureShift,
    LtfPoiMitigated,
    SetupValidated,
    /// The LTF premise failed (shift level reclaimed, POI invalidated).
    /// Reverts the LTF stages but keeps the HTF context.
    PremiseInvalidated,
    /// A signal executed; the LTF stages are spent and must rebuild.
    EntryExecuted,
}

/// The narrative chain gating all entries.
///
/// Reverts on invalidation drop back to HtfPoiReached; only a bias flip
/// resets the whole chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeMachine {
    state: NarrativeState,
    bias: Bias,
}

impl NarrativeMachine {
    pub fn new() -> Self {
        Self {
            state: NarrativeState::Idle,
            bias: Bias::Neutral,
        }
    }

    pub fn state(&self) -> NarrativeState {
        self.state
    }

    pub fn bias(&self) -> Bias {
        self.bias
    }

    pub fn entry_allowed(&self) -> bool {
        self.state == NarrativeState::EntryAllowed
    }

    /// Apply one event. Returns true when the state changed. Events that
    /// would skip a stage are ignored.
    pub fn advance(&mut self, event: NarrativeEvent) -> bool {
        let before = self.state;

        match event {
            NarrativeEvent::BiasEstablished(bias) => {
                if bias == Bias::Neutral {
                    return false;
                }
                if self.state == NarrativeState::Idle {
                    self.bias = bias;
                    self.state = NarrativeState::HtfBiasSet;
                } else if bias != self.bias {
                    // Bias flip: the entire narrative is void.
                    self.bias = bias;
                    self.state = NarrativeState::HtfBiasSet;
                }
            }
            NarrativeEvent::ExternalLiquiditySwept => {
                if self.state == NarrativeState::HtfBiasSet {
                    self.state = NarrativeState::ExternalLiquiditySwept;
                }
            }
            NarrativeEvent::HtfPoiReached => {
                if self.state == NarrativeState::ExternalLiquiditySwept {
                    self.state = NarrativeState::HtfPoiReached;
                }
            }
            NarrativeEvent::LtfStructureShift => {
                if self.state == NarrativeState::HtfPoiReached {
                    self.state = NarrativeState::LtfStructureShift;
                }
            }
            NarrativeEvent::LtfPoiMitigated => {
                if self.state == NarrativeState::LtfStructureShift {
                    self.state = NarrativeState::LtfPoiMitigated;
                }
            }
            NarrativeEvent::SetupValidated => {
                if self.state == NarrativeState::LtfPoiMitigated {
                    self.state = NarrativeState::EntryAllowed;
                }
            }
            NarrativeEvent::PremiseInvalidated | NarrativeEvent::EntryExecuted => {
                if self.state.stage() >= NarrativeState::LtfStructureShift.stage() {
                    self.state = NarrativeState::HtfPoiReached;
                }
            }
        }

        let changed = self.state != before;
        if changed {
            debug!(from = %before, to = %self.state, ?event, "narrative transition");
        }
        changed
    }
}

impl Default for NarrativeMachine {
    fn default() -> Self {
        Self::new()
    }
}
