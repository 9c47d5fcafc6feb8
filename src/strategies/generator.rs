use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::inducement::Inducement;
use crate::core::narrative::NarrativeMachine;
use crate::core::poi::Poi;
use crate::core::risk::RiskTargets;
use crate::models::{Bias, BlockClass, Direction, EntryType, ZoneKind};
use crate::strategies::signals::Signal;

/// Gate block codes surfaced in observation records.
pub mod block {
    pub const NARRATIVE_NOT_READY: &str = "narrative_not_ready";
    pub const OUTSIDE_KILLZONE: &str = "outside_killzone";
    pub const NO_EXTERNAL_SWEEP: &str = "no_external_sweep";
    pub const POSITION_LIMIT: &str = "position_limit";
    pub const ZONE_MISALIGNED: &str = "zone_misaligned";
    pub const BIAS_MISMATCH: &str = "bias_mismatch";
    pub const LOSS_MEMORY_VETO: &str = "loss_memory_veto";
    pub const POI_NO_PERMISSION: &str = "poi_no_permission";
    pub const IDM_NOT_SWEPT: &str = "idm_not_swept";
    pub const AWAITING_CONFIRMATION: &str = "awaiting_confirmation";
    pub const STRENGTH_BELOW_THRESHOLD: &str = "strength_below_threshold";
}

/// Optional external veto consulted after the gates. Implementations may
/// remember recent losing ideas; the generator works identically with no
/// memory attached.
pub trait LossMemory: Send + Sync {
    fn should_veto(&self, direction: Direction, poi: &Poi) -> bool;
}

/// Everything the generator needs to judge one candidate entry on one
/// closed candle.
pub struct SignalContext<'a> {
    pub direction: Direction,
    pub entry_price: f64,
    pub timestamp: DateTime<Utc>,
    pub narrative: &'a NarrativeMachine,
    pub killzone_active: bool,
    pub session: String,
    pub external_sweep_on_record: bool,
    pub open_positions_same_direction: usize,
    pub zone: ZoneKind,
    pub htf_bias: Bias,
    pub poi: &'a Poi,
    pub idm: &'a Inducement,
    pub choch_confirmed: bool,
    pub risk: RiskTargets,
}

/// Signal generation behind six ordered gates.
///
/// The gates run before any Signal is constructed and each failure stops
/// evaluation at that gate; nothing downstream of a closed gate executes.
/// Two entry shapes exist: Type 1 fires directly off an EXTREME block of
/// sufficient strength once the inducement is swept, Type 2 additionally
/// waits for a confirming change of character. An eligible setup without
/// its confirmation parks as pending; any executed signal clears the
/// pending flag.
pub struct SignalGenerator {
    pub type1_min_strength: f64,
    pub type2_min_strength: f64,
    pub max_positions_per_direction: usize,
    pub pending_confirmation: bool,
    pub last_block: Option<&'static str>,
    loss_memory: Option<Box<dyn LossMemory>>,
}

impl SignalGenerator {
    pub fn new(
        type1_min_strength: f64,
        type2_min_strength: f64,
        max_positions_per_direction: usize,
    ) -> Self {
        Self {
            type1_min_strength,
            type2_min_strength,
            max_positions_per_direction,
            pending_confirmation: false,
            last_block: None,
            loss_memory: None,
        }
    }

    pub fn with_loss_memory(mut self, memory: Box<dyn LossMemory>) -> Self {
        self.loss_memory = Some(memory);
        self
    }

    pub fn evaluate(&mut self, ctx: &SignalContext) -> Option<Signal> {
        self.last_block = None;

        // Gate 1: the narrative chain must be complete.
        if !ctx.narrative.entry_allowed() {
            return self.blocked(block::NARRATIVE_NOT_READY);
        }

        // Gate 2: killzone session.
        if !ctx.killzone_active {
            return self.blocked(block::OUTSIDE_KILLZONE);
        }

        // Gate 3: an external liquidity sweep must be on record.
        if !ctx.external_sweep_on_record {
            return self.blocked(block::NO_EXTERNAL_SWEEP);
        }

        // Gate 4: per-direction position cap.
        if ctx.open_positions_same_direction >= self.max_positions_per_direction {
            return self.blocked(block::POSITION_LIMIT);
        }

        // Gate 5: longs buy discount, shorts sell premium.
        let zone_ok = match ctx.direction {
            Direction::Long => ctx.zone == ZoneKind::Discount,
            Direction::Short => ctx.zone == ZoneKind::Premium,
        };
        if !zone_ok {
            return self.blocked(block::ZONE_MISALIGNED);
        }

        // Gate 6: trade with the higher-timeframe bias only.
        if !ctx.htf_bias.matches(ctx.direction) {
            return self.blocked(block::BIAS_MISMATCH);
        }

        if let Some(memory) = &self.loss_memory {
            if memory.should_veto(ctx.direction, ctx.poi) {
                return self.blocked(block::LOSS_MEMORY_VETO);
            }
        }

        if !ctx.poi.permission_to_trade {
            return self.blocked(block::POI_NO_PERMISSION);
        }

        if !ctx.idm.swept {
            return self.blocked(block::IDM_NOT_SWEPT);
        }

        // Type 1: direct entry off an extreme block, no confirmation needed.
        if ctx.poi.block_class == BlockClass::Extreme
            && ctx.poi.zone_strength >= self.type1_min_strength
        {
            let reason = match ctx.direction {
                Direction::Long => "Extreme Discount + IDM Swept (Direct)",
                Direction::Short => "Extreme Premium + IDM Swept (Direct)",
            };
            return Some(self.build(ctx, EntryType::Direct, reason));
        }

        // Type 2: confirmation entry on a change of character.
        if ctx.choch_confirmed && ctx.poi.zone_strength >= self.type2_min_strength {
            return Some(self.build(
                ctx,
                EntryType::Confirmation,
                "CHoCH Confirmed + IDM Swept (Confirmation)",
            ));
        }

        if ctx.poi.zone_strength >= self.type2_min_strength {
            // Setup is live but unconfirmed; park it.
            self.pending_confirmation = true;
            return self.blocked(block::AWAITING_CONFIRMATION);
        }

        self.blocked(block::STRENGTH_BELOW_THRESHOLD)
    }

    fn build(&mut self, ctx: &SignalContext, entry_type: EntryType, reason: &str) -> Signal {
        // Any execution clears the parked setup.
        self.pending_confirmation = false;
        Signal {
            direction: ctx.direction,
            entry_type,
            entry_price: ctx.entry_price,
            block_class: ctx.poi.block_class,
            zone_strength: ctx.poi.zone_strength,
            zone: ctx.zone,
            session: ctx.session.clone(),
            narrative_state: ctx.narrative.state(),
            risk: ctx.risk.clone(),
            reason: reason.to_string(),
            timestamp: ctx.timestamp,
        }
    }

    fn blocked(&mut self, code: &'static str) -> Option<Signal> {
        debug!(code, "signal blocked");
        self.last_block = Some(code);
        None
    }
}
