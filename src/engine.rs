use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::core::candle_store::{CandleStore, StoreError};
use crate::core::inducement::{Inducement, InducementDetector};
use crate::core::liquidity::LiquidityMapper;
use crate::core::narrative::{NarrativeEvent, NarrativeMachine, NarrativeState};
use crate::core::poi::PoiIdentifier;
use crate::core::risk::RiskCalculator;
use crate::core::sessions::SessionClock;
use crate::core::structure::StructureAnalyzer;
use crate::core::swings::{SwingDetector, SwingPoint};
use crate::models::{Bias, Candle, Direction, ZoneKind};
use crate::strategies::generator::{LossMemory, SignalContext, SignalGenerator};
use crate::strategies::signals::Signal;

/// Result of one full evaluation cycle, suitable for observation records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub timestamp: DateTime<Utc>,
    pub session: String,
    pub narrative_state: NarrativeState,
    pub htf_bias: Bias,
    pub ltf_bias: Bias,
    pub htf_stale: bool,
    pub ltf_stale: bool,
    pub signal: Option<Signal>,
    pub block_reason: Option<String>,
}

/// The whole decision pipeline for one instrument, re-derived from closed
/// candles every cycle. The engine holds no I/O; the driver feeds it
/// candles and asks for an outcome.
///
/// When a timeframe goes stale the analysis that depends on it is skipped
/// for that cycle and the last known bias is retained; stale data never
/// silently feeds the pipeline.
pub struct SmcEngine {
    cfg: EngineConfig,
    store: CandleStore,
    sessions: SessionClock,
    swing_detector: SwingDetector,
    structure: StructureAnalyzer,
    poi_identifier: PoiIdentifier,
    idm_detector: InducementDetector,
    liquidity: LiquidityMapper,
    risk: RiskCalculator,
    narrative: NarrativeMachine,
    generator: SignalGenerator,

    htf_bias: Bias,
    active_idm: Option<Inducement>,
    open_longs: usize,
    open_shorts: usize,
}

impl SmcEngine {
    pub fn new(cfg: EngineConfig) -> Self {
        let swing_detector = SwingDetector::new(cfg.swing_lookback, cfg.swing_confirmation_lag);
        let structure =
            StructureAnalyzer::new(cfg.displacement_mean_window, cfg.equilibrium_buffer_percent);
        let poi_identifier = PoiIdentifier::new(
            cfg.ob_lookback,
            cfg.displacement_mean_window,
            cfg.fvg_min_gap_percent,
            cfg.zone_strength.clone(),
            cfg.liquidity_proximity_percent,
        );
        let liquidity =
            LiquidityMapper::new(cfg.equal_level_tolerance_percent, cfg.min_pool_touches);
        let risk = RiskCalculator::new(
            cfg.sl_swing_lookback,
            cfg.sl_buffer_percent,
            cfg.atr_period,
            cfg.atr_sl_multiplier,
            cfg.atr_tp_multiplier,
        );
        let generator = SignalGenerator::new(
            cfg.type1_min_strength,
            cfg.type2_min_strength,
            cfg.max_positions_per_direction,
        );

        Self {
            cfg,
            store: CandleStore::new(),
            sessions: SessionClock::new(),
            swing_detector,
            structure,
            poi_identifier,
            idm_detector: InducementDetector::new(),
            liquidity,
            risk,
            narrative: NarrativeMachine::new(),
            generator,
            htf_bias: Bias::Neutral,
            active_idm: None,
            open_longs: 0,
            open_shorts: 0,
        }
    }

    pub fn with_loss_memory(mut self, memory: Box<dyn LossMemory>) -> Self {
        self.generator = self.generator.with_loss_memory(memory);
        self
    }

    pub fn ingest(&mut self, candle: Candle) -> Result<(), StoreError> {
        self.store.append(candle)
    }

    pub fn ingest_batch(&mut self, candles: Vec<Candle>) -> usize {
        self.store.extend(candles)
    }

    pub fn narrative_state(&self) -> NarrativeState {
        self.narrative.state()
    }

    pub fn htf_bias(&self) -> Bias {
        self.htf_bias
    }

    /// Position bookkeeping from the execution side.
    pub fn note_position_opened(&mut self, direction: Direction) {
        match direction {
            Direction::Long => self.open_longs += 1,
            Direction::Short => self.open_shorts += 1,
        }
    }

    pub fn note_position_closed(&mut self, direction: Direction) {
        match direction {
            Direction::Long => self.open_longs = self.open_longs.saturating_sub(1),
            Direction::Short => self.open_shorts = self.open_shorts.saturating_sub(1),
        }
    }

    /// One full pipeline pass over the closed-candle state.
    pub fn evaluate_cycle(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        self.sessions.update(&self.cfg, Some(now));

        let htf_stale = self
            .store
            .is_stale(self.cfg.htf, now, self.cfg.staleness_multiplier);
        let ltf_stale = self
            .store
            .is_stale(self.cfg.ltf, now, self.cfg.staleness_multiplier);

        let mut outcome = CycleOutcome {
            timestamp: now,
            session: self.sessions.current_session.clone(),
            narrative_state: self.narrative.state(),
            htf_bias: self.htf_bias,
            ltf_bias: Bias::Neutral,
            htf_stale,
            ltf_stale,
            signal: None,
            block_reason: None,
        };

        // --- HTF pass: bias, external liquidity, HTF POI touch ---
        if htf_stale {
            warn!(timeframe = %self.cfg.htf, "stale data, retaining last bias");
        } else if let Some(htf) = self.store.series(self.cfg.htf) {
            let htf = htf.clone();
            let swings = self.swing_detector.detect(&htf);
            let report = self.structure.analyze(&htf, &swings, false);

            if report.bias != Bias::Neutral && report.bias != self.htf_bias {
                info!(bias = %report.bias, "higher timeframe bias");
                self.htf_bias = report.bias;
                self.active_idm = None;
                self.narrative
                    .advance(NarrativeEvent::BiasEstablished(report.bias));
            } else if report.bias != Bias::Neutral {
                self.narrative
                    .advance(NarrativeEvent::BiasEstablished(report.bias));
            }

            let pools = self.liquidity.detect_pools(&htf, &swings);
            if self.liquidity.latest_external_sweep(&pools).is_some() {
                self.narrative.advance(NarrativeEvent::ExternalLiquiditySwept);
            }

            let htf_pois = self.poi_identifier.identify(&htf, self.htf_bias, &[]);
            if let Some(close) = htf.last().map(|c| c.close) {
                let touched = htf_pois.iter().any(|p| {
                    p.permission_to_trade
                        && self.htf_bias.matches(p.direction)
                        && close >= p.low
                        && close <= p.high
                });
                if touched {
                    self.narrative.advance(NarrativeEvent::HtfPoiReached);
                }
            }
        }

        outcome.htf_bias = self.htf_bias;

        // --- LTF pass: inducement, structure shift, POI mitigation ---
        if ltf_stale {
            debug!(timeframe = %self.cfg.ltf, "stale data, skipping entry analysis");
            outcome.narrative_state = self.narrative.state();
            return outcome;
        }

        let direction = match self.htf_bias.to_direction() {
            Some(d) => d,
            None => {
                outcome.narrative_state = self.narrative.state();
                outcome.block_reason = Some("no_htf_bias".to_string());
                return outcome;
            }
        };

        let ltf = match self.store.series(self.cfg.ltf) {
            Some(s) if !s.is_empty() => s.clone(),
            _ => {
                outcome.narrative_state = self.narrative.state();
                outcome.block_reason = Some("no_ltf_data".to_string());
                return outcome;
            }
        };

        let ltf_swings = self.swing_detector.detect(&ltf);

        // Maintain the active inducement across cycles; a violated one is
        // a broken premise, not a candidate for silent replacement.
        if self
            .active_idm
            .as_ref()
            .map_or(true, |idm| idm.direction != direction)
        {
            self.active_idm = self.idm_detector.identify(&ltf_swings, direction);
        }
        if let Some(idm) = self.active_idm.as_mut() {
            self.idm_detector.check_sweep(idm, &ltf);
            if idm.violated {
                self.narrative.advance(NarrativeEvent::PremiseInvalidated);
                self.active_idm = self.idm_detector.identify(&ltf_swings, direction);
            }
        }
        let idm_swept = self.active_idm.as_ref().map_or(false, |i| i.swept);

        let ltf_report = self.structure.analyze(&ltf, &ltf_swings, idm_swept);
        outcome.ltf_bias = ltf_report.bias;

        // A structure break after the inducement formed retires the record;
        // the broken leg's sweep cannot keep gating entries on the new leg.
        if let Some(break_ts) = ltf_report.events.iter().map(|e| e.timestamp).max() {
            let stale_idm = self
                .active_idm
                .as_ref()
                .map_or(false, |idm| idm.timestamp < break_ts);
            if stale_idm {
                let post_break: Vec<SwingPoint> = ltf_swings
                    .iter()
                    .filter(|s| s.timestamp > break_ts)
                    .cloned()
                    .collect();
                self.active_idm = self.idm_detector.identify(&post_break, direction);
                if let Some(idm) = self.active_idm.as_mut() {
                    self.idm_detector.check_sweep(idm, &ltf);
                }
            }
        }

        // A confirmed LTF shift into the HTF direction advances the chain.
        let shift_event = ltf_report.events.iter().rev().find(|e| {
            e.bias == self.htf_bias
                && matches!(
                    e.kind,
                    crate::models::StructureKind::Choch | crate::models::StructureKind::Mss
                )
        });
        if shift_event.is_some() {
            self.narrative.advance(NarrativeEvent::LtfStructureShift);
        }

        let pools = self.liquidity.detect_pools(&ltf, &ltf_swings);
        let pool_levels: Vec<f64> = pools.iter().map(|p| p.price).collect();
        let pois = self
            .poi_identifier
            .identify(&ltf, self.htf_bias, &pool_levels);

        let last = match ltf.last() {
            Some(c) => c.clone(),
            None => {
                outcome.narrative_state = self.narrative.state();
                return outcome;
            }
        };

        // Stage five needs a real mitigation: a close beyond a block's
        // midpoint, not a wick into the zone edge.
        let mitigated_block = pois
            .iter()
            .any(|p| p.direction == direction && p.mitigated && !p.invalidated);
        if mitigated_block {
            self.narrative.advance(NarrativeEvent::LtfPoiMitigated);
        }

        let candidate = pois
            .iter()
            .filter(|p| p.direction == direction && p.permission_to_trade)
            .max_by(|a, b| {
                a.zone_strength
                    .partial_cmp(&b.zone_strength)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.timestamp.cmp(&a.timestamp))
            })
            .cloned();

        let poi = match candidate {
            Some(p) => p,
            None => {
                // Every block in our direction is dead: the premise is gone.
                let had_blocks = pois.iter().any(|p| p.direction == direction);
                if had_blocks {
                    self.narrative.advance(NarrativeEvent::PremiseInvalidated);
                }
                outcome.narrative_state = self.narrative.state();
                outcome.block_reason = Some("no_tradeable_poi".to_string());
                return outcome;
            }
        };

        // A mitigation with a live candidate left to trade validates the setup.
        if mitigated_block {
            self.narrative.advance(NarrativeEvent::SetupValidated);
        }

        // --- Entry evaluation ---
        let zone = ltf_report
            .dealing_range
            .as_ref()
            .map(|dr| dr.classify(last.close))
            .unwrap_or(ZoneKind::Equilibrium);

        let choch_confirmed = shift_event.is_some();
        let external_sweep = self
            .store
            .series(self.cfg.htf)
            .map(|htf| {
                let htf_swings = self.swing_detector.detect(htf);
                let htf_pools = self.liquidity.detect_pools(htf, &htf_swings);
                self.liquidity.latest_external_sweep(&htf_pools).is_some()
            })
            .unwrap_or(false);

        let risk = self
            .risk
            .targets(last.close, direction, &ltf_swings, &pools, &ltf);

        let idm = match self.active_idm.clone() {
            Some(i) => i,
            None => {
                outcome.narrative_state = self.narrative.state();
                outcome.block_reason = Some("no_inducement".to_string());
                return outcome;
            }
        };

        let open_same_direction = match direction {
            Direction::Long => self.open_longs,
            Direction::Short => self.open_shorts,
        };

        let ctx = SignalContext {
            direction,
            entry_price: last.close,
            timestamp: last.timestamp,
            narrative: &self.narrative,
            killzone_active: self.sessions.is_killzone(),
            session: self.sessions.current_session.clone(),
            external_sweep_on_record: external_sweep,
            open_positions_same_direction: open_same_direction,
            zone,
            htf_bias: self.htf_bias,
            poi: &poi,
            idm: &idm,
            choch_confirmed,
            risk,
        };

        let signal = self.generator.evaluate(&ctx);
        if let Some(s) = &signal {
            info!(
                direction = %s.direction,
                entry_type = %s.entry_type,
                entry = s.entry_price,
                sl = s.risk.stop_loss,
                tp = s.risk.take_profit,
                "signal generated"
            );
            self.note_position_opened(s.direction);
            self.narrative.advance(NarrativeEvent::EntryExecuted);
        } else {
            outcome.block_reason = self.generator.last_block.map(str::to_string);
        }

        outcome.signal = signal;
        outcome.narrative_state = self.narrative.state();
        outcome
    }
}
