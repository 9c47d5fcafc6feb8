mod common;

use chrono::Duration;

use smc_trading_engine::core::narrative::NarrativeState;
use smc_trading_engine::engine::SmcEngine;
use smc_trading_engine::models::{Bias, BlockClass, Direction, EntryType, Timeframe, ZoneKind};

use common::{base_time, bullish_break_data, candles_ending_at, flat_data, test_config};

fn engine_with_break_data() -> SmcEngine {
    let now = base_time();
    let mut engine = SmcEngine::new(test_config());
    engine.ingest_batch(candles_ending_at(Timeframe::H4, now, &bullish_break_data()));
    engine.ingest_batch(candles_ending_at(Timeframe::M15, now, &bullish_break_data()));
    engine
}

#[test]
fn cold_start_cycle_is_safe() {
    let mut engine = SmcEngine::new(test_config());
    let outcome = engine.evaluate_cycle(base_time());
    assert!(outcome.signal.is_none());
    assert!(outcome.htf_stale);
    assert!(outcome.ltf_stale);
    assert_eq!(outcome.narrative_state, NarrativeState::Idle);
    assert_eq!(outcome.htf_bias, Bias::Neutral);
}

#[test]
fn confirmed_break_sets_higher_timeframe_bias() {
    let mut engine = engine_with_break_data();
    let outcome = engine.evaluate_cycle(base_time() + Duration::minutes(1));

    assert_eq!(outcome.htf_bias, Bias::Bullish);
    assert!(outcome.narrative_state.stage() >= 1);
    // Full chain not yet complete; no signal may exist.
    assert!(outcome.signal.is_none());
    assert!(outcome.block_reason.is_some());
}

#[test]
fn stale_higher_timeframe_retains_last_bias() {
    let mut engine = engine_with_break_data();
    engine.evaluate_cycle(base_time() + Duration::minutes(1));

    let much_later = base_time() + Duration::days(3);
    let outcome = engine.evaluate_cycle(much_later);
    assert!(outcome.htf_stale);
    assert_eq!(outcome.htf_bias, Bias::Bullish);
    assert!(outcome.signal.is_none());
}

#[test]
fn identical_input_produces_identical_outcome() {
    let mut a = engine_with_break_data();
    let mut b = engine_with_break_data();
    let now = base_time() + Duration::minutes(1);

    let oa = serde_json::to_value(a.evaluate_cycle(now)).unwrap();
    let ob = serde_json::to_value(b.evaluate_cycle(now)).unwrap();
    assert_eq!(oa, ob);
}

#[test]
fn featureless_data_never_forms_a_bias() {
    let now = base_time();
    let mut engine = SmcEngine::new(test_config());
    engine.ingest_batch(candles_ending_at(Timeframe::H4, now, &flat_data(40)));
    engine.ingest_batch(candles_ending_at(Timeframe::M15, now, &flat_data(40)));

    let outcome = engine.evaluate_cycle(now + Duration::minutes(1));
    assert_eq!(outcome.htf_bias, Bias::Neutral);
    assert!(outcome.signal.is_none());
    assert_eq!(outcome.block_reason.as_deref(), Some("no_htf_bias"));
}

#[test]
fn rewritten_history_is_rejected_at_the_store() {
    let now = base_time();
    let mut engine = SmcEngine::new(test_config());
    let candles = candles_ending_at(Timeframe::M15, now, &bullish_break_data());

    for c in candles.iter().cloned() {
        engine.ingest(c).unwrap();
    }
    // Re-sending an old candle must fail rather than rewrite the series.
    assert!(engine.ingest(candles[0].clone()).is_err());
}

/// H4 context for a short: rise off a swing low at 100.5, a bearish
/// order block at 106-108, a break below the swing low that also runs
/// the prior day's low, then a rally back into the block.
fn bearish_context_htf() -> Vec<(f64, f64, f64, f64)> {
    vec![
        (100.8, 102.0, 100.6, 101.5),
        (101.5, 104.0, 101.0, 103.5),
        (103.5, 104.5, 100.5, 101.0), // swing low 100.5
        (101.0, 105.0, 100.9, 104.5),
        (104.5, 107.0, 104.0, 106.5),
        (106.5, 108.0, 106.0, 107.5), // block candle, zone 106-108
        (107.5, 107.8, 104.0, 104.5), // displacement through 106
        (104.5, 105.0, 99.8, 100.2),  // breaks 100.5, runs the prior day's low
        (100.2, 103.0, 99.5, 102.5),
        (102.5, 107.0, 102.0, 106.5), // closes back inside the block
    ]
}

/// M15 leg for the same short: bullish leg first, rollover leaving
/// three bearish blocks (the highest with an adjacent gap, the lowest
/// mitigated by the pullback), a pullback high at 100.3 that gets
/// swept by a wick, settling in premium.
fn bearish_setup_ltf() -> Vec<(f64, f64, f64, f64)> {
    vec![
        (100.0, 101.0, 99.6, 100.5),
        (100.5, 102.0, 100.2, 101.5),
        (101.5, 104.0, 101.2, 103.5), // swing high 104
        (103.5, 103.8, 102.0, 102.5),
        (102.5, 103.0, 101.5, 102.0),
        (102.0, 102.5, 100.8, 101.2),
        (101.2, 102.0, 100.5, 101.0), // swing low 100.5
        (101.0, 105.5, 100.9, 105.0), // bullish break of 104
        (105.0, 106.0, 104.5, 105.5),
        (105.5, 107.0, 105.0, 106.5),
        (106.5, 107.5, 106.0, 107.0), // block candle, zone 106-107.5
        (107.0, 107.2, 104.6, 104.8), // displacement, gap left below
        (104.8, 105.5, 103.8, 104.0),
        (104.0, 104.3, 102.6, 102.9),
        (102.9, 103.6, 102.5, 103.4), // block candle, zone 102.5-103.6
        (103.4, 103.5, 101.4, 101.6),
        (101.6, 102.6, 100.9, 101.1),
        (101.1, 101.3, 99.6, 99.8), // breaks the 100.5 swing low
        (99.8, 100.4, 99.3, 100.2), // block candle, zone 99.3-100.4
        (100.2, 100.3, 98.4, 98.6),
        (98.6, 99.0, 98.0, 98.3), // trough swing low 98.0
        (98.3, 99.5, 98.2, 99.3),
        (99.3, 100.3, 99.2, 100.2), // pullback high 100.3, mitigates 99.3-100.4
        (100.2, 100.25, 99.4, 99.6),
        (99.6, 99.9, 99.2, 99.5),
        (99.5, 99.8, 99.0, 99.3),
        (99.3, 100.6, 99.1, 100.0), // wick above 100.3, close back below
        (100.0, 100.4, 99.7, 100.2), // entry candle, premium of 98.0-100.3
    ]
}

#[test]
fn completed_bearish_narrative_emits_a_type1_short() {
    let now = base_time(); // 12:00 UTC = 07:00 ET, inside ny_am
    let mut engine = SmcEngine::new(test_config());
    engine.ingest_batch(candles_ending_at(Timeframe::H4, now, &bearish_context_htf()));
    engine.ingest_batch(candles_ending_at(Timeframe::M15, now, &bearish_setup_ltf()));

    let outcome = engine.evaluate_cycle(now + Duration::minutes(1));
    let signal = outcome
        .signal
        .unwrap_or_else(|| panic!("expected a signal, blocked by {:?}", outcome.block_reason));

    assert_eq!(signal.direction, Direction::Short);
    assert_eq!(signal.entry_type, EntryType::Direct);
    assert_eq!(signal.block_class, BlockClass::Extreme);
    assert_eq!(signal.zone, ZoneKind::Premium);
    assert_eq!(signal.reason, "Extreme Premium + IDM Swept (Direct)");
    assert!(signal.zone_strength >= 70.0);
    assert_eq!(signal.session, "ny_am");

    // Execution spends the LTF stages; the chain rebuilds from the HTF POI.
    assert_eq!(outcome.narrative_state, NarrativeState::HtfPoiReached);
}

#[test]
fn repeated_cycles_never_regress_the_narrative_without_cause() {
    let mut engine = engine_with_break_data();
    let first = engine.evaluate_cycle(base_time() + Duration::minutes(1));
    let second = engine.evaluate_cycle(base_time() + Duration::minutes(2));

    // Same data, no invalidation event: the chain holds its stage.
    assert!(second.narrative_state.stage() >= first.narrative_state.stage());
}
