//! Property tests for the signal and risk invariants.
//!
//! Uses proptest to verify:
//! 1. Momentum bounds: the accumulator never leaves [-10, 10]
//! 2. Cooldown: two placements are never closer than the cooldown window
//! 3. Stake ceilings: a stake never exceeds max stake or the balance fraction
//! 4. Escalation: the level never exceeds the martingale cap

use chrono::Utc;
use proptest::prelude::*;

use deriv_momentum_bot::config::TradingConfig;
use deriv_momentum_bot::core::momentum::{
    analyze_tick, classify_pattern, classify_signal, MOMENTUM_LIMIT, PATTERN_THRESHOLD,
};
use deriv_momentum_bot::core::risk_gate::COOLDOWN_TICKS;
use deriv_momentum_bot::core::stake::StakeSizer;
use deriv_momentum_bot::models::{Outcome, SessionState};
use deriv_momentum_bot::trading::resolver::{next_escalation, win_probability};
use deriv_momentum_bot::trading::{TickAction, TradingSession};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_prices() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec((1.0..2000.0_f64).prop_map(|p| (p * 100.0).round() / 100.0), 1..300)
}

/// Random walk in whole steps so runs of rising and falling ticks are common.
fn arb_walk() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-1i32..=1, 1..400).prop_map(|steps| {
        let mut price = 1000.0;
        steps
            .into_iter()
            .map(|s| {
                price += f64::from(s);
                price
            })
            .collect()
    })
}

fn arb_outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![Just(Outcome::Win), Just(Outcome::Loss)]
}

fn unbounded_config() -> TradingConfig {
    TradingConfig {
        min_stake: 1.0,
        max_stake: 10.0,
        martingale_cap: 3,
        session_profit_target: f64::INFINITY,
        session_max_drawdown: f64::INFINITY,
        sl_proximity_percent: 98.0,
    }
}

// ── 1. Momentum Bounds ───────────────────────────────────────────────

proptest! {
    /// Momentum stays clamped and the labels always agree with it.
    #[test]
    fn momentum_stays_bounded(prices in arb_prices()) {
        let mut previous = None;
        let mut momentum = 0;
        for price in prices {
            let analysis = analyze_tick(previous, momentum, price);
            prop_assert!(analysis.momentum.abs() <= MOMENTUM_LIMIT);
            prop_assert!((analysis.momentum - momentum).abs() <= 1);
            prop_assert_eq!(analysis.pattern, classify_pattern(analysis.momentum));
            prop_assert_eq!(analysis.signal, classify_signal(analysis.momentum));
            previous = Some(price);
            momentum = analysis.momentum;
        }
    }

    /// A strictly rising run of n ticks after a seed yields min(n, 10).
    #[test]
    fn rising_streak_saturates(n in 0usize..40) {
        let mut previous = Some(100.0);
        let mut momentum = 0;
        for i in 1..=n {
            let price = 100.0 + i as f64;
            momentum = analyze_tick(previous, momentum, price).momentum;
            previous = Some(price);
        }
        prop_assert_eq!(momentum, (n as i32).min(MOMENTUM_LIMIT));
    }
}

// ── 2. Cooldown ──────────────────────────────────────────────────────

proptest! {
    /// Placements are at least the cooldown window apart and only happen on
    /// reversal-strength momentum.
    #[test]
    fn cooldown_separates_placements(prices in arb_walk()) {
        let state = SessionState {
            is_trading: true,
            balance: 1_000_000.0,
            ticks_since_last_trade: COOLDOWN_TICKS,
            ..SessionState::default()
        };
        let mut session = TradingSession::restore(unbounded_config(), state);
        let mut last_placed: Option<usize> = None;

        for (i, price) in prices.into_iter().enumerate() {
            let report = session.on_tick(price, Utc::now()).unwrap();
            if let TickAction::Placed { .. } = report.action {
                prop_assert!(report.analysis.momentum.abs() >= PATTERN_THRESHOLD);
                if let Some(prev) = last_placed {
                    prop_assert!(i - prev >= COOLDOWN_TICKS as usize);
                }
                last_placed = Some(i);
            }
        }
    }
}

// ── 3. Stake Ceilings ────────────────────────────────────────────────

proptest! {
    #[test]
    fn stake_respects_ceilings(
        level in 0u32..30,
        min_stake in 0.01..5.0_f64,
        max_stake in 0.01..50.0_f64,
        balance in 0.0..100_000.0_f64,
    ) {
        let sizer = StakeSizer::default();
        let stake = sizer.stake(level, min_stake, max_stake, balance);
        let ceiling = max_stake.min((balance * 0.02).max(0.01));
        prop_assert!(stake >= 0.0);
        prop_assert!(stake <= ceiling + 1e-12);
    }

    /// An affordable stake always leaves the reserve in the account.
    #[test]
    fn affordable_stake_keeps_reserve(level in 0u32..10, balance in 0.0..10_000.0_f64) {
        let sizer = StakeSizer::default();
        let cfg = unbounded_config();
        let quote = sizer.quote(level, &cfg, balance);
        if quote.affordable {
            prop_assert!(quote.stake > 0.0);
            prop_assert!(quote.stake + quote.reserve <= balance + 1e-12);
        }
    }
}

// ── 4. Escalation ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn escalation_never_exceeds_cap(
        cap in 0u32..8,
        outcomes in prop::collection::vec(arb_outcome(), 0..100),
    ) {
        let mut level = 0;
        for outcome in outcomes {
            level = next_escalation(level, outcome, cap);
            prop_assert!(level <= cap);
            if outcome == Outcome::Win {
                prop_assert_eq!(level, 0);
            }
        }
    }

    #[test]
    fn win_probability_in_band(momentum in -10i32..=10) {
        let p = win_probability(momentum);
        prop_assert!((0.48..=0.68 + 1e-12).contains(&p));
    }
}
