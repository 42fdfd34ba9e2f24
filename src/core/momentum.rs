use serde::{Deserialize, Serialize};

use crate::models::{Pattern, Signal};

/// Momentum is clamped to `[-MOMENTUM_LIMIT, MOMENTUM_LIMIT]`.
pub const MOMENTUM_LIMIT: i32 = 10;
/// Momentum at or beyond this magnitude is labelled a reversal pattern.
pub const PATTERN_THRESHOLD: i32 = 4;
/// Minimum momentum magnitude for a directional signal.
pub const REQUIRED_MOMENTUM: i32 = 2;

/// Everything derived from a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickAnalysis {
    pub momentum: i32,
    pub pattern: Pattern,
    pub signal: Signal,
}

/// Fold a new price into the momentum accumulator.
///
/// Deterministic in `(previous_price, momentum, price)`. With no previous price
/// the momentum is returned unchanged.
pub fn analyze_tick(previous_price: Option<f64>, momentum: i32, price: f64) -> TickAnalysis {
    let momentum = match previous_price {
        Some(prev) if price > prev => (momentum + 1).min(MOMENTUM_LIMIT),
        Some(prev) if price < prev => (momentum - 1).max(-MOMENTUM_LIMIT),
        _ => momentum.clamp(-MOMENTUM_LIMIT, MOMENTUM_LIMIT),
    };

    TickAnalysis {
        momentum,
        pattern: classify_pattern(momentum),
        signal: classify_signal(momentum),
    }
}

pub fn classify_pattern(momentum: i32) -> Pattern {
    if momentum >= PATTERN_THRESHOLD {
        Pattern::BullishReversal
    } else if momentum <= -PATTERN_THRESHOLD {
        Pattern::BearishReversal
    } else {
        Pattern::Neutral
    }
}

pub fn classify_signal(momentum: i32) -> Signal {
    if momentum >= REQUIRED_MOMENTUM {
        Signal::Up
    } else if momentum <= -REQUIRED_MOMENTUM {
        Signal::Down
    } else {
        Signal::Neutral
    }
}
