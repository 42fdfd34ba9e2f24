use serde::{Deserialize, Serialize};
use std::fmt;

/// Contract side placed with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Call,
    Put,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Call => write!(f, "CALL"),
            Direction::Put => write!(f, "PUT"),
        }
    }
}

impl Direction {
    /// +1 for CALL, -1 for PUT. Multiplies price offsets in the trade's favour.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Call => 1.0,
            Direction::Put => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Up,
    Down,
    Neutral,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Up => write!(f, "UP"),
            Signal::Down => write!(f, "DOWN"),
            Signal::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

impl Signal {
    pub fn to_direction(self) -> Option<Direction> {
        match self {
            Signal::Up => Some(Direction::Call),
            Signal::Down => Some(Direction::Put),
            Signal::Neutral => None,
        }
    }
}

/// Momentum-derived reversal label (morning star / evening star emulation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    BullishReversal,
    BearishReversal,
    Neutral,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::BullishReversal => write!(f, "bullish_reversal"),
            Pattern::BearishReversal => write!(f, "bearish_reversal"),
            Pattern::Neutral => write!(f, "neutral"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pending,
    Win,
    Loss,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pending => write!(f, "pending"),
            Outcome::Win => write!(f, "win"),
            Outcome::Loss => write!(f, "loss"),
        }
    }
}

/// Why a session disarmed itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    ProfitTarget,
    MaxDrawdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::ProfitTarget => write!(f, "profit_target"),
            StopReason::MaxDrawdown => write!(f, "max_drawdown"),
        }
    }
}
