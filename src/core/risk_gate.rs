use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::TradingConfig;
use crate::core::momentum::{TickAnalysis, REQUIRED_MOMENTUM};
use crate::models::{Direction, Pattern, SessionState, Signal, StopReason};

/// Ticks that must be observed between two placements.
pub const COOLDOWN_TICKS: u32 = 5;
pub const REQUIRE_PATTERN_MATCH: bool = true;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BlockReason {
    Cooldown { ticks_since: u32 },
    WeakMomentum { momentum: i32 },
    PatternMismatch { pattern: Pattern },
    SignalMismatch { signal: Signal },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Cooldown { .. } => write!(f, "cooldown"),
            BlockReason::WeakMomentum { .. } => write!(f, "weak_momentum"),
            BlockReason::PatternMismatch { .. } => write!(f, "pattern_mismatch"),
            BlockReason::SignalMismatch { .. } => write!(f, "signal_mismatch"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateDecision {
    Proceed(Direction),
    Halt(StopReason),
    Blocked(BlockReason),
}

/// Profit target wins when both limits are reached on the same update.
pub fn session_stop_reason(profit: f64, loss: f64, cfg: &TradingConfig) -> Option<StopReason> {
    if profit >= cfg.session_profit_target {
        Some(StopReason::ProfitTarget)
    } else if loss >= cfg.session_max_drawdown {
        Some(StopReason::MaxDrawdown)
    } else {
        None
    }
}

/// Ordered, short-circuiting pre-trade checks.
#[derive(Debug, Clone)]
pub struct RiskGate {
    pub cooldown_ticks: u32,
    pub required_momentum: i32,
    pub require_pattern_match: bool,
}

impl Default for RiskGate {
    fn default() -> Self {
        Self {
            cooldown_ticks: COOLDOWN_TICKS,
            required_momentum: REQUIRED_MOMENTUM,
            require_pattern_match: REQUIRE_PATTERN_MATCH,
        }
    }
}

impl RiskGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(
        &self,
        state: &SessionState,
        analysis: &TickAnalysis,
        cfg: &TradingConfig,
    ) -> GateDecision {
        if let Some(reason) =
            session_stop_reason(state.cumulative_profit, state.cumulative_loss, cfg)
        {
            return GateDecision::Halt(reason);
        }

        if state.ticks_since_last_trade < self.cooldown_ticks {
            return GateDecision::Blocked(BlockReason::Cooldown {
                ticks_since: state.ticks_since_last_trade,
            });
        }

        // A zero threshold would let flat momentum through with no direction.
        let momentum = analysis.momentum;
        if momentum.abs() < self.required_momentum.max(1) {
            return GateDecision::Blocked(BlockReason::WeakMomentum { momentum });
        }

        let bullish = momentum > 0;

        if self.require_pattern_match {
            let wanted = if bullish {
                Pattern::BullishReversal
            } else {
                Pattern::BearishReversal
            };
            if analysis.pattern != wanted {
                return GateDecision::Blocked(BlockReason::PatternMismatch {
                    pattern: analysis.pattern,
                });
            }
        }

        let direction = if bullish {
            Direction::Call
        } else {
            Direction::Put
        };
        if analysis.signal.to_direction() != Some(direction) {
            return GateDecision::Blocked(BlockReason::SignalMismatch {
                signal: analysis.signal,
            });
        }

        GateDecision::Proceed(direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::momentum::{classify_pattern, classify_signal};

    fn analysis(momentum: i32) -> TickAnalysis {
        TickAnalysis {
            momentum,
            pattern: classify_pattern(momentum),
            signal: classify_signal(momentum),
        }
    }

    fn ready_state() -> SessionState {
        SessionState {
            is_trading: true,
            balance: 100.0,
            ticks_since_last_trade: COOLDOWN_TICKS,
            ..SessionState::default()
        }
    }

    #[test]
    fn strong_bullish_momentum_proceeds_with_call() {
        let gate = RiskGate::new();
        let d = gate.evaluate(&ready_state(), &analysis(5), &TradingConfig::default());
        assert_eq!(d, GateDecision::Proceed(Direction::Call));
    }

    #[test]
    fn strong_bearish_momentum_proceeds_with_put() {
        let gate = RiskGate::new();
        let d = gate.evaluate(&ready_state(), &analysis(-6), &TradingConfig::default());
        assert_eq!(d, GateDecision::Proceed(Direction::Put));
    }

    #[test]
    fn stop_check_runs_before_cooldown() {
        let gate = RiskGate::new();
        let cfg = TradingConfig {
            session_max_drawdown: 5.0,
            ..TradingConfig::default()
        };
        let state = SessionState {
            cumulative_loss: 5.0,
            ticks_since_last_trade: 0,
            ..ready_state()
        };
        assert_eq!(
            gate.evaluate(&state, &analysis(5), &cfg),
            GateDecision::Halt(StopReason::MaxDrawdown)
        );
    }

    #[test]
    fn profit_target_reported_distinctly() {
        let cfg = TradingConfig {
            session_profit_target: 1.0,
            session_max_drawdown: 1.0,
            ..TradingConfig::default()
        };
        assert_eq!(session_stop_reason(1.0, 1.0, &cfg), Some(StopReason::ProfitTarget));
        assert_eq!(session_stop_reason(0.99, 1.0, &cfg), Some(StopReason::MaxDrawdown));
        assert_eq!(session_stop_reason(0.99, 0.5, &cfg), None);
    }

    #[test]
    fn cooldown_blocks() {
        let gate = RiskGate::new();
        let state = SessionState {
            ticks_since_last_trade: COOLDOWN_TICKS - 1,
            ..ready_state()
        };
        assert_eq!(
            gate.evaluate(&state, &analysis(8), &TradingConfig::default()),
            GateDecision::Blocked(BlockReason::Cooldown { ticks_since: 4 })
        );
    }

    #[test]
    fn weak_momentum_blocks() {
        let gate = RiskGate::new();
        let d = gate.evaluate(&ready_state(), &analysis(1), &TradingConfig::default());
        assert_eq!(d, GateDecision::Blocked(BlockReason::WeakMomentum { momentum: 1 }));
    }

    #[test]
    fn zero_threshold_still_blocks_flat_momentum() {
        let gate = RiskGate {
            required_momentum: 0,
            require_pattern_match: false,
            ..RiskGate::default()
        };
        let d = gate.evaluate(&ready_state(), &analysis(0), &TradingConfig::default());
        assert_eq!(d, GateDecision::Blocked(BlockReason::WeakMomentum { momentum: 0 }));
        let d = gate.evaluate(&ready_state(), &analysis(-1), &TradingConfig::default());
        assert_eq!(
            d,
            GateDecision::Blocked(BlockReason::SignalMismatch {
                signal: Signal::Neutral
            })
        );
    }

    #[test]
    fn pattern_required_between_two_and_four() {
        let gate = RiskGate::new();
        let d = gate.evaluate(&ready_state(), &analysis(3), &TradingConfig::default());
        assert_eq!(
            d,
            GateDecision::Blocked(BlockReason::PatternMismatch {
                pattern: Pattern::Neutral
            })
        );

        let lenient = RiskGate {
            require_pattern_match: false,
            ..RiskGate::default()
        };
        let d = lenient.evaluate(&ready_state(), &analysis(3), &TradingConfig::default());
        assert_eq!(d, GateDecision::Proceed(Direction::Call));
    }

    #[test]
    fn disagreeing_signal_blocks() {
        let gate = RiskGate::new();
        let a = TickAnalysis {
            momentum: 5,
            pattern: Pattern::BullishReversal,
            signal: Signal::Neutral,
        };
        assert_eq!(
            gate.evaluate(&ready_state(), &a, &TradingConfig::default()),
            GateDecision::Blocked(BlockReason::SignalMismatch {
                signal: Signal::Neutral
            })
        );
    }
}
