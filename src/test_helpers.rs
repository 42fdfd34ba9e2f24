use crate::config::TradingConfig;
use crate::core::risk_gate::COOLDOWN_TICKS;
use crate::models::SessionState;

/// Round stake limits with no session stops.
pub fn test_trading_config() -> TradingConfig {
    TradingConfig {
        min_stake: 1.0,
        max_stake: 10.0,
        martingale_cap: 3,
        session_profit_target: f64::INFINITY,
        session_max_drawdown: f64::INFINITY,
        sl_proximity_percent: 98.0,
    }
}

/// Armed with the cooldown already elapsed.
pub fn armed_state() -> SessionState {
    SessionState {
        is_trading: true,
        ticks_since_last_trade: COOLDOWN_TICKS,
        ..SessionState::default()
    }
}

/// `n` strictly increasing prices starting at `start`.
pub fn rising_prices(n: usize, start: f64) -> Vec<f64> {
    (0..n).map(|i| start + i as f64 * 0.5).collect()
}

pub fn falling_prices(n: usize, start: f64) -> Vec<f64> {
    (0..n).map(|i| start - i as f64 * 0.5).collect()
}
