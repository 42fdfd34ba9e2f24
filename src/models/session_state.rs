use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::StopReason;

/// Mutable state of one trading session. Only `TradingSession` writes to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub is_trading: bool,
    pub balance: f64,
    pub cumulative_profit: f64,
    pub cumulative_loss: f64,
    pub active_positions: u32,
    pub escalation_level: u32,
    pub momentum: i32,
    pub previous_price: Option<f64>,
    pub ticks_since_last_trade: u32,
    #[serde(default)]
    pub last_trade_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            is_trading: false,
            balance: 0.0,
            cumulative_profit: 0.0,
            cumulative_loss: 0.0,
            active_positions: 0,
            escalation_level: 0,
            momentum: 0,
            previous_price: None,
            ticks_since_last_trade: 0,
            last_trade_at: None,
            stop_reason: None,
        }
    }
}

impl SessionState {
    pub fn net_pnl(&self) -> f64 {
        self.cumulative_profit - self.cumulative_loss
    }
}
