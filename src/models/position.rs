use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Direction, Outcome};

/// A simulated contract. Immutable after opening except for the settlement
/// fields, which are written exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: u64,
    pub direction: Direction,
    pub stake: f64,
    pub entry_price: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub momentum_at_entry: i32,
    pub win_probability: f64,
    pub opened_at: DateTime<Utc>,
    pub outcome: Outcome,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pnl: f64,
}

impl Position {
    pub fn label(&self) -> String {
        format!("pos_{}", self.id)
    }

    pub fn is_pending(&self) -> bool {
        self.outcome == Outcome::Pending
    }
}
