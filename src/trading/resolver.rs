use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::{Direction, Outcome, Position};
use crate::trading::error::SessionError;

/// Take-profit reference sits this fraction of entry away in the trade's favour.
pub const TAKE_PROFIT_FRACTION: f64 = 0.0005;
/// A win pays this fraction of the stake; a loss forfeits the whole stake.
pub const WIN_PAYOUT: f64 = 0.05;

const BASE_WIN_PROBABILITY: f64 = 0.48;
const MAX_WIN_BOOST: f64 = 0.20;
const FULL_STRENGTH_MOMENTUM: f64 = 6.0;
const MAX_WIN_PROBABILITY: f64 = 0.98;

pub const MIN_RESOLUTION_DELAY_MS: u64 = 100;
pub const MAX_RESOLUTION_DELAY_MS: u64 = 800;

/// Everything needed to settle a position, captured by value at decision time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionTicket {
    pub position_id: u64,
    pub direction: Direction,
    pub stake: f64,
    pub momentum_at_entry: i32,
    pub win_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub position_id: u64,
    pub outcome: Outcome,
    pub pnl: f64,
}

/// Returns `(take_profit, stop_loss)` reference prices.
///
/// These are recorded for observability only; positions resolve on a timer,
/// not by price crossing.
pub fn protective_levels(direction: Direction, entry_price: f64, sl_proximity_percent: f64) -> (f64, f64) {
    let tp_offset = entry_price * TAKE_PROFIT_FRACTION;
    let sl_offset = entry_price * ((100.0 - sl_proximity_percent) / 10_000.0);
    let sign = direction.sign();
    (entry_price + sign * tp_offset, entry_price - sign * sl_offset)
}

pub fn win_probability(momentum_at_entry: i32) -> f64 {
    let strength = (f64::from(momentum_at_entry.abs()) / FULL_STRENGTH_MOMENTUM).min(1.0);
    (BASE_WIN_PROBABILITY + MAX_WIN_BOOST * strength).min(MAX_WIN_PROBABILITY)
}

pub fn settlement_pnl(stake: f64, outcome: Outcome) -> f64 {
    match outcome {
        Outcome::Win => stake * WIN_PAYOUT,
        Outcome::Loss => -stake,
        Outcome::Pending => 0.0,
    }
}

/// Escalation after a settled trade: reset on a win, +1 up to `cap` on a loss.
pub fn next_escalation(level: u32, outcome: Outcome, cap: u32) -> u32 {
    match outcome {
        Outcome::Win => 0,
        Outcome::Loss => level.saturating_add(1).min(cap),
        Outcome::Pending => level,
    }
}

pub fn draw_delay<R: Rng + ?Sized>(rng: &mut R) -> Duration {
    Duration::from_millis(rng.gen_range(MIN_RESOLUTION_DELAY_MS..MAX_RESOLUTION_DELAY_MS))
}

pub fn draw_outcome<R: Rng + ?Sized>(ticket: &ResolutionTicket, rng: &mut R) -> Outcome {
    if rng.gen::<f64>() < ticket.win_probability {
        Outcome::Win
    } else {
        Outcome::Loss
    }
}

/// Opens simulated positions and settles them exactly once.
#[derive(Debug, Clone)]
pub struct TradeResolver {
    next_id: u64,
    sl_proximity_percent: f64,
}

impl TradeResolver {
    pub fn new(sl_proximity_percent: f64) -> Self {
        Self {
            next_id: 0,
            sl_proximity_percent,
        }
    }

    pub fn open(
        &mut self,
        direction: Direction,
        stake: f64,
        entry_price: f64,
        momentum_at_entry: i32,
        now: DateTime<Utc>,
    ) -> (Position, ResolutionTicket) {
        self.next_id += 1;
        let id = self.next_id;
        let (take_profit, stop_loss) =
            protective_levels(direction, entry_price, self.sl_proximity_percent);
        let win_probability = win_probability(momentum_at_entry);

        let position = Position {
            id,
            direction,
            stake,
            entry_price,
            take_profit,
            stop_loss,
            momentum_at_entry,
            win_probability,
            opened_at: now,
            outcome: Outcome::Pending,
            resolved_at: None,
            pnl: 0.0,
        };
        let ticket = ResolutionTicket {
            position_id: id,
            direction,
            stake,
            momentum_at_entry,
            win_probability,
        };
        (position, ticket)
    }

    /// Write the outcome onto a pending position.
    pub fn settle(
        &self,
        position: &mut Position,
        outcome: Outcome,
        now: DateTime<Utc>,
    ) -> Result<Settlement, SessionError> {
        if outcome == Outcome::Pending {
            return Err(SessionError::InvalidOutcome(outcome));
        }
        if !position.is_pending() {
            return Err(SessionError::AlreadySettled(position.id));
        }

        let pnl = settlement_pnl(position.stake, outcome);
        position.outcome = outcome;
        position.pnl = pnl;
        position.resolved_at = Some(now);

        Ok(Settlement {
            position_id: position.id,
            outcome,
            pnl,
        })
    }
}
