use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, error, info, warn};

use crate::config::TradingConfig;
use crate::core::momentum::{analyze_tick, TickAnalysis};
use crate::core::risk_gate::{session_stop_reason, BlockReason, GateDecision, RiskGate};
use crate::core::stake::StakeSizer;
use crate::models::{Outcome, Position, SessionState, StopReason};
use crate::trading::error::SessionError;
use crate::trading::resolver::{next_escalation, ResolutionTicket, Settlement, TradeResolver};

const HISTORY_LIMIT: usize = 500;

/// What a tick led to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TickAction {
    /// Session disarmed; analysis only.
    Observed,
    Blocked { reason: BlockReason },
    Halted { reason: StopReason },
    Unaffordable { stake: f64, reserve: f64 },
    Placed { ticket: ResolutionTicket },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub price: f64,
    pub analysis: TickAnalysis,
    pub action: TickAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub settlement: Settlement,
    pub escalation_level: u32,
    pub balance: f64,
    /// Set when this settlement tripped a session stop.
    pub halted: Option<StopReason>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub net_pnl: f64,
    /// Sum of winning P&L.
    pub gross_win: f64,
    /// Sum of losing P&L, negative.
    pub gross_loss: f64,
    pub largest_stake: f64,
}

impl SessionStats {
    pub fn win_rate(&self) -> f64 {
        if self.trades > 0 {
            self.wins as f64 / self.trades as f64 * 100.0
        } else {
            0.0
        }
    }

    pub fn avg_win(&self) -> f64 {
        if self.wins > 0 {
            self.gross_win / self.wins as f64
        } else {
            0.0
        }
    }

    pub fn avg_loss(&self) -> f64 {
        if self.losses > 0 {
            self.gross_loss / self.losses as f64
        } else {
            0.0
        }
    }
}

/// Read-only view for renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub analysis: Option<TickAnalysis>,
    pub state: SessionState,
    pub stats: SessionStats,
    pub pending: Vec<Position>,
}

/// Owns the session state machine: Disarmed until `start`, Armed until `stop`
/// or a session-stop condition.
pub struct TradingSession {
    config: TradingConfig,
    state: SessionState,
    gate: RiskGate,
    sizer: StakeSizer,
    resolver: TradeResolver,
    pending: BTreeMap<u64, Position>,
    history: VecDeque<Position>,
    stats: SessionStats,
    last_analysis: Option<TickAnalysis>,
}

impl TradingSession {
    pub fn new(config: TradingConfig) -> Self {
        Self::restore(config, SessionState::default())
    }

    /// Rebuild a session around a previously captured state.
    ///
    /// Pending positions are not part of `SessionState`, so any open count in
    /// the snapshot is dropped: those positions can no longer be settled here.
    pub fn restore(mut config: TradingConfig, mut state: SessionState) -> Self {
        for note in config.sanitize() {
            warn!("Config: {}", note);
        }
        if state.active_positions > 0 {
            warn!(
                "Discarding {} unsettled position(s) from restored state",
                state.active_positions
            );
            state.active_positions = 0;
        }
        let resolver = TradeResolver::new(config.sl_proximity_percent);
        Self {
            config,
            state,
            gate: RiskGate::default(),
            sizer: StakeSizer::default(),
            resolver,
            pending: BTreeMap::new(),
            history: VecDeque::new(),
            stats: SessionStats::default(),
            last_analysis: None,
        }
    }

    pub fn config(&self) -> &TradingConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state.is_trading
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn pending(&self) -> impl Iterator<Item = &Position> {
        self.pending.values()
    }

    pub fn position(&self, id: u64) -> Option<&Position> {
        self.pending
            .get(&id)
            .or_else(|| self.history.iter().rev().find(|p| p.id == id))
    }

    /// Most recent settled positions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Position> {
        self.history.iter()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            analysis: self.last_analysis,
            state: self.state.clone(),
            stats: self.stats.clone(),
            pending: self.pending.values().cloned().collect(),
        }
    }

    pub fn start(&mut self) {
        self.state.is_trading = true;
        self.state.escalation_level = 0;
        self.state.ticks_since_last_trade = self.gate.cooldown_ticks;
        self.state.last_trade_at = None;
        self.state.stop_reason = None;
        info!("Trading STARTED (simulation mode).");
    }

    pub fn stop(&mut self) {
        if self.state.is_trading {
            info!("Trading STOPPED.");
        }
        self.state.is_trading = false;
    }

    pub fn on_balance(&mut self, amount: f64) {
        if !amount.is_finite() {
            warn!("Ignoring non-finite balance update");
            return;
        }
        self.state.balance = amount;
        debug!("Balance: {:.2}", amount);
    }

    pub fn on_tick(&mut self, price: f64, now: DateTime<Utc>) -> Result<TickReport, SessionError> {
        if !(price.is_finite() && price > 0.0) {
            return Err(SessionError::InvalidPrice(price));
        }

        self.state.ticks_since_last_trade = self.state.ticks_since_last_trade.saturating_add(1);
        let analysis = analyze_tick(self.state.previous_price, self.state.momentum, price);
        self.state.momentum = analysis.momentum;
        self.last_analysis = Some(analysis);

        let action = if self.state.is_trading {
            self.decide(price, &analysis, now)
        } else {
            TickAction::Observed
        };

        self.state.previous_price = Some(price);
        Ok(TickReport {
            price,
            analysis,
            action,
        })
    }

    fn decide(&mut self, price: f64, analysis: &TickAnalysis, now: DateTime<Utc>) -> TickAction {
        let direction = match self.gate.evaluate(&self.state, analysis, &self.config) {
            GateDecision::Proceed(direction) => direction,
            GateDecision::Halt(reason) => {
                self.halt(reason);
                return TickAction::Halted { reason };
            }
            GateDecision::Blocked(reason) => return TickAction::Blocked { reason },
        };

        let quote = self
            .sizer
            .quote(self.state.escalation_level, &self.config, self.state.balance);
        if !quote.affordable {
            warn!(
                "Insufficient usable balance for stake ${:.4}, skipping trade.",
                quote.stake
            );
            return TickAction::Unaffordable {
                stake: quote.stake,
                reserve: quote.reserve,
            };
        }

        let (position, ticket) =
            self.resolver
                .open(direction, quote.stake, price, analysis.momentum, now);
        info!(
            "Simulated {} | stake ${:.4} | entry {:.5} | tp {:.5} | sl {:.5}",
            position.direction,
            position.stake,
            position.entry_price,
            position.take_profit,
            position.stop_loss
        );

        self.pending.insert(position.id, position);
        self.state.active_positions += 1;
        self.state.ticks_since_last_trade = 0;
        self.state.last_trade_at = Some(now);

        TickAction::Placed { ticket }
    }

    /// Apply the outcome of a pending position. Runs whether or not the session
    /// is still armed.
    pub fn resolve(
        &mut self,
        position_id: u64,
        outcome: Outcome,
        now: DateTime<Utc>,
    ) -> Result<SettlementReport, SessionError> {
        let position = match self.pending.get_mut(&position_id) {
            Some(p) => p,
            None if self.history.iter().any(|p| p.id == position_id) => {
                return Err(SessionError::AlreadySettled(position_id));
            }
            None => return Err(SessionError::UnknownPosition(position_id)),
        };

        let settlement = self.resolver.settle(position, outcome, now)?;
        let label = position.label();
        self.stats.largest_stake = self.stats.largest_stake.max(position.stake);

        match settlement.outcome {
            Outcome::Win => {
                self.state.cumulative_profit += settlement.pnl;
                self.stats.wins += 1;
                self.stats.gross_win += settlement.pnl;
                info!("WIN {}: +${:.4}", label, settlement.pnl);
            }
            _ => {
                self.state.cumulative_loss += -settlement.pnl;
                self.stats.losses += 1;
                self.stats.gross_loss += settlement.pnl;
                warn!("LOSS {}: -${:.4}", label, -settlement.pnl);
            }
        }
        self.state.escalation_level = next_escalation(
            self.state.escalation_level,
            settlement.outcome,
            self.config.martingale_cap,
        );
        self.state.balance += settlement.pnl;
        self.state.active_positions = self.state.active_positions.saturating_sub(1);
        self.stats.trades += 1;
        self.stats.net_pnl += settlement.pnl;

        if let Some(closed) = self.pending.remove(&position_id) {
            self.history.push_back(closed);
            if self.history.len() > HISTORY_LIMIT {
                self.history.pop_front();
            }
        }

        let halted = match session_stop_reason(
            self.state.cumulative_profit,
            self.state.cumulative_loss,
            &self.config,
        ) {
            Some(reason) if self.state.is_trading => {
                self.halt(reason);
                Some(reason)
            }
            _ => None,
        };

        Ok(SettlementReport {
            settlement,
            escalation_level: self.state.escalation_level,
            balance: self.state.balance,
            halted,
        })
    }

    fn halt(&mut self, reason: StopReason) {
        match reason {
            StopReason::ProfitTarget => warn!(
                "Session profit target reached ({:.2} >= {:.2}), stopping trading.",
                self.state.cumulative_profit, self.config.session_profit_target
            ),
            StopReason::MaxDrawdown => error!(
                "Session drawdown limit reached ({:.2} >= {:.2}), stopping trading.",
                self.state.cumulative_loss, self.config.session_max_drawdown
            ),
        }
        self.state.stop_reason = Some(reason);
        self.stop();
    }
}
