use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::models::StopReason;
use crate::trading::TradingSession;

/// Tallies the replay loop collects alongside the session.
#[derive(Debug, Clone, Default)]
pub struct ReplayCounters {
    pub ticks: usize,
    pub signals: usize,
    pub unaffordable: usize,
    pub blocked: HashMap<String, usize>,
    pub max_escalation: u32,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
}

#[derive(Debug, Clone)]
pub struct BacktestReport {
    // Period
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub minutes: f64,

    // Performance
    pub initial_balance: f64,
    pub final_balance: f64,
    pub total_pnl: f64,
    pub total_return_pct: f64,
    pub cumulative_profit: f64,
    pub cumulative_loss: f64,

    // Trades
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_factor: f64,
    pub largest_stake: f64,
    pub max_escalation: u32,

    // Risk
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub stop_reason: Option<StopReason>,

    // Signals
    pub ticks: usize,
    pub total_signals: usize,
    pub unaffordable: usize,
    pub blocked: HashMap<String, usize>,

    // Equity curve
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
}

impl BacktestReport {
    pub fn from_session(
        session: &TradingSession,
        initial_balance: f64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        counters: ReplayCounters,
        equity_curve: Vec<(DateTime<Utc>, f64)>,
    ) -> Self {
        let state = session.state();
        let stats = session.stats();
        let final_balance = state.balance;
        let total_pnl = stats.net_pnl;
        let minutes = (end - start).num_seconds() as f64 / 60.0;

        let profit_factor = if state.cumulative_loss > 0.0 {
            state.cumulative_profit / state.cumulative_loss
        } else if state.cumulative_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        BacktestReport {
            start,
            end,
            minutes,
            initial_balance,
            final_balance,
            total_pnl,
            total_return_pct: if initial_balance > 0.0 {
                total_pnl / initial_balance * 100.0
            } else {
                0.0
            },
            cumulative_profit: state.cumulative_profit,
            cumulative_loss: state.cumulative_loss,
            total_trades: stats.trades,
            winning_trades: stats.wins,
            losing_trades: stats.losses,
            win_rate: stats.win_rate(),
            avg_win: stats.avg_win(),
            avg_loss: stats.avg_loss(),
            profit_factor,
            largest_stake: stats.largest_stake,
            max_escalation: counters.max_escalation,
            max_drawdown: counters.max_drawdown,
            max_drawdown_pct: counters.max_drawdown_pct,
            stop_reason: state.stop_reason,
            ticks: counters.ticks,
            total_signals: counters.signals,
            unaffordable: counters.unaffordable,
            blocked: counters.blocked,
            equity_curve,
        }
    }

    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(70));
        println!("  REPLAY REPORT");
        println!("{}", "=".repeat(70));
        println!(
            "  Period:      {} to {} ({:.1} min)",
            self.start.format("%Y-%m-%d %H:%M:%S"),
            self.end.format("%Y-%m-%d %H:%M:%S"),
            self.minutes
        );
        println!();
        println!("  PERFORMANCE");
        println!("  ───────────────────────────────────");
        println!("  Initial:     ${:.2}", self.initial_balance);
        println!("  Final:       ${:.2}", self.final_balance);
        println!("  PnL:         ${:+.4}", self.total_pnl);
        println!("  Return:      {:+.2}%", self.total_return_pct);
        println!("  Profit:      ${:.4}", self.cumulative_profit);
        println!("  Loss:        ${:.4}", self.cumulative_loss);
        println!();
        println!("  TRADES");
        println!("  ───────────────────────────────────");
        println!("  Total:       {}", self.total_trades);
        println!(
            "  Win/Loss:    {} / {}",
            self.winning_trades, self.losing_trades
        );
        println!("  Win Rate:    {:.1}%", self.win_rate);
        println!("  Avg Win:     ${:+.4}", self.avg_win);
        println!("  Avg Loss:    ${:+.4}", self.avg_loss);
        println!("  Max Stake:   ${:.4}", self.largest_stake);
        println!("  Max Level:   {}", self.max_escalation);
        println!("  Profit Factor: {:.2}", self.profit_factor);
        println!();
        println!("  RISK");
        println!("  ───────────────────────────────────");
        println!("  Max DD:      ${:.4} ({:.2}%)", self.max_drawdown, self.max_drawdown_pct);
        match self.stop_reason {
            Some(reason) => println!("  Stopped:     {}", reason),
            None => println!("  Stopped:     no"),
        }
        println!();
        println!("  SIGNALS");
        println!("  ───────────────────────────────────");
        println!("  Ticks:       {}", self.ticks);
        println!("  Generated:   {}", self.total_signals);
        println!("  Unaffordable: {}", self.unaffordable);
        println!(
            "  Conversion:  {:.1}%",
            if self.total_signals > 0 {
                self.total_trades as f64 / self.total_signals as f64 * 100.0
            } else {
                0.0
            }
        );

        if !self.blocked.is_empty() {
            println!();
            println!("  BLOCKED");
            println!("  ───────────────────────────────────");
            let mut reasons: Vec<_> = self.blocked.iter().collect();
            reasons.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (reason, count) in reasons {
                println!("  {:>8}  {}", count, reason);
            }
        }

        println!("{}", "=".repeat(70));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Outcome, SessionState};
    use crate::test_helpers::{armed_state, test_trading_config};

    #[test]
    fn report_reflects_session_totals() {
        let state = SessionState {
            balance: 100.0,
            momentum: 5,
            previous_price: Some(100.0),
            ..armed_state()
        };
        let mut session = TradingSession::restore(test_trading_config(), state);
        let now = Utc::now();
        let report = session.on_tick(100.0, now).unwrap();
        let ticket = match report.action {
            crate::trading::TickAction::Placed { ticket } => ticket,
            other => panic!("expected a placement, got {:?}", other),
        };
        session.resolve(ticket.position_id, Outcome::Loss, now).unwrap();

        let counters = ReplayCounters {
            ticks: 1,
            signals: 1,
            ..Default::default()
        };
        let report = BacktestReport::from_session(&session, 100.0, now, now, counters, Vec::new());
        assert_eq!(report.total_trades, 1);
        assert_eq!(report.losing_trades, 1);
        assert!((report.total_pnl + 1.0).abs() < 1e-9);
        assert!((report.total_return_pct + 1.0).abs() < 1e-9);
        assert!((report.avg_loss + 1.0).abs() < 1e-9);
        assert_eq!(report.profit_factor, 0.0);
        assert!((report.largest_stake - 1.0).abs() < 1e-12);
    }
}
