use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::exchange::{FeedError, FeedEvent, TickFeed};
use crate::models::Outcome;
use crate::trading::resolver::{draw_delay, draw_outcome, ResolutionTicket};
use crate::trading::{TickAction, TradingSession};

use super::report::{BacktestReport, ReplayCounters};

/// A resolution waiting on the virtual clock.
#[derive(Debug, Clone)]
struct Scheduled {
    due: DateTime<Utc>,
    seq: u64,
    ticket: ResolutionTicket,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        (self.due, self.seq) == (other.due, other.seq)
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// Drives a `TradingSession` from a `TickFeed` on a virtual clock. Ticks are
/// spaced `tick_interval_ms` apart; trade resolutions are queued by due time and
/// settled before any later tick is processed.
pub struct BacktestRunner<F: TickFeed> {
    feed: F,
    pub config: Config,
    pub session: TradingSession,
    rng: StdRng,
    queue: BinaryHeap<Reverse<Scheduled>>,
    scripted: VecDeque<Outcome>,
    clock: DateTime<Utc>,
    seq: u64,
    counters: ReplayCounters,
}

impl<F: TickFeed> BacktestRunner<F> {
    pub fn new(feed: F, config: Config) -> Self {
        let session = TradingSession::new(config.trading.clone());
        let rng = StdRng::seed_from_u64(config.replay_seed);
        let clock = Utc
            .timestamp_opt(0, 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            feed,
            config,
            session,
            rng,
            queue: BinaryHeap::new(),
            scripted: VecDeque::new(),
            clock,
            seq: 0,
            counters: ReplayCounters::default(),
        }
    }

    /// Settle positions with these outcomes, in placement order, before falling
    /// back to random draws.
    pub fn with_scripted_outcomes(mut self, outcomes: Vec<Outcome>) -> Self {
        self.scripted = outcomes.into();
        self
    }

    pub async fn run(&mut self) -> Result<BacktestReport> {
        let start = self.clock;
        let tick_step = ChronoDuration::milliseconds(self.config.tick_interval_ms.max(1) as i64);
        let mut initial_balance = None;
        let mut equity_curve: Vec<(DateTime<Utc>, f64)> = Vec::new();
        let mut peak = f64::MIN;

        info!("=== REPLAY START ===");
        self.feed.connect().await?;

        loop {
            let event = match self.feed.next_event().await {
                Ok(event) => event,
                Err(FeedError::StreamEnded) => break,
                Err(e) => return Err(e.into()),
            };

            match event {
                FeedEvent::Authorized { login_id, .. } => {
                    info!("Authorized as {}", login_id);
                    self.feed.request_balance().await?;
                    let symbol = self.config.symbol.clone();
                    self.feed.subscribe_ticks(&symbol).await?;
                    if self.config.auto_start {
                        self.session.start();
                    }
                }
                FeedEvent::Balance { amount, .. } => {
                    self.session.on_balance(amount);
                    initial_balance.get_or_insert(amount);
                }
                FeedEvent::Tick { price, .. } => {
                    self.clock += tick_step;
                    self.settle_due(self.clock);
                    self.counters.ticks += 1;
                    self.handle_tick(price);

                    let equity = self.session.state().balance;
                    peak = peak.max(equity);
                    let drawdown = peak - equity;
                    if drawdown > self.counters.max_drawdown {
                        self.counters.max_drawdown = drawdown;
                        self.counters.max_drawdown_pct =
                            if peak > 0.0 { drawdown / peak * 100.0 } else { 0.0 };
                    }
                    equity_curve.push((self.clock, equity));

                    if !self.session.is_armed()
                        && self.session.state().stop_reason.is_some()
                        && self.queue.is_empty()
                    {
                        info!("Session halted, ending replay after {} ticks", self.counters.ticks);
                        break;
                    }
                }
                FeedEvent::ApiError { code, message } => {
                    warn!("API error {}: {}", code, message);
                }
            }
        }

        // Let in-flight positions settle.
        if let Some(horizon) = self.queue.iter().map(|Reverse(s)| s.due).max() {
            self.settle_due(horizon);
            self.clock = self.clock.max(horizon);
            equity_curve.push((self.clock, self.session.state().balance));
        }
        self.feed.disconnect().await;

        let initial = initial_balance.unwrap_or(self.config.initial_balance);
        let report = BacktestReport::from_session(
            &self.session,
            initial,
            start,
            self.clock,
            self.counters.clone(),
            equity_curve,
        );
        info!("=== REPLAY END ===");
        Ok(report)
    }

    fn handle_tick(&mut self, price: f64) {
        let report = match self.session.on_tick(price, self.clock) {
            Ok(r) => r,
            Err(e) => {
                warn!("Tick rejected: {}", e);
                return;
            }
        };

        match report.action {
            TickAction::Placed { ticket } => {
                self.counters.signals += 1;
                let due = self.clock
                    + ChronoDuration::from_std(draw_delay(&mut self.rng))
                        .unwrap_or_else(|_| ChronoDuration::zero());
                self.seq += 1;
                self.queue.push(Reverse(Scheduled {
                    due,
                    seq: self.seq,
                    ticket,
                }));
            }
            TickAction::Unaffordable { .. } => {
                self.counters.signals += 1;
                self.counters.unaffordable += 1;
            }
            TickAction::Blocked { reason } => {
                *self.counters.blocked.entry(reason.to_string()).or_default() += 1;
            }
            TickAction::Halted { reason } => {
                debug!("Halted: {}", reason);
            }
            TickAction::Observed => {}
        }
    }

    fn settle_due(&mut self, now: DateTime<Utc>) {
        while let Some(Reverse(next)) = self.queue.peek() {
            if next.due > now {
                break;
            }
            let Some(Reverse(scheduled)) = self.queue.pop() else {
                break;
            };
            let outcome = self
                .scripted
                .pop_front()
                .unwrap_or_else(|| draw_outcome(&scheduled.ticket, &mut self.rng));

            match self
                .session
                .resolve(scheduled.ticket.position_id, outcome, scheduled.due)
            {
                Ok(report) => {
                    self.counters.max_escalation =
                        self.counters.max_escalation.max(report.escalation_level);
                }
                Err(e) => warn!("Resolution failed: {}", e),
            }
        }
    }
}
