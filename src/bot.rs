use anyhow::{bail, Result};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use deriv_momentum_bot::config::Config;
use deriv_momentum_bot::exchange::{FeedError, FeedEvent, TickFeed};
use deriv_momentum_bot::trading::resolver::{draw_delay, draw_outcome};
use deriv_momentum_bot::trading::{ResolutionTicket, TickAction, TradingSession};

/// Upper bound on waiting for in-flight positions at shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(2);

/// Why a connected session ended.
enum Exit {
    Shutdown,
    Disconnected(FeedError),
}

/// Operator controls read from stdin, one per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Stop,
    Status,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Command::Start),
            "stop" => Some(Command::Stop),
            "status" => Some(Command::Status),
            _ => None,
        }
    }
}

fn spawn_console(tx: mpsc::UnboundedSender<Command>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match Command::parse(&line) {
                Some(cmd) => {
                    if tx.send(cmd).is_err() {
                        break;
                    }
                }
                None if !line.trim().is_empty() => {
                    warn!("Unknown command {:?} (start | stop | status)", line.trim());
                }
                None => {}
            }
        }
    });
}

pub struct LiveBot {
    config: Config,
    feed: Box<dyn TickFeed>,
    session: TradingSession,
    rng: StdRng,
    resolution_tx: mpsc::UnboundedSender<ResolutionTicket>,
    resolution_rx: mpsc::UnboundedReceiver<ResolutionTicket>,
    command_tx: Option<mpsc::UnboundedSender<Command>>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    auto_started: bool,
}

impl LiveBot {
    pub fn new(config: Config, feed: Box<dyn TickFeed>) -> Self {
        let trading = &config.trading;

        info!("{}", "=".repeat(60));
        info!("Deriv momentum bot starting up");
        info!("Mode: SIMULATION (no contracts are placed)");
        info!("Endpoint: {}", config.endpoint());
        info!("Symbol: {}", config.symbol);
        info!(
            "Stake: ${:.2}..${:.2} | martingale cap {}",
            trading.min_stake, trading.max_stake, trading.martingale_cap
        );
        info!(
            "Session target: {} | max drawdown: {}",
            trading.session_profit_target, trading.session_max_drawdown
        );
        info!("{}", "=".repeat(60));

        let session = TradingSession::new(trading.clone());
        let (resolution_tx, resolution_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        Self {
            config,
            feed,
            session,
            rng: StdRng::from_entropy(),
            resolution_tx,
            resolution_rx,
            command_tx: Some(command_tx),
            command_rx,
            auto_started: false,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        info!("Bot is now running. Press Ctrl+C to stop.");
        info!("Console commands: start | stop | status");
        if let Some(tx) = self.command_tx.take() {
            spawn_console(tx);
        }

        let initial = Duration::from_secs(self.config.reconnect_initial_secs.max(1));
        let max_delay = Duration::from_secs(self.config.reconnect_max_secs).max(initial);
        let mut delay = initial;

        loop {
            match self.feed.connect().await {
                Ok(()) => {
                    delay = initial;
                    match self.pump().await {
                        Exit::Shutdown => break,
                        Exit::Disconnected(e) => warn!("Connection lost: {}", e),
                    }
                }
                Err(FeedError::MissingToken) => bail!("DERIV_API_TOKEN is not set"),
                Err(e) => warn!("Connect failed: {}", e),
            }
            self.feed.disconnect().await;

            info!("Reconnecting in {}s...", delay.as_secs());
            if self.wait_settling(delay).await {
                break;
            }
            delay = (delay * 2).min(max_delay);
        }

        self.shutdown().await;
        Ok(())
    }

    /// Process events until the connection drops or Ctrl+C.
    async fn pump(&mut self) -> Exit {
        let period = Duration::from_secs(self.config.balance_poll_secs.max(1));
        let mut balance_timer = tokio::time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => return Exit::Shutdown,
                event = self.feed.next_event() => match event {
                    Ok(event) => {
                        if let Err(e) = self.handle_event(event).await {
                            return Exit::Disconnected(e);
                        }
                    }
                    Err(e) => return Exit::Disconnected(e),
                },
                Some(ticket) = self.resolution_rx.recv() => self.settle(ticket),
                Some(cmd) = self.command_rx.recv() => self.handle_command(cmd),
                _ = balance_timer.tick() => {
                    if let Err(e) = self.feed.request_balance().await {
                        return Exit::Disconnected(e);
                    }
                }
            }
        }
    }

    /// Sleep out a reconnect delay while still settling positions. Returns true
    /// on Ctrl+C.
    async fn wait_settling(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                _ = tokio::signal::ctrl_c() => return true,
                Some(ticket) = self.resolution_rx.recv() => self.settle(ticket),
                Some(cmd) = self.command_rx.recv() => self.handle_command(cmd),
            }
        }
    }

    async fn handle_event(&mut self, event: FeedEvent) -> Result<(), FeedError> {
        match event {
            FeedEvent::Authorized { login_id, email } => {
                info!(
                    "Authorized as {}{}",
                    login_id,
                    email.map(|e| format!(" ({})", e)).unwrap_or_default()
                );
                self.feed.request_balance().await?;
                self.feed.subscribe_ticks(&self.config.symbol).await?;
                if self.config.auto_start && !self.auto_started {
                    self.auto_started = true;
                    self.session.start();
                }
            }
            FeedEvent::Balance { amount, currency } => {
                self.session.on_balance(amount);
                info!(
                    "Balance: {:.2} {}",
                    amount,
                    currency.as_deref().unwrap_or("")
                );
            }
            FeedEvent::Tick { price, .. } => match self.session.on_tick(price, Utc::now()) {
                Ok(report) => {
                    debug!(
                        "Tick {:.5} | momentum {} | {} | {}",
                        price, report.analysis.momentum, report.analysis.pattern, report.analysis.signal
                    );
                    if let TickAction::Placed { ticket } = report.action {
                        self.log_position(ticket.position_id);
                        self.schedule(ticket);
                    }
                    if tracing::enabled!(tracing::Level::DEBUG) {
                        if let Ok(json) = serde_json::to_string(&self.session.snapshot()) {
                            debug!("Snapshot: {}", json);
                        }
                    }
                }
                Err(e) => warn!("Tick rejected: {}", e),
            },
            FeedEvent::ApiError { code, message } => {
                error!("API error {}: {}", code, message);
            }
        }
        Ok(())
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start if self.session.is_armed() => info!("Trading is already running."),
            Command::Start => self.session.start(),
            Command::Stop => self.session.stop(),
            Command::Status => self.print_status(),
        }
    }

    fn schedule(&mut self, ticket: ResolutionTicket) {
        let delay = draw_delay(&mut self.rng);
        let tx = self.resolution_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver only goes away at process exit.
            let _ = tx.send(ticket);
        });
    }

    fn settle(&mut self, ticket: ResolutionTicket) {
        let outcome = draw_outcome(&ticket, &mut self.rng);
        match self.session.resolve(ticket.position_id, outcome, Utc::now()) {
            Ok(report) => {
                debug!(
                    "Settled pos_{} | level {} | balance {:.4}",
                    ticket.position_id, report.escalation_level, report.balance
                );
                self.log_position(ticket.position_id);
            }
            Err(e) => warn!("Settlement failed: {}", e),
        }
    }

    fn log_position(&self, id: u64) {
        if let Some(json) = self
            .session
            .position(id)
            .and_then(|p| serde_json::to_string(p).ok())
        {
            debug!("Position: {}", json);
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down...");
        self.session.stop();

        let deadline = Instant::now() + SHUTDOWN_DRAIN;
        while self.session.state().active_positions > 0 {
            match tokio::time::timeout_at(deadline, self.resolution_rx.recv()).await {
                Ok(Some(ticket)) => self.settle(ticket),
                _ => break,
            }
        }
        if self.session.state().active_positions > 0 {
            warn!(
                "{} position(s) still pending at exit",
                self.session.state().active_positions
            );
        }

        self.feed.disconnect().await;
        self.print_status();
        info!("Bot stopped.");
    }

    fn print_status(&self) {
        let state = self.session.state();
        let stats = self.session.stats();

        info!("Balance: ${:.2}", state.balance);
        info!(
            "Trades: {} | Win Rate: {:.1}%",
            stats.trades,
            stats.win_rate()
        );
        info!(
            "PnL: ${:+.4} (profit {:.4} / loss {:.4})",
            state.net_pnl(),
            state.cumulative_profit,
            state.cumulative_loss
        );
        info!("Escalation level: {}", state.escalation_level);
        if let Some(reason) = state.stop_reason {
            info!("Stopped by: {}", reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_console_commands() {
        assert_eq!(Command::parse("start"), Some(Command::Start));
        assert_eq!(Command::parse("  STOP \n"), Some(Command::Stop));
        assert_eq!(Command::parse("Status"), Some(Command::Status));
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("buy"), None);
    }
}
