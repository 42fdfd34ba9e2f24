use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::Write;
use tracing_subscriber::{fmt, EnvFilter};

use deriv_momentum_bot::backtesting::{BacktestReport, BacktestRunner};
use deriv_momentum_bot::config::Config;
use deriv_momentum_bot::exchange::ReplayFeed;

const SYNTHETIC_TICKS: usize = 5_000;
const SYNTHETIC_START: f64 = 1_000.0;

#[tokio::main]
async fn main() -> Result<()> {
    let mut cfg = Config::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    // replay [PRICES_FILE] [SEED]
    let args: Vec<String> = std::env::args().collect();

    let prices_file = args.get(1).filter(|s| !s.is_empty() && s.as_str() != "-");

    if let Some(seed) = args.get(2).and_then(|s| s.parse().ok()) {
        cfg.replay_seed = seed;
    }
    cfg.auto_start = true;

    let feed = match prices_file {
        Some(path) => ReplayFeed::from_file(path, cfg.initial_balance)?,
        None => {
            let mut rng = StdRng::seed_from_u64(cfg.replay_seed);
            ReplayFeed::random_walk(&mut rng, SYNTHETIC_TICKS, SYNTHETIC_START, cfg.initial_balance)
        }
    };

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║          DERIV MOMENTUM BOT, TICK REPLAY                 ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║  Symbol:     {:<44}║", cfg.symbol);
    println!(
        "║  Source:     {:<44}║",
        prices_file.map(String::as_str).unwrap_or("synthetic walk")
    );
    println!("║  Ticks:      {:<44}║", feed.remaining());
    println!("║  Seed:       {:<44}║", cfg.replay_seed);
    println!("║  Balance:    ${:<43.2}║", cfg.initial_balance);
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    let mut runner = BacktestRunner::new(feed, cfg);
    let report = runner.run().await?;

    report.print_summary();

    std::fs::create_dir_all("data")?;
    let report_file = format!("data/replay_seed{}.txt", runner.config.replay_seed);
    save_report_to_file(&report, &report_file)?;
    println!("\nReport saved to: {}", report_file);

    Ok(())
}

fn save_report_to_file(report: &BacktestReport, path: &str) -> Result<()> {
    let mut f = std::fs::File::create(path)?;

    writeln!(f, "Deriv Momentum Bot Replay Report")?;
    writeln!(f, "================================")?;
    writeln!(f, "Ticks: {} ({:.1} min)", report.ticks, report.minutes)?;
    writeln!(f)?;
    writeln!(f, "Performance:")?;
    writeln!(f, "  Initial:  ${:.2}", report.initial_balance)?;
    writeln!(f, "  Final:    ${:.2}", report.final_balance)?;
    writeln!(f, "  PnL:      ${:+.4}", report.total_pnl)?;
    writeln!(f, "  Return:   {:+.2}%", report.total_return_pct)?;
    writeln!(f)?;
    writeln!(f, "Trades:")?;
    writeln!(f, "  Total:       {}", report.total_trades)?;
    writeln!(f, "  Win/Loss:    {} / {}", report.winning_trades, report.losing_trades)?;
    writeln!(f, "  Win Rate:    {:.1}%", report.win_rate)?;
    writeln!(f, "  Max Level:   {}", report.max_escalation)?;
    writeln!(f, "  Profit Factor: {:.2}", report.profit_factor)?;
    writeln!(f)?;
    writeln!(f, "Risk:")?;
    writeln!(f, "  Max DD:    ${:.4} ({:.2}%)", report.max_drawdown, report.max_drawdown_pct)?;
    if let Some(reason) = report.stop_reason {
        writeln!(f, "  Stopped:   {}", reason)?;
    }
    writeln!(f)?;
    writeln!(f, "Signals:")?;
    writeln!(f, "  Generated:    {}", report.total_signals)?;
    writeln!(f, "  Unaffordable: {}", report.unaffordable)?;
    for (reason, count) in &report.blocked {
        writeln!(f, "  Blocked ({}): {}", reason, count)?;
    }

    Ok(())
}
