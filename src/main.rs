mod bot;

use anyhow::{bail, Result};
use tracing_subscriber::{fmt, EnvFilter};

use deriv_momentum_bot::config::Config;
use deriv_momentum_bot::exchange::DerivClient;

use crate::bot::LiveBot;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    if cfg.api_token.trim().is_empty() {
        bail!("DERIV_API_TOKEN is not set; add it to the environment or .env");
    }

    let feed = Box::new(DerivClient::new(&cfg));
    let mut bot = LiveBot::new(cfg, feed);
    bot.run().await?;

    Ok(())
}
