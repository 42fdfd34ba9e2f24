use serde::{Deserialize, Serialize};

pub const DEFAULT_APP_ID: &str = "1089";
pub const DEFAULT_WS_URL: &str = "wss://ws.derivws.com/websockets/v3";
pub const DEFAULT_SYMBOL: &str = "R_100";

const DEFAULT_MIN_STAKE: f64 = 0.01;
const DEFAULT_MAX_STAKE: f64 = 5.0;
const DEFAULT_MARTINGALE_CAP: u32 = 5;
const DEFAULT_SL_PROXIMITY: f64 = 98.0;

/// The options a session reads once at construction and never mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingConfig {
    pub min_stake: f64,
    pub max_stake: f64,
    pub martingale_cap: u32,
    /// `f64::INFINITY` when no target is configured.
    pub session_profit_target: f64,
    /// `f64::INFINITY` when no limit is configured.
    pub session_max_drawdown: f64,
    /// Percent in (0, 100]. Higher values put the stop-loss reference closer to entry.
    pub sl_proximity_percent: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            min_stake: DEFAULT_MIN_STAKE,
            max_stake: DEFAULT_MAX_STAKE,
            martingale_cap: DEFAULT_MARTINGALE_CAP,
            session_profit_target: f64::INFINITY,
            session_max_drawdown: f64::INFINITY,
            sl_proximity_percent: DEFAULT_SL_PROXIMITY,
        }
    }
}

impl TradingConfig {
    /// Build from an arbitrary key lookup. Missing or non-numeric values fall
    /// back to defaults instead of failing. Range checks happen in [`sanitize`].
    ///
    /// [`sanitize`]: TradingConfig::sanitize
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let num = |key: &str| -> Option<f64> {
            lookup(key)
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };

        Self {
            min_stake: num("MIN_STAKE").unwrap_or(DEFAULT_MIN_STAKE),
            max_stake: num("MAX_STAKE").unwrap_or(DEFAULT_MAX_STAKE),
            martingale_cap: lookup("MARTINGALE_CAP")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_MARTINGALE_CAP),
            session_profit_target: num("SESSION_PROFIT_TARGET").unwrap_or(f64::INFINITY),
            session_max_drawdown: num("SESSION_MAX_DRAWDOWN").unwrap_or(f64::INFINITY),
            sl_proximity_percent: num("SL_PROXIMITY").unwrap_or(DEFAULT_SL_PROXIMITY),
        }
    }

    /// Coerce out-of-range values to safe fallbacks. Returns one note per
    /// adjustment so the caller can log them once logging is up.
    pub fn sanitize(&mut self) -> Vec<String> {
        let mut notes = Vec::new();

        if !(self.min_stake.is_finite() && self.min_stake > 0.0) {
            notes.push(format!(
                "min_stake {} is not positive, using {}",
                self.min_stake, DEFAULT_MIN_STAKE
            ));
            self.min_stake = DEFAULT_MIN_STAKE;
        }
        if !(self.max_stake.is_finite() && self.max_stake > 0.0) {
            notes.push(format!(
                "max_stake {} is not positive, using {}",
                self.max_stake, DEFAULT_MAX_STAKE
            ));
            self.max_stake = DEFAULT_MAX_STAKE;
        }
        if self.max_stake < self.min_stake {
            notes.push(format!(
                "max_stake {} is below min_stake {}, raising it",
                self.max_stake, self.min_stake
            ));
            self.max_stake = self.min_stake;
        }
        // Zero, negative and NaN all mean "no limit".
        if !(self.session_profit_target > 0.0) {
            notes.push("session profit target unset, treating as unbounded".to_string());
            self.session_profit_target = f64::INFINITY;
        }
        if !(self.session_max_drawdown > 0.0) {
            notes.push("session max drawdown unset, treating as unbounded".to_string());
            self.session_max_drawdown = f64::INFINITY;
        }
        if !(self.sl_proximity_percent > 0.0 && self.sl_proximity_percent <= 100.0) {
            notes.push(format!(
                "sl_proximity {} outside (0, 100], using {}",
                self.sl_proximity_percent, DEFAULT_SL_PROXIMITY
            ));
            self.sl_proximity_percent = DEFAULT_SL_PROXIMITY;
        }

        notes
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Connection
    pub app_id: String,
    pub ws_url: String,
    pub api_token: String,
    pub symbol: String,
    pub auto_start: bool,
    pub balance_poll_secs: u64,
    pub reconnect_initial_secs: u64,
    pub reconnect_max_secs: u64,
    pub connect_timeout_secs: u64,

    // Trading
    pub trading: TradingConfig,

    // Replay
    pub initial_balance: f64,
    pub tick_interval_ms: u64,
    pub replay_seed: u64,

    // Logging
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Config {
            app_id: env("DERIV_APP_ID", DEFAULT_APP_ID),
            ws_url: env("DERIV_WS_URL", DEFAULT_WS_URL),
            api_token: env("DERIV_API_TOKEN", "").trim().to_string(),
            symbol: env("SYMBOL", DEFAULT_SYMBOL),
            auto_start: env("AUTO_START", "true").to_lowercase() == "true",
            balance_poll_secs: env("BALANCE_POLL_SECS", "8").parse().unwrap_or(8).max(1),
            reconnect_initial_secs: env("RECONNECT_INITIAL_SECS", "1")
                .parse()
                .unwrap_or(1)
                .max(1),
            reconnect_max_secs: env("RECONNECT_MAX_SECS", "15").parse().unwrap_or(15).max(1),
            connect_timeout_secs: env("CONNECT_TIMEOUT_SECS", "10").parse().unwrap_or(10),
            trading: TradingConfig::from_lookup(&lookup),
            initial_balance: env("INITIAL_BALANCE", "1000").parse().unwrap_or(1000.0),
            tick_interval_ms: env("TICK_INTERVAL_MS", "1000").parse().unwrap_or(1000),
            replay_seed: env("REPLAY_SEED", "42").parse().unwrap_or(42),
            log_level: env("LOG_LEVEL", "info"),
        }
    }

    /// Endpoint with the app id query the API expects.
    pub fn endpoint(&self) -> String {
        format!("{}?app_id={}", self.ws_url, self.app_id)
    }
}
