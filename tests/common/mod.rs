use std::collections::HashMap;

use deriv_momentum_bot::config::Config;

/// Replay config with round stakes and a large balance, plus overrides.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("DERIV_API_TOKEN", "test-token"),
        ("MIN_STAKE", "1"),
        ("MAX_STAKE", "10"),
        ("MARTINGALE_CAP", "3"),
        ("INITIAL_BALANCE", "1000"),
        ("TICK_INTERVAL_MS", "1000"),
        ("REPLAY_SEED", "7"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }

    Config::from_lookup(|key| vars.get(key).cloned())
}

/// `n` strictly increasing prices. Trades land on ticks 5, 10, 15, ...
pub fn rising_prices(n: usize, start: f64) -> Vec<f64> {
    (0..n).map(|i| start + i as f64 * 0.25).collect()
}

/// Alternating up/down prices; momentum never leaves [-1, 1].
pub fn choppy_prices(n: usize, start: f64) -> Vec<f64> {
    (0..n)
        .map(|i| if i % 2 == 0 { start } else { start + 0.5 })
        .collect()
}
