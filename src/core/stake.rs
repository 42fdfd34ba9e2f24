use serde::{Deserialize, Serialize};

use crate::config::TradingConfig;

/// Stake multiplier per escalation level.
pub const GROWTH_FACTOR: f64 = 1.4;
/// Never risk more than this share of the balance on one position.
pub const MAX_BALANCE_FRACTION: f64 = 0.02;
/// Floor of the balance-fraction ceiling, so tiny balances still allow a micro stake.
pub const MIN_FRACTION_CAP: f64 = 0.01;
pub const MIN_RESERVE_FRACTION: f64 = 0.05;
pub const MIN_RESERVE_ABSOLUTE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StakeQuote {
    pub stake: f64,
    pub reserve: f64,
    pub affordable: bool,
}

/// Martingale-style sizing with a softened growth factor and balance caps.
#[derive(Debug, Clone)]
pub struct StakeSizer {
    pub growth_factor: f64,
    pub max_balance_fraction: f64,
    pub reserve_fraction: f64,
    pub reserve_absolute: f64,
}

impl Default for StakeSizer {
    fn default() -> Self {
        Self {
            growth_factor: GROWTH_FACTOR,
            max_balance_fraction: MAX_BALANCE_FRACTION,
            reserve_fraction: MIN_RESERVE_FRACTION,
            reserve_absolute: MIN_RESERVE_ABSOLUTE,
        }
    }
}

impl StakeSizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Escalated stake before any ceiling is applied.
    pub fn raw_stake(&self, min_stake: f64, escalation_level: u32) -> f64 {
        let exp = i32::try_from(escalation_level).unwrap_or(i32::MAX);
        min_stake * self.growth_factor.powi(exp)
    }

    pub fn stake(&self, escalation_level: u32, min_stake: f64, max_stake: f64, balance: f64) -> f64 {
        let fraction_cap = (balance * self.max_balance_fraction).max(MIN_FRACTION_CAP);
        self.raw_stake(min_stake, escalation_level)
            .min(max_stake)
            .min(fraction_cap)
            .max(0.0)
    }

    pub fn reserve(&self, balance: f64) -> f64 {
        (balance * self.reserve_fraction).max(self.reserve_absolute)
    }

    /// The stake must be positive, within `max_stake`, and leave the reserve untouched.
    pub fn is_affordable(&self, stake: f64, max_stake: f64, balance: f64) -> bool {
        fits_with_reserve(stake, self.reserve(balance), max_stake, balance)
    }

    pub fn quote(&self, escalation_level: u32, cfg: &TradingConfig, balance: f64) -> StakeQuote {
        let stake = self.stake(escalation_level, cfg.min_stake, cfg.max_stake, balance);
        StakeQuote {
            stake,
            reserve: self.reserve(balance),
            affordable: self.is_affordable(stake, cfg.max_stake, balance),
        }
    }
}

/// Affordability against an explicit reserve.
pub fn fits_with_reserve(stake: f64, reserve: f64, max_stake: f64, balance: f64) -> bool {
    if !(stake > 0.0) || stake > max_stake {
        return false;
    }
    stake + reserve <= balance
}
