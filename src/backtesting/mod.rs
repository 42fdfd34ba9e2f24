pub mod report;
pub mod runner;

pub use report::{BacktestReport, ReplayCounters};
pub use runner::BacktestRunner;
