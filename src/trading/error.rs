use thiserror::Error;

use crate::models::Outcome;

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("invalid tick price: {0}")]
    InvalidPrice(f64),

    #[error("unknown position pos_{0}")]
    UnknownPosition(u64),

    #[error("position pos_{0} already settled")]
    AlreadySettled(u64),

    #[error("cannot settle a position as {0}")]
    InvalidOutcome(Outcome),
}
