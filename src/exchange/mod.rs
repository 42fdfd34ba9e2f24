pub mod deriv;
pub mod replay;

pub use deriv::DerivClient;
pub use replay::ReplayFeed;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Inbound events from the brokerage connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    Authorized {
        login_id: String,
        #[serde(default)]
        email: Option<String>,
    },
    Balance {
        amount: f64,
        #[serde(default)]
        currency: Option<String>,
    },
    Tick {
        symbol: String,
        price: f64,
        epoch: i64,
    },
    ApiError {
        code: String,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("connection timeout")]
    Timeout,

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("stream ended")]
    StreamEnded,

    #[error("not connected")]
    NotConnected,

    #[error("no API token configured")]
    MissingToken,
}

/// Transport contract the trading loop depends on. Reconnection policy lives
/// with the caller; implementations only report faults.
#[async_trait]
pub trait TickFeed: Send {
    /// Open the connection and send the authorization request.
    async fn connect(&mut self) -> Result<(), FeedError>;
    async fn disconnect(&mut self);
    /// Next recognised event. Unknown messages are skipped internally.
    async fn next_event(&mut self) -> Result<FeedEvent, FeedError>;
    async fn request_balance(&mut self) -> Result<(), FeedError>;
    async fn subscribe_ticks(&mut self, symbol: &str) -> Result<(), FeedError>;
    fn is_connected(&self) -> bool;
}
