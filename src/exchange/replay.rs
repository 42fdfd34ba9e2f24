use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use crate::exchange::{FeedError, FeedEvent, TickFeed};

/// A `TickFeed` that replays a fixed price series. Speaks the same event
/// protocol as the live client: authorization on connect, a balance reply per
/// request, and ticks only after a subscription.
pub struct ReplayFeed {
    prices: VecDeque<f64>,
    balance: f64,
    login_id: String,
    symbol: String,
    epoch: i64,
    subscribed: bool,
    connected: bool,
    outbox: VecDeque<FeedEvent>,
}

impl ReplayFeed {
    pub fn new(prices: Vec<f64>, balance: f64) -> Self {
        Self {
            prices: prices.into(),
            balance,
            login_id: "REPLAY".to_string(),
            symbol: String::new(),
            epoch: 0,
            subscribed: false,
            connected: false,
            outbox: VecDeque::new(),
        }
    }

    /// Load prices from a text file: one value per line, or the last column of
    /// a comma-separated line. Lines that do not parse (headers) are skipped.
    pub fn from_file(path: impl AsRef<Path>, balance: f64) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read price file {}", path.display()))?;
        let prices = parse_prices(&content);
        anyhow::ensure!(!prices.is_empty(), "No prices found in {}", path.display());
        Ok(Self::new(prices, balance))
    }

    /// Geometric random walk around `start`, for smoke runs without data.
    pub fn random_walk<R: Rng + ?Sized>(rng: &mut R, ticks: usize, start: f64, balance: f64) -> Self {
        let mut price = start;
        let prices = (0..ticks)
            .map(|_| {
                let step: f64 = rng.gen_range(-0.0015..0.0015);
                price = (price * (1.0 + step)).max(0.01);
                price
            })
            .collect();
        Self::new(prices, balance)
    }

    pub fn remaining(&self) -> usize {
        self.prices.len()
    }
}

pub fn parse_prices(content: &str) -> Vec<f64> {
    content
        .lines()
        .filter_map(|line| line.rsplit(',').next())
        .filter_map(|field| field.trim().parse::<f64>().ok())
        .filter(|p| p.is_finite() && *p > 0.0)
        .collect()
}

#[async_trait]
impl TickFeed for ReplayFeed {
    async fn connect(&mut self) -> Result<(), FeedError> {
        self.connected = true;
        self.outbox.push_back(FeedEvent::Authorized {
            login_id: self.login_id.clone(),
            email: None,
        });
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.connected = false;
        self.subscribed = false;
    }

    async fn next_event(&mut self) -> Result<FeedEvent, FeedError> {
        if !self.connected {
            return Err(FeedError::NotConnected);
        }
        if let Some(event) = self.outbox.pop_front() {
            return Ok(event);
        }
        if !self.subscribed {
            return Err(FeedError::StreamEnded);
        }
        let price = self.prices.pop_front().ok_or(FeedError::StreamEnded)?;
        self.epoch += 1;
        Ok(FeedEvent::Tick {
            symbol: self.symbol.clone(),
            price,
            epoch: self.epoch,
        })
    }

    async fn request_balance(&mut self) -> Result<(), FeedError> {
        if !self.connected {
            return Err(FeedError::NotConnected);
        }
        self.outbox.push_back(FeedEvent::Balance {
            amount: self.balance,
            currency: Some("USD".to_string()),
        });
        Ok(())
    }

    async fn subscribe_ticks(&mut self, symbol: &str) -> Result<(), FeedError> {
        if !self.connected {
            return Err(FeedError::NotConnected);
        }
        self.symbol = symbol.to_string();
        self.subscribed = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn parses_plain_and_csv_lines() {
        let content = "epoch,quote\n1,100.5\n2,100.7\n101.0\n\nbad\n3,-1\n";
        assert_eq!(parse_prices(content), vec![100.5, 100.7, 101.0]);
    }

    #[test]
    fn random_walk_is_reproducible() {
        let a = ReplayFeed::random_walk(&mut StdRng::seed_from_u64(3), 50, 1000.0, 10.0);
        let b = ReplayFeed::random_walk(&mut StdRng::seed_from_u64(3), 50, 1000.0, 10.0);
        assert_eq!(a.prices, b.prices);
        assert_eq!(a.remaining(), 50);
    }

    #[tokio::test]
    async fn emits_protocol_events_in_order() {
        let mut feed = ReplayFeed::new(vec![1.0, 2.0], 500.0);
        assert!(matches!(feed.next_event().await, Err(FeedError::NotConnected)));

        feed.connect().await.unwrap();
        assert!(matches!(
            feed.next_event().await,
            Ok(FeedEvent::Authorized { .. })
        ));
        // nothing subscribed yet
        assert!(matches!(feed.next_event().await, Err(FeedError::StreamEnded)));

        feed.request_balance().await.unwrap();
        feed.subscribe_ticks("R_100").await.unwrap();
        assert!(matches!(
            feed.next_event().await,
            Ok(FeedEvent::Balance { amount, .. }) if (amount - 500.0).abs() < 1e-12
        ));
        assert!(matches!(
            feed.next_event().await,
            Ok(FeedEvent::Tick { price, epoch: 1, .. }) if price == 1.0
        ));
        assert!(matches!(feed.next_event().await, Ok(FeedEvent::Tick { epoch: 2, .. })));
        assert!(matches!(feed.next_event().await, Err(FeedError::StreamEnded)));
    }
}
