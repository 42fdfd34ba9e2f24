use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::exchange::{FeedError, FeedEvent, TickFeed};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    msg_type: String,
    #[serde(default)]
    error: Option<RawError>,
    #[serde(default)]
    authorize: Option<RawAuthorize>,
    #[serde(default)]
    balance: Option<RawBalance>,
    #[serde(default)]
    tick: Option<RawTick>,
}

#[derive(Debug, Deserialize)]
struct RawError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct RawAuthorize {
    #[serde(default)]
    loginid: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBalance {
    #[serde(deserialize_with = "number_or_string")]
    balance: f64,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTick {
    #[serde(deserialize_with = "number_or_string")]
    quote: f64,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    epoch: i64,
}

/// The API sends some amounts as JSON numbers and others as strings.
fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(f64),
        Str(String),
    }

    match NumOrStr::deserialize(deserializer)? {
        NumOrStr::Num(n) => Ok(n),
        NumOrStr::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Decode one text frame. Returns `None` for message types the bot ignores
/// and for frames that do not parse.
pub fn parse_message(text: &str) -> Option<FeedEvent> {
    let msg: RawMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            debug!("Unparseable message: {}", e);
            return None;
        }
    };

    if let Some(err) = msg.error {
        return Some(FeedEvent::ApiError {
            code: err.code,
            message: err.message,
        });
    }

    match msg.msg_type.as_str() {
        "authorize" => msg.authorize.map(|a| FeedEvent::Authorized {
            login_id: a.loginid,
            email: a.email,
        }),
        "balance" => msg.balance.map(|b| FeedEvent::Balance {
            amount: b.balance,
            currency: b.currency,
        }),
        "tick" => msg.tick.map(|t| FeedEvent::Tick {
            symbol: t.symbol,
            price: t.quote,
            epoch: t.epoch,
        }),
        _ => None,
    }
}

/// WebSocket client for the Deriv API.
pub struct DerivClient {
    endpoint: String,
    token: String,
    connect_timeout: Duration,
    stream: Option<WsStream>,
}

impl DerivClient {
    pub fn new(cfg: &Config) -> Self {
        Self {
            endpoint: cfg.endpoint(),
            token: cfg.api_token.clone(),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            stream: None,
        }
    }

    async fn send_json(&mut self, value: serde_json::Value) -> Result<(), FeedError> {
        let stream = self.stream.as_mut().ok_or(FeedError::NotConnected)?;
        stream
            .send(Message::Text(value.to_string().into()))
            .await
            .map_err(|e| FeedError::WebSocket(e.to_string()))
    }
}

#[async_trait]
impl TickFeed for DerivClient {
    async fn connect(&mut self) -> Result<(), FeedError> {
        if self.token.is_empty() {
            return Err(FeedError::MissingToken);
        }

        info!("Connecting to {}", self.endpoint);
        let (stream, _) =
            match tokio::time::timeout(self.connect_timeout, connect_async(self.endpoint.as_str()))
                .await
            {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => return Err(FeedError::Connection(e.to_string())),
                Err(_) => return Err(FeedError::Timeout),
            };
        self.stream = Some(stream);

        info!("WebSocket opened, authorizing...");
        let token = self.token.clone();
        self.send_json(serde_json::json!({ "authorize": token })).await
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                debug!("Close failed: {}", e);
            }
        }
    }

    async fn next_event(&mut self) -> Result<FeedEvent, FeedError> {
        loop {
            let stream = self.stream.as_mut().ok_or(FeedError::NotConnected)?;
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = parse_message(&text) {
                        return Ok(event);
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    stream
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| FeedError::WebSocket(e.to_string()))?;
                }
                Some(Ok(Message::Close(frame))) => {
                    warn!("WebSocket closed: {:?}", frame);
                    self.stream = None;
                    return Err(FeedError::StreamEnded);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.stream = None;
                    return Err(FeedError::WebSocket(e.to_string()));
                }
                None => {
                    self.stream = None;
                    return Err(FeedError::StreamEnded);
                }
            }
        }
    }

    async fn request_balance(&mut self) -> Result<(), FeedError> {
        self.send_json(serde_json::json!({ "balance": 1 })).await
    }

    async fn subscribe_ticks(&mut self, symbol: &str) -> Result<(), FeedError> {
        self.send_json(serde_json::json!({ "ticks": symbol })).await?;
        info!("Subscribed to ticks: {}", symbol);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_authorize() {
        let msg = r#"{"msg_type":"authorize","authorize":{"email":"a@b.c","loginid":"VRTC123","balance":1000}}"#;
        assert_eq!(
            parse_message(msg),
            Some(FeedEvent::Authorized {
                login_id: "VRTC123".into(),
                email: Some("a@b.c".into()),
            })
        );
    }

    #[test]
    fn parses_balance_as_number_or_string() {
        let num = r#"{"msg_type":"balance","balance":{"balance":1000.5,"currency":"USD"}}"#;
        let txt = r#"{"msg_type":"balance","balance":{"balance":"1000.50","currency":"USD"}}"#;
        for msg in [num, txt] {
            match parse_message(msg) {
                Some(FeedEvent::Balance { amount, currency }) => {
                    assert!((amount - 1000.5).abs() < 1e-9);
                    assert_eq!(currency.as_deref(), Some("USD"));
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn parses_tick() {
        let msg = r#"{"msg_type":"tick","tick":{"quote":1234.56789,"symbol":"R_100","epoch":1700000000}}"#;
        assert_eq!(
            parse_message(msg),
            Some(FeedEvent::Tick {
                symbol: "R_100".into(),
                price: 1234.56789,
                epoch: 1_700_000_000,
            })
        );
    }

    #[test]
    fn error_takes_precedence() {
        let msg = r#"{"msg_type":"authorize","error":{"code":"InvalidToken","message":"The token is invalid."}}"#;
        assert_eq!(
            parse_message(msg),
            Some(FeedEvent::ApiError {
                code: "InvalidToken".into(),
                message: "The token is invalid.".into(),
            })
        );
    }

    #[test]
    fn ignores_unknown_and_garbage() {
        assert_eq!(parse_message(r#"{"msg_type":"ping","ping":"pong"}"#), None);
        assert_eq!(parse_message("not json"), None);
        assert_eq!(parse_message(r#"{"msg_type":"tick"}"#), None);
    }
}
