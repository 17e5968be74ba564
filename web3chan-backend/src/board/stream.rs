//! Push-stream subscription for a board.
//!
//! [`Reconnect`] hands out open, subscribed connections and sleeps with
//! exponential backoff between failed attempts. [`StreamListener`] turns the
//! frames of each connection into queued notifications.

use super::queue::QueueSender;
use crate::models::Notification;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const SUBSCRIBE_FRAME: &str = r#"{"type":"subscribe","stream":"user:notification"}"#;

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Doubling delay between reconnect attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    min: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(MIN_BACKOFF, MAX_BACKOFF)
    }
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { current: min, min, max }
    }

    /// Delay to wait now; the following one is twice as long, up to the max
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

/// Yields open connections that already carry the notification subscription
pub struct Reconnect {
    board: String,
    url: Url,
    backoff: Backoff,
}

impl Reconnect {
    pub fn new(board: &str, url: Url, backoff: Backoff) -> Self {
        Self {
            board: board.to_string(),
            url,
            backoff,
        }
    }

    async fn open(&self) -> Result<WsStream, tokio_tungstenite::tungstenite::Error> {
        let (mut ws, _) = connect_async(self.url.as_str()).await?;
        ws.send(Message::Text(SUBSCRIBE_FRAME.to_string())).await?;
        Ok(ws)
    }

    /// Next subscribed connection, or None once cancelled
    pub async fn next(&mut self, shutdown: &CancellationToken) -> Option<WsStream> {
        loop {
            let attempt = tokio::select! {
                _ = shutdown.cancelled() => return None,
                attempt = self.open() => attempt,
            };

            match attempt {
                Ok(ws) => {
                    self.backoff.reset();
                    log::info!("BoardBot:{} stream connected", self.board);
                    return Some(ws);
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    log::warn!(
                        "BoardBot:{} stream connect failed: {}, retrying in {:?}",
                        self.board,
                        e,
                        delay
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    payload: Option<String>,
}

/// What a single inbound frame amounts to
#[derive(Debug)]
pub enum Frame {
    Notification(Notification),
    /// A well-formed event this worker does not consume
    Other(String),
    /// Ping, pong and raw frames
    Control,
    Close,
    Invalid(String),
}

pub fn parse_frame(message: &Message) -> Frame {
    let text = match message {
        Message::Text(text) => text,
        Message::Binary(data) => return Frame::Invalid(format!("unexpected binary frame of {} bytes", data.len())),
        Message::Close(_) => return Frame::Close,
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return Frame::Control,
    };

    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => return Frame::Invalid(format!("bad event envelope: {}", e)),
    };

    match (envelope.event.as_str(), envelope.payload) {
        ("notification", Some(payload)) => match serde_json::from_str::<serde_json::Value>(&payload) {
            Ok(value) => match Notification::from_value(&value) {
                Some(notification) => Frame::Notification(notification),
                None => Frame::Invalid("notification payload without an id".to_string()),
            },
            Err(e) => Frame::Invalid(format!("bad notification payload: {}", e)),
        },
        _ => Frame::Other(envelope.event),
    }
}

/// Check that the streaming endpoint accepts a connection and a ping
pub async fn check_endpoint(url: &Url, timeout: Duration) -> bool {
    let attempt = async {
        let (mut ws, _) = connect_async(url.as_str()).await?;
        ws.send(Message::Ping(Vec::new())).await?;
        ws.close(None).await?;
        Ok::<_, tokio_tungstenite::tungstenite::Error>(())
    };

    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::debug!("stream check against {} failed: {}", url.host_str().unwrap_or_default(), e);
            false
        }
        Err(_) => {
            log::debug!("stream check against {} timed out", url.host_str().unwrap_or_default());
            false
        }
    }
}

pub struct StreamListener {
    board: String,
    reconnect: Reconnect,
    queue: QueueSender<Notification>,
}

impl StreamListener {
    pub fn new(board: &str, url: Url, queue: QueueSender<Notification>) -> Self {
        Self::with_backoff(board, url, queue, Backoff::default())
    }

    pub fn with_backoff(board: &str, url: Url, queue: QueueSender<Notification>, backoff: Backoff) -> Self {
        Self {
            board: board.to_string(),
            reconnect: Reconnect::new(board, url, backoff),
            queue,
        }
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        'connections: while let Some(mut ws) = self.reconnect.next(&shutdown).await {
            loop {
                let message = tokio::select! {
                    _ = shutdown.cancelled() => {
                        let _ = ws.close(None).await;
                        break 'connections;
                    }
                    message = ws.next() => message,
                };

                let message = match message {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        log::warn!("BoardBot:{} stream error: {}", self.board, e);
                        break;
                    }
                    None => break,
                };

                match parse_frame(&message) {
                    Frame::Notification(notification) => {
                        log::debug!("BoardBot:{} streamed notification: {}", self.board, notification.id);
                        let pushed = tokio::select! {
                            _ = shutdown.cancelled() => break 'connections,
                            pushed = self.queue.push(notification) => pushed,
                        };
                        if pushed.is_err() {
                            break 'connections;
                        }
                    }
                    Frame::Other(event) => {
                        log::debug!("BoardBot:{} ignoring stream event: {}", self.board, event);
                    }
                    Frame::Control => {}
                    Frame::Close => break,
                    Frame::Invalid(reason) => {
                        log::error!("BoardBot:{} stream_listener: {}", self.board, reason);
                    }
                }
            }
            log::warn!("BoardBot:{} stream disconnected", self.board);
        }
        log::debug!("BoardBot:{} stream listener stopped", self.board);
    }
}
