//! Push relay client: channel-scoped subscriptions to the hosted event
//! relay, exposed as cancellable handles.
//!
//! The relay is an external service consumed only at its boundary: one
//! long-lived `text/event-stream` request per subscribed topic, whose
//! `data:` payloads are forwarded verbatim to the subscriber. Nothing is
//! ever published from this side; locally sent messages travel over the
//! chat API and come back as relay echoes.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::RelayError;

/// Capacity of each per-topic delivery buffer.
const SUBSCRIPTION_BUFFER: usize = 64;

/// Boundary contract for the push relay.
///
/// The engine is generic over this trait so tests can drive it with an
/// in-memory implementation.
pub trait PushRelay: Send + Sync + 'static {
    /// Open the single live subscription for `topic`.
    fn subscribe(
        &self,
        topic: &str,
    ) -> impl Future<Output = Result<Subscription, RelayError>> + Send;
}

/// Live subscription to one relay topic.
///
/// Deliveries arrive in arrival order through [`Subscription::recv`].
/// [`Subscription::close`] releases the topic explicitly; dropping the
/// handle releases it as well.
pub struct Subscription {
    topic: String,
    rx: mpsc::Receiver<Vec<u8>>,
    stop: Option<oneshot::Sender<()>>,
}

impl Subscription {
    pub fn new(topic: String, rx: mpsc::Receiver<Vec<u8>>, stop: oneshot::Sender<()>) -> Self {
        Self {
            topic,
            rx,
            stop: Some(stop),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next delivery. `None` once the relay stream has gone away.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Release the topic.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Client for the hosted push relay.
///
/// Cheap to clone; all clones share the topic registry. Each subscription
/// runs one streamed GET against `{base}/events/{topic}` in a background
/// reader task that stops when the handle is released or the stream ends.
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: reqwest::Client,
    base_url: String,
    topics: Arc<Mutex<HashMap<String, mpsc::WeakSender<Vec<u8>>>>>,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RelayError> {
        // No overall timeout: the event stream is meant to stay open.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            topics: Arc::default(),
        })
    }

    /// Whether `topic` currently has a live subscription.
    fn is_taken(&self, topic: &str) -> bool {
        let map = match self.topics.lock() {
            Ok(map) => map,
            Err(_) => return false,
        };
        map.get(topic)
            .and_then(|weak| weak.upgrade())
            .is_some_and(|tx| !tx.is_closed())
    }
}

impl PushRelay for RelayClient {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, RelayError> {
        if self.is_taken(topic) {
            return Err(RelayError::AlreadySubscribed(topic.to_string()));
        }

        let url = format!("{}/events/{}", self.base_url, topic);
        let response = self
            .client
            .get(&url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RelayError::Transport(format!(
                "relay responded with {}",
                response.status()
            )));
        }

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        {
            let mut map = match self.topics.lock() {
                Ok(map) => map,
                Err(e) => e.into_inner(),
            };
            if let Some(existing) = map.get(topic).and_then(|weak| weak.upgrade()) {
                if !existing.is_closed() {
                    return Err(RelayError::AlreadySubscribed(topic.to_string()));
                }
            }
            // Only the weak half goes into the registry, so an ended
            // reader frees its topic by simply dropping `tx`.
            map.insert(topic.to_string(), tx.downgrade());
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(stream_events(response, tx, stop_rx, topic.to_string()));

        debug!(topic = %topic, "Subscribed to relay topic");
        Ok(Subscription::new(topic.to_string(), rx, stop_tx))
    }
}

/// Pump one event stream into the subscriber, one `data:` payload at a
/// time, until the handle is released or the stream ends.
async fn stream_events(
    response: reqwest::Response,
    tx: mpsc::Sender<Vec<u8>>,
    mut stop: oneshot::Receiver<()>,
    topic: String,
) {
    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        tokio::select! {
            _ = &mut stop => {
                debug!(topic = %topic, "Subscription released");
                return;
            }
            chunk = stream.next() => {
                let chunk = match chunk {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(e)) => {
                        warn!(topic = %topic, error = %e, "Relay stream error");
                        return;
                    }
                    None => {
                        debug!(topic = %topic, "Relay stream ended");
                        return;
                    }
                };

                buffer.extend_from_slice(&chunk);
                for payload in drain_events(&mut buffer) {
                    if tx.send(payload).await.is_err() {
                        // Subscriber went away.
                        return;
                    }
                }
            }
        }
    }
}

/// Split complete events off the front of `buffer` and return their
/// payloads. Incomplete trailing input stays buffered for the next chunk.
fn drain_events(buffer: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut payloads = Vec::new();
    while let Some((at, len)) = event_boundary(buffer) {
        let frame: Vec<u8> = buffer.drain(..at + len).collect();
        if let Some(payload) = event_data(&frame) {
            payloads.push(payload);
        }
    }
    payloads
}

/// Position and length of the first blank line ending an event, if any.
/// Both LF and CRLF line endings appear in the wild.
fn event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer
        .windows(2)
        .position(|w| w == b"\n\n")
        .map(|at| (at, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|at| (at, 4));

    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Concatenated `data:` lines of one event frame. `None` for frames
/// without data (comments, keep-alives).
fn event_data(frame: &[u8]) -> Option<Vec<u8>> {
    let mut data: Vec<u8> = Vec::new();
    for line in frame.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if let Some(rest) = line.strip_prefix(b"data:") {
            let rest = rest.strip_prefix(b" ").unwrap_or(rest);
            if !data.is_empty() {
                data.push(b'\n');
            }
            data.extend_from_slice(rest);
        }
    }
    (!data.is_empty()).then_some(data)
}
