//! Event stream listener: turns the device's server-sent gesture stream
//! into published [`DomainEvent`]s.
//!
//! The device answers `GET /api/v1/{token}/events?id=4` with a chunked
//! response that never ends on its own. Each frame is a line; only lines
//! starting with `data:` carry a payload:
//!
//! ```text
//! id: 4
//! data: {"events":[{"panelId":123,"gesture":0}]}
//! ```
//!
//! A listener handles exactly one connection. When the connection ends the
//! listener returns a [`StreamEnd`] to its [`Supervisor`](crate::Supervisor),
//! which decides when to reconnect.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use futures::stream::BoxStream;
use log::{debug, info, warn};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::client::DeviceClient;
use crate::errors::Error;
use crate::events::{DomainEvent, EventSink, GestureEvent, TapType};
use crate::history::{MessageHistory, MessageType};
use crate::registry::{ConfigEntryId, EntityRegistry, resolve};

type Result<T> = std::result::Result<T, Error>;

/// Prefix of payload-carrying lines.
const DATA_PREFIX: &str = "data:";

/// Longest unterminated line kept before it is dropped.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Raw chunks of an open event stream.
pub type EventStream = BoxStream<'static, Result<Vec<u8>>>;

/// Why a stream stopped being read.
#[derive(Debug)]
pub enum StreamEnd {
    /// The connection closed (device reboot, server close, EOF).
    Closed,
    /// Reading failed mid-stream.
    Failed(Error),
    /// The owner asked the listener to stop.
    Cancelled,
}

impl fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEnd::Closed => write!(f, "{}", Error::StreamEnded),
            StreamEnd::Failed(e) => write!(f, "{}: {e}", Error::StreamEnded),
            StreamEnd::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One connect-and-read cycle, as driven by the supervisor.
pub trait StreamSession: Send + Sync {
    /// Open a new connection.
    fn connect(&self) -> impl Future<Output = Result<EventStream>> + Send;

    /// Read the connection until it ends or `cancel` fires.
    fn consume(
        &self,
        stream: EventStream,
        cancel: &CancellationToken,
    ) -> impl Future<Output = StreamEnd> + Send;
}

/// Splits a byte stream into lines across chunk boundaries.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk and return every line it completed, without the newline.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        if self.pending.len() > MAX_LINE_BYTES {
            warn!(
                "dropping {} bytes of stream data without a line break",
                self.pending.len()
            );
            self.pending.clear();
        }
        lines
    }

    /// The unterminated tail left when the stream closed, if any.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&tail).trim_end_matches('\r').to_string())
    }
}

/// Listens to one device on behalf of one configuration entry.
pub struct EventListener {
    client: Arc<DeviceClient>,
    scope: ConfigEntryId,
    registry: Arc<dyn EntityRegistry>,
    sink: Arc<dyn EventSink>,
    event_ids: Vec<u8>,
    history: Mutex<MessageHistory>,
}

impl fmt::Debug for EventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListener")
            .field("endpoint", self.client.endpoint())
            .field("scope", &self.scope)
            .field("event_ids", &self.event_ids)
            .finish_non_exhaustive()
    }
}

impl EventListener {
    pub fn new(
        client: Arc<DeviceClient>,
        scope: ConfigEntryId,
        registry: Arc<dyn EntityRegistry>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            client,
            scope,
            registry,
            sink,
            event_ids: vec![4],
            history: Mutex::new(MessageHistory::new()),
        }
    }

    /// Request other event type ids than the default touch stream.
    pub fn with_event_ids(mut self, event_ids: Vec<u8>) -> Self {
        self.event_ids = event_ids;
        self
    }

    pub fn scope(&self) -> &ConfigEntryId {
        &self.scope
    }

    pub fn history(&self) -> MessageHistory {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn diagnostics(&self) -> Value {
        json!({
            "scope": self.scope.to_string(),
            "event_ids": self.event_ids,
            "history": serde_json::to_value(self.history().summary()).unwrap_or(Value::Null),
        })
    }

    /// Handle one line of the stream. Publishes and returns the derived
    /// event, if any.
    ///
    /// Lines without the `data:` prefix are ignored. A malformed payload is
    /// logged and dropped. A panel with no registered entity, or a gesture
    /// code that is not a tap, yields nothing.
    pub fn handle_line(&self, line: &str) -> Option<DomainEvent> {
        let payload = line.strip_prefix(DATA_PREFIX)?.trim();

        let gesture = match GestureEvent::from_frame(payload) {
            Ok(gesture) => gesture,
            Err(e) => {
                warn!("dropping malformed frame {payload:?}: {e}");
                self.with_history(|h| {
                    h.record(MessageType::Push, "events", Value::String(payload.into()));
                    h.record_error(&e.to_string());
                });
                return None;
            }
        };
        self.with_history(|h| {
            h.record(
                MessageType::Push,
                "events",
                serde_json::to_value(gesture).unwrap_or(Value::Null),
            );
        });

        let Some(entity) = resolve(self.registry.as_ref(), gesture.panel_id, &self.scope) else {
            debug!("no entity for panel {}", gesture.panel_id);
            return None;
        };

        let Some(tap) = TapType::from_gesture(gesture.gesture) else {
            debug!(
                "gesture {} on panel {} is not mapped",
                gesture.gesture, gesture.panel_id
            );
            return None;
        };

        let event = DomainEvent::new(entity, tap);
        debug!("{} {} on {}", tap, gesture.panel_id, event.entity_id);
        self.sink.publish(event.clone());
        Some(event)
    }

    fn with_history(&self, f: impl FnOnce(&mut MessageHistory)) {
        f(&mut self.history.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl StreamSession for EventListener {
    async fn connect(&self) -> Result<EventStream> {
        let url = self.client.events_url(&self.event_ids).await?;
        // No timeout: the stream is push-only and may idle indefinitely.
        let response = self
            .client
            .http()
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::transport("events", e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::unreachable("events", status));
        }

        info!("event stream open to {}", self.client.endpoint());
        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|b| b.to_vec())
                    .map_err(|e| Error::transport("events", e))
            })
            .boxed())
    }

    async fn consume(&self, mut stream: EventStream, cancel: &CancellationToken) -> StreamEnd {
        let mut lines = LineBuffer::default();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return StreamEnd::Cancelled,
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        for line in lines.push(&bytes) {
                            self.handle_line(&line);
                        }
                    }
                    Some(Err(e)) => {
                        self.with_history(|h| h.record_error(&e.to_string()));
                        return StreamEnd::Failed(e);
                    }
                    None => {
                        if let Some(line) = lines.finish() {
                            self.handle_line(&line);
                        }
                        info!("event stream from {} ended", self.client.endpoint());
                        return StreamEnd::Closed;
                    }
                },
            }
        }
    }
}
