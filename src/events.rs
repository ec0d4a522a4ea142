//! Event sink contract.
//!
//! The host receives typed events as `(type, json)` pairs:
//!
//! | type        | payload                                  |
//! |-------------|------------------------------------------|
//! | `state`     | `{status, message}`                      |
//! | `face`      | `{x, y, w, h, score}`                    |
//! | `telemetry` | `{fps, latencyMs, pan, tilt}`            |
//! | `stream`    | `{frames, bytes, kbps, source}`          |
//!
//! Delivery is fire-and-forget. A failing sink never aborts a session
//! operation; [`EventEmitter`] logs the failure at `trace` level and drops the
//! event.

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Event channel discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    State,
    Face,
    Telemetry,
    Stream,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::State => "state",
            EventKind::Face => "face",
            EventKind::Telemetry => "telemetry",
            EventKind::Stream => "stream",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status reported in `state` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateStatus {
    Ready,
    Connected,
    Running,
    Idle,
    Error,
}

/// `state` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePayload {
    pub status: StateStatus,
    pub message: String,
}

/// `face` payload: normalised bounding box of the tracked target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacePayload {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub score: f64,
}

/// `telemetry` payload: control loop rate, latency and actuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPayload {
    pub fps: f64,
    pub latency_ms: f64,
    pub pan: f64,
    pub tilt: f64,
}

/// `stream` payload: throughput over one reporting window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamPayload {
    pub frames: u64,
    pub bytes: u64,
    pub kbps: f64,
    pub source: String,
}

/// A typed event before serialisation.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    State(StatePayload),
    Face(FacePayload),
    Telemetry(TelemetryPayload),
    Stream(StreamPayload),
}

impl SessionEvent {
    pub fn state(status: StateStatus, message: impl Into<String>) -> Self {
        SessionEvent::State(StatePayload {
            status,
            message: message.into(),
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::State(_) => EventKind::State,
            SessionEvent::Face(_) => EventKind::Face,
            SessionEvent::Telemetry(_) => EventKind::Telemetry,
            SessionEvent::Stream(_) => EventKind::Stream,
        }
    }

    /// JSON text understood by the host.
    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            SessionEvent::State(p) => serde_json::to_string(p),
            SessionEvent::Face(p) => serde_json::to_string(p),
            SessionEvent::Telemetry(p) => serde_json::to_string(p),
            SessionEvent::Stream(p) => serde_json::to_string(p),
        }
    }
}

/// Receiver of serialised events, supplied by the host at session construction.
pub trait EventSink: Send + Sync {
    /// Deliver one event. An `Err` is logged and the event is dropped.
    fn emit(&self, kind: EventKind, payload: &str) -> Result<()>;
}

/// Serialises typed events and hands them to the sink, swallowing failures.
#[derive(Clone)]
pub struct EventEmitter {
    sink: Arc<dyn EventSink>,
}

impl EventEmitter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub fn emit(&self, event: SessionEvent) {
        let kind = event.kind();
        let payload = match event.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "Failed to serialise event");
                return;
            }
        };
        if let Err(e) = self.sink.emit(kind, &payload) {
            tracing::trace!(kind = %kind, error = %e, "Event sink unavailable, event dropped");
        }
    }

    pub fn state(&self, status: StateStatus, message: impl Into<String>) {
        self.emit(SessionEvent::state(status, message));
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter").finish_non_exhaustive()
    }
}

// =============================================================================
// Sink implementations
// =============================================================================

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _kind: EventKind, _payload: &str) -> Result<()> {
        Ok(())
    }
}

/// Sink that forwards events to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, kind: EventKind, payload: &str) -> Result<()> {
        tracing::info!(target: "uvc_tracker::events", kind = %kind, "{}", payload);
        Ok(())
    }
}

/// One delivered event as recorded by [`CollectingSink`] or [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub kind: EventKind,
    pub payload: String,
}

/// Sink that forwards events over an unbounded channel to an async consumer.
///
/// Delivery fails once the receiver is dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: tokio::sync::mpsc::UnboundedSender<EventRecord>,
}

impl ChannelSink {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<EventRecord>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, kind: EventKind, payload: &str) -> Result<()> {
        self.tx
            .send(EventRecord {
                kind,
                payload: payload.to_string(),
            })
            .map_err(|_| anyhow!("event receiver closed"))
    }
}

/// Sink that keeps every event in memory. Handy for tests and the REPL.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<EventRecord>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events delivered so far.
    pub fn events(&self) -> Vec<EventRecord> {
        self.events.lock().clone()
    }

    /// Remove and return all events delivered so far.
    pub fn take(&self) -> Vec<EventRecord> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Decoded payloads of every event of kind `K`.
    pub fn payloads<T: for<'de> Deserialize<'de>>(&self, kind: EventKind) -> Vec<T> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .filter_map(|e| serde_json::from_str(&e.payload).ok())
            .collect()
    }

    pub fn states(&self) -> Vec<StatePayload> {
        self.payloads(EventKind::State)
    }

    pub fn streams(&self) -> Vec<StreamPayload> {
        self.payloads(EventKind::Stream)
    }

    pub fn telemetry(&self) -> Vec<TelemetryPayload> {
        self.payloads(EventKind::Telemetry)
    }

    pub fn faces(&self) -> Vec<FacePayload> {
        self.payloads(EventKind::Face)
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, kind: EventKind, payload: &str) -> Result<()> {
        self.events.lock().push(EventRecord {
            kind,
            payload: payload.to_string(),
        });
        Ok(())
    }
}
