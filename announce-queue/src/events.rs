//! Event system for the announcement queue
//!
//! Queue snapshots are published on an in-process bus so that API layers,
//! monitors and loggers can follow every zone without touching the queues.
//!
//! # Topics
//!
//! - `QueueChange`: after every mutation of a zone's queue
//! - `QueueContent`: on explicit request for a zone's contents
//! - `PlaybackTriggered`: each time an event fires or is played manually

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::queue::Event;

/// Published state of one zone's queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub queue_id: String,
    pub mute: bool,
    pub events: Vec<Event>,
    pub next: Option<Event>,
}

/// Events published by the queue engine
///
/// Serialized with a `type` tag carrying the topic name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StationEvent {
    /// Queue mutated (enqueue, update, delete, mute, volume, firing)
    QueueChange(QueueSnapshot),

    /// Full queue contents, sent on request
    QueueContent(QueueSnapshot),

    /// Timer elapsed or manual play; `dispatched` is false when a mute
    /// flag or the autoplay gate suppressed the audio
    #[serde(rename_all = "camelCase")]
    PlaybackTriggered {
        queue_id: String,
        event_id: String,
        dispatched: bool,
        timestamp: DateTime<Utc>,
    },
}

impl StationEvent {
    /// Topic name of this event
    pub fn event_type(&self) -> &'static str {
        match self {
            StationEvent::QueueChange(_) => "QueueChange",
            StationEvent::QueueContent(_) => "QueueContent",
            StationEvent::PlaybackTriggered { .. } => "PlaybackTriggered",
        }
    }

    /// Zone the event refers to
    pub fn queue_id(&self) -> &str {
        match self {
            StationEvent::QueueChange(snapshot) | StationEvent::QueueContent(snapshot) => {
                &snapshot.queue_id
            }
            StationEvent::PlaybackTriggered { queue_id, .. } => queue_id,
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block the queues)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StationEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<StationEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: StationEvent,
    ) -> Result<usize, broadcast::error::SendError<StationEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: StationEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
