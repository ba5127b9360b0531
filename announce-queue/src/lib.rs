//! # Station Announcement Queue (announce-queue)
//!
//! Per-zone playback scheduling for station announcements.
//!
//! **Purpose:** Merge announcement occurrences from several producers into one
//! ordered schedule per broadcast zone, resolve overlaps by priority, keep a
//! minimum gap between playbacks and fire a timer for the next automatic
//! playback.
//!
//! **Architecture:** `QueueManager` owns one mutex-guarded `Queue` per zone.
//! Each queue arms at most one tokio timer task; when it elapses the trigger
//! bridge gates the playback on the mute flags and hands it to an
//! `AudioDispatcher`. Queue snapshots are published on an `EventBus`.

pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod manager;
pub mod queue;
pub mod trigger;

pub use config::EngineConfig;
pub use control::ControlMessage;
pub use error::{Error, Result};
pub use events::{EventBus, QueueSnapshot, StationEvent};
pub use manager::QueueManager;
pub use queue::{Event, EventStatus, Queue, QueueSettings, TriggerHandler};
pub use trigger::{AudioDispatcher, LoggingDispatcher};
