//! Playback trigger bridge
//!
//! Connects queue timers to the audio side. Each queue's timer calls the
//! bridge, the bridge hands the firing to the manager, and the manager gates
//! and forwards the event to an `AudioDispatcher`.

use std::sync::Weak;

use tracing::{debug, info};

use crate::manager::QueueManager;
use crate::queue::{Event, TriggerHandler};

/// Sends an event's audio to the devices of a zone
///
/// Runs on tokio's blocking pool after the queue lock has been released.
/// Implementations may block; other zones keep firing meanwhile.
pub trait AudioDispatcher: Send + Sync {
    fn dispatch(&self, zone_id: &str, event: &Event, volume: f32);
}

/// Dispatcher that only logs what would be played
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDispatcher;

impl AudioDispatcher for LoggingDispatcher {
    fn dispatch(&self, zone_id: &str, event: &Event, volume: f32) {
        info!(
            zone = %zone_id,
            event = %event.id,
            annon = %event.annon_id,
            lang = %event.lang,
            volume,
            "Playing announcement: {}",
            event.text
        );
    }
}

/// Handler wired into every queue owned by a `QueueManager`
///
/// Holds a weak reference so queues (owned by the manager) do not keep the
/// manager alive.
pub(crate) struct TriggerBridge {
    manager: Weak<QueueManager>,
}

impl TriggerBridge {
    pub(crate) fn new(manager: Weak<QueueManager>) -> Self {
        Self { manager }
    }
}

impl TriggerHandler for TriggerBridge {
    fn on_trigger(&self, zone_id: &str, event: &Event) {
        match self.manager.upgrade() {
            Some(manager) => manager.on_timer_elapsed(zone_id, event),
            None => {
                debug!(zone = %zone_id, event = %event.id, "Manager gone, trigger ignored");
            }
        }
    }
}
