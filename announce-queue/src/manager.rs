//! Zone queue manager
//!
//! Owns one `Queue` per zone and is the only entry point for mutating them.
//! Every structural change follows the same sequence under the zone's
//! mutex: mutate, adjust, reschedule, snapshot. The snapshot is published
//! after the lock is released. Zones are independent; two zones may be
//! mutated or fire at the same time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use announce_common::time::Clock;
use announce_common::Announcement;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::events::{EventBus, QueueSnapshot, StationEvent};
use crate::queue::{Event, EventStatus, Queue, QueueSettings, TriggerHandler};
use crate::trigger::{AudioDispatcher, TriggerBridge};

/// Registry of zone queues
pub struct QueueManager {
    zones: RwLock<HashMap<String, Arc<Mutex<Queue>>>>,
    settings: QueueSettings,
    bus: EventBus,
    dispatcher: Arc<dyn AudioDispatcher>,
    clock: Arc<dyn Clock>,
    handler: Arc<dyn TriggerHandler>,
}

fn lock(queue: &Mutex<Queue>) -> MutexGuard<'_, Queue> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

impl QueueManager {
    /// Build the manager with no zones
    ///
    /// Every queue created later shares one trigger bridge pointing back at
    /// this manager.
    pub fn new(
        settings: QueueSettings,
        bus: EventBus,
        dispatcher: Arc<dyn AudioDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|manager| Self {
            zones: RwLock::new(HashMap::new()),
            settings,
            bus,
            dispatcher,
            clock,
            handler: Arc::new(TriggerBridge::new(manager.clone())),
        })
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe to snapshots and trigger notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StationEvent> {
        self.bus.subscribe()
    }

    // ------------------------------------------------------------------
    // Zones
    // ------------------------------------------------------------------

    /// Create an empty queue for a zone
    ///
    /// `gap` overrides the shared default. Returns false if the zone already
    /// exists (the existing queue is kept).
    pub fn add_zone(&self, zone_id: &str, gap: Option<Duration>) -> bool {
        let mut zones = self.zones.write().unwrap_or_else(PoisonError::into_inner);
        if zones.contains_key(zone_id) {
            warn!(zone = %zone_id, "Zone already exists");
            return false;
        }

        let mut settings = self.settings.clone();
        if let Some(gap) = gap {
            settings.gap = gap;
        }
        info!(zone = %zone_id, gap_secs = settings.gap.num_seconds(), "Zone added");
        let queue = Queue::new(zone_id, settings, self.handler.clone());
        zones.insert(zone_id.to_string(), Arc::new(Mutex::new(queue)));
        true
    }

    /// Drop a zone and cancel its armed timer
    pub fn remove_zone(&self, zone_id: &str) -> Result<()> {
        let removed = self
            .zones
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(zone_id);
        let Some(queue) = removed else {
            error!(zone = %zone_id, operation = "remove_zone", "Unknown zone");
            return Err(Error::ZoneNotFound(zone_id.to_string()));
        };
        lock(&queue).cancel_timer();
        info!(zone = %zone_id, "Zone removed");
        Ok(())
    }

    /// Ids of all zones, sorted
    pub fn zone_ids(&self) -> Vec<String> {
        let zones = self.zones.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = zones.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn find(&self, zone_id: &str) -> Option<Arc<Mutex<Queue>>> {
        self.zones
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(zone_id)
            .cloned()
    }

    fn queue(&self, zone_id: &str, operation: &'static str) -> Result<Arc<Mutex<Queue>>> {
        self.find(zone_id).ok_or_else(|| {
            error!(zone = %zone_id, operation, "Unknown zone");
            Error::ZoneNotFound(zone_id.to_string())
        })
    }

    /// Run a structural mutation and publish the resulting snapshot
    ///
    /// A failed mutation leaves the schedule untouched and publishes nothing.
    fn mutate<T>(
        &self,
        zone_id: &str,
        operation: &'static str,
        f: impl FnOnce(&mut Queue, DateTime<Utc>) -> Result<T>,
    ) -> Result<T> {
        let queue = self.queue(zone_id, operation)?;
        let now = self.clock.now();

        let (value, snapshot) = {
            let mut queue = lock(&queue);
            let value = f(&mut *queue, now)?;
            queue.reschedule(now);
            (value, queue.snapshot())
        };

        self.bus.emit_lossy(StationEvent::QueueChange(snapshot));
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Schedule mutations
    // ------------------------------------------------------------------

    /// Expand and insert an announcement; returns the created event ids
    pub fn enqueue(&self, zone_id: &str, annon: &Announcement) -> Result<Vec<String>> {
        self.mutate(zone_id, "enqueue", |queue, _| queue.add(annon))
    }

    /// Replace the events of `old` with those of `next`
    pub fn update(
        &self,
        zone_id: &str,
        next: &Announcement,
        old: &Announcement,
    ) -> Result<Vec<String>> {
        self.mutate(zone_id, "update", |queue, _| queue.update(next, old))
    }

    /// Remove every event of an announcement; returns how many were removed
    pub fn delete_annon(&self, zone_id: &str, annon_id: &str) -> Result<usize> {
        self.mutate(zone_id, "delete_annon", |queue, _| {
            Ok(queue.remove_annon(annon_id))
        })
    }

    pub fn set_volume(&self, zone_id: &str, volume: f32) -> Result<()> {
        self.mutate(zone_id, "set_volume", |queue, _| {
            queue.set_volume(volume);
            debug!(zone = %zone_id, volume = queue.volume(), "Volume set");
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Mute control
    // ------------------------------------------------------------------

    /// Flip one event's mute flag; returns the new value
    pub fn toggle_mute(&self, zone_id: &str, event_id: &str) -> Result<bool> {
        self.mutate(zone_id, "toggle_mute", |queue, _| queue.toggle_mute(event_id))
    }

    pub fn mute_all(&self, zone_id: &str) -> Result<()> {
        self.mutate(zone_id, "mute_all", |queue, _| {
            queue.set_mute(true);
            Ok(())
        })
    }

    pub fn unmute_all(&self, zone_id: &str) -> Result<()> {
        self.mutate(zone_id, "unmute_all", |queue, _| {
            queue.set_mute(false);
            Ok(())
        })
    }

    /// Mute the zone's next event if it starts before `window_end`
    pub fn mute_first_if_required(
        &self,
        zone_id: &str,
        window_end: DateTime<Utc>,
    ) -> Result<bool> {
        self.mutate(zone_id, "mute_first_if_required", |queue, _| {
            Ok(queue.mute_first_if_required(window_end))
        })
    }

    // ------------------------------------------------------------------
    // Playback
    // ------------------------------------------------------------------

    /// Play an event immediately on operator request
    ///
    /// The armed next event is muted if it would start before this one is
    /// over (`now + duration + gap`). The manual event is marked fired and
    /// dispatched unless the whole zone is muted. Returns whether audio was
    /// dispatched.
    pub fn play_manual(&self, zone_id: &str, event_id: &str) -> Result<bool> {
        let queue = self.queue(zone_id, "play_manual")?;
        let now = self.clock.now();

        let (event, dispatched, volume, snapshot) = {
            let mut queue = lock(&queue);
            let event = queue
                .get_event(event_id)
                .cloned()
                .ok_or_else(|| Error::EventNotFound {
                    zone: zone_id.to_string(),
                    event: event_id.to_string(),
                })?;

            let window_end = now + event.duration + queue.gap();
            queue.mute_first_if_required(window_end);
            queue.mark_fired(event_id)?;
            queue.reschedule(now);

            (event, !queue.is_muted(), queue.volume(), queue.snapshot())
        };

        info!(zone = %zone_id, event = %event_id, dispatched, "Manual playback");
        if dispatched {
            self.dispatch(zone_id, &event, volume);
        }
        self.publish_trigger(zone_id, &event.id, dispatched, now);
        self.bus.emit_lossy(StationEvent::QueueChange(snapshot));
        Ok(dispatched)
    }

    /// Timer callback routed here by the trigger bridge
    ///
    /// Ignores firings that no longer match the queue: the event was removed,
    /// already fired, or rescheduled to a different start.
    pub(crate) fn on_timer_elapsed(&self, zone_id: &str, fired: &Event) {
        let Some(queue) = self.find(zone_id) else {
            warn!(zone = %zone_id, event = %fired.id, "Trigger for removed zone ignored");
            return;
        };
        let now = self.clock.now();

        let (event, dispatched, volume, snapshot) = {
            let mut queue = lock(&queue);
            let Some(event) = queue.get_event(&fired.id).cloned() else {
                warn!(zone = %zone_id, event = %fired.id, "Fired event no longer queued");
                return;
            };
            if event.fired || event.playback_start != fired.playback_start {
                debug!(zone = %zone_id, event = %event.id, "Stale trigger ignored");
                return;
            }

            let dispatched = queue.should_dispatch(&event);
            if let Err(e) = queue.mark_fired(&event.id) {
                warn!(zone = %zone_id, "Could not mark event fired: {}", e);
                return;
            }
            if let Err(e) = queue.update_next_playback(now) {
                warn!(zone = %zone_id, "Next playback not armed: {}", e);
            }

            (event, dispatched, queue.volume(), queue.snapshot())
        };

        if dispatched {
            self.dispatch(zone_id, &event, volume);
        } else {
            info!(zone = %zone_id, event = %event.id, "Playback suppressed by mute");
        }
        self.publish_trigger(zone_id, &event.id, dispatched, now);
        self.bus.emit_lossy(StationEvent::QueueChange(snapshot));
    }

    /// Hand audio to the dispatcher on tokio's blocking pool without waiting
    /// for it. Must run inside a tokio runtime.
    fn dispatch(&self, zone_id: &str, event: &Event, volume: f32) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let zone_id = zone_id.to_string();
        let event = event.clone();
        tokio::task::spawn_blocking(move || {
            dispatcher.dispatch(&zone_id, &event, volume);
        });
    }

    fn publish_trigger(&self, zone_id: &str, event_id: &str, dispatched: bool, at: DateTime<Utc>) {
        self.bus.emit_lossy(StationEvent::PlaybackTriggered {
            queue_id: zone_id.to_string(),
            event_id: event_id.to_string(),
            dispatched,
            timestamp: at,
        });
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get_event(&self, zone_id: &str, event_id: &str) -> Result<Event> {
        let queue = self.queue(zone_id, "get_event")?;
        let queue = lock(&queue);
        queue
            .get_event(event_id)
            .cloned()
            .ok_or_else(|| Error::EventNotFound {
                zone: zone_id.to_string(),
                event: event_id.to_string(),
            })
    }

    /// Lifecycle status of an event; `None` once purged or removed
    pub fn status_of(&self, zone_id: &str, event_id: &str) -> Result<Option<EventStatus>> {
        let queue = self.queue(zone_id, "status_of")?;
        let now = self.clock.now();
        let status = lock(&queue).status_of(event_id, now);
        Ok(status)
    }

    pub fn snapshot(&self, zone_id: &str) -> Result<QueueSnapshot> {
        let queue = self.queue(zone_id, "snapshot")?;
        let snapshot = lock(&queue).snapshot();
        Ok(snapshot)
    }

    /// Publish a zone's full contents as `QueueContent`
    pub fn publish_content(&self, zone_id: &str) -> Result<()> {
        let snapshot = self.snapshot(zone_id)?;
        self.bus.emit_lossy(StationEvent::QueueContent(snapshot));
        Ok(())
    }

    /// Publish `QueueContent` for every zone
    pub fn publish_all_contents(&self) {
        for zone_id in self.zone_ids() {
            if let Err(e) = self.publish_content(&zone_id) {
                debug!(zone = %zone_id, "Zone vanished while publishing: {}", e);
            }
        }
    }

    /// Cancel every armed timer
    ///
    /// Queues keep their events; nothing fires until a later mutation
    /// reschedules them.
    pub fn shutdown(&self) {
        let queues: Vec<Arc<Mutex<Queue>>> = self
            .zones
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for queue in &queues {
            lock(queue).cancel_timer();
        }
        info!(zones = queues.len(), "All playback timers cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::LoggingDispatcher;
    use announce_common::time::SystemClock;
    use announce_common::{AnnonType, Priority};

    fn manager() -> Arc<QueueManager> {
        QueueManager::new(
            QueueSettings::default(),
            EventBus::new(16),
            Arc::new(LoggingDispatcher),
            Arc::new(SystemClock),
        )
    }

    fn announcement(id: &str, minutes_ahead: i64) -> Announcement {
        Announcement {
            id: id.to_string(),
            train_id: None,
            annon_type: AnnonType::Departure,
            time: vec![Utc::now() + Duration::minutes(minutes_ahead)],
            priority: Priority::P3,
            audio: None,
            lang: "en".to_string(),
            text: String::new(),
            autoplay: true,
        }
    }

    #[test]
    fn test_add_zone_rejects_duplicate() {
        let manager = manager();
        assert!(manager.add_zone("platform-1", None));
        assert!(!manager.add_zone("platform-1", Some(Duration::seconds(9))));
        assert!(manager.add_zone("hall", Some(Duration::seconds(9))));
        assert_eq!(manager.zone_ids(), vec!["hall", "platform-1"]);
    }

    #[tokio::test]
    async fn test_unknown_zone_is_an_error_not_a_panic() {
        let manager = manager();
        let annon = announcement("a", 5);

        assert!(matches!(
            manager.enqueue("nowhere", &annon),
            Err(Error::ZoneNotFound(_))
        ));
        assert!(matches!(
            manager.set_volume("nowhere", 0.5),
            Err(Error::ZoneNotFound(_))
        ));
        assert!(matches!(
            manager.remove_zone("nowhere"),
            Err(Error::ZoneNotFound(_))
        ));
        assert!(manager.snapshot("nowhere").is_err());
    }

    #[tokio::test]
    async fn test_enqueue_publishes_snapshot() {
        let manager = manager();
        manager.add_zone("platform-1", None);
        let mut rx = manager.subscribe();

        let ids = manager
            .enqueue("platform-1", &announcement("a", 5))
            .unwrap();
        assert_eq!(ids.len(), 1);

        match rx.try_recv().unwrap() {
            StationEvent::QueueChange(snapshot) => {
                assert_eq!(snapshot.queue_id, "platform-1");
                assert_eq!(snapshot.events.len(), 1);
                assert_eq!(snapshot.next.unwrap().id, ids[0]);
            }
            other => panic!("unexpected event {:?}", other.event_type()),
        }
    }

    #[tokio::test]
    async fn test_failed_mutation_publishes_nothing() {
        let manager = manager();
        manager.add_zone("platform-1", None);
        let mut rx = manager.subscribe();

        assert!(manager.toggle_mute("platform-1", "missing").is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_zone_disarms_timer() {
        let manager = manager();
        manager.add_zone("platform-1", None);
        manager
            .enqueue("platform-1", &announcement("a", 5))
            .unwrap();
        let queue = manager.find("platform-1").unwrap();
        assert!(lock(&queue).armed_generation().is_some());

        manager.remove_zone("platform-1").unwrap();
        assert!(lock(&queue).armed_generation().is_none());
        assert!(manager.zone_ids().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_all_timers() {
        let manager = manager();
        manager.add_zone("a", None);
        manager.add_zone("b", None);
        manager.enqueue("a", &announcement("x", 5)).unwrap();
        manager.enqueue("b", &announcement("y", 7)).unwrap();

        manager.shutdown();
        for zone in ["a", "b"] {
            let queue = manager.find(zone).unwrap();
            assert!(lock(&queue).armed_generation().is_none());
            // Events are kept
            assert_eq!(lock(&queue).len(), 1);
        }
    }
}
