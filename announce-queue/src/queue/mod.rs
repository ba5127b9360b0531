//! Per-zone playback queue
//!
//! A `Queue` merges announcement occurrences from every producer into one
//! time-ordered schedule for a zone:
//!
//! 1. `add_to_queue` places a new event with priority-based conflict
//!    resolution (a higher-priority or earlier candidate may displace queued
//!    events, and the displaced event continues the scan).
//! 2. `adjust_playback` walks the list once and pushes each event behind its
//!    predecessor plus `gap`, so delays cascade in a single pass.
//! 3. `update_next_playback` prunes old history, picks the first future
//!    autoplay event and arms the timer for it.
//!
//! The queue itself is not synchronized; the manager wraps each one in a
//! mutex and runs the mutate/adjust/reschedule sequence under that lock.

pub mod event;
pub mod mute;
pub mod timer;

pub use event::{Event, EventStatus};
pub use timer::{PlaybackTimer, TriggerHandler};

use std::sync::Arc;

use announce_common::announcement::DEFAULT_DURATION_SECS;
use announce_common::Announcement;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::events::QueueSnapshot;

/// Residual overlap a higher-priority candidate must exceed to displace a
/// lower-priority event
pub const DISPLACEMENT_THRESHOLD_SECS: i64 = 15;

/// Per-queue scheduling parameters
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSettings {
    /// Minimum silence between consecutive playbacks
    pub gap: Duration,
    /// Number of trailing events kept once they have finished
    pub memory: usize,
    /// Used when an announcement has no audio duration
    pub default_duration: Duration,
    /// Initial zone volume (0.0-1.0)
    pub volume: f32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            gap: Duration::seconds(3),
            memory: 5,
            default_duration: Duration::seconds(DEFAULT_DURATION_SECS),
            volume: 1.0,
        }
    }
}

/// The event currently selected for automatic playback
#[derive(Debug, Clone, PartialEq)]
struct NextPlayback {
    event_id: String,
    playback_start: DateTime<Utc>,
}

/// Ordered schedule for one broadcast zone
pub struct Queue {
    zone_id: String,
    events: Vec<Event>,
    gap: Duration,
    memory: usize,
    default_duration: Duration,
    next: Option<NextPlayback>,
    timer: Option<PlaybackTimer>,
    generation: u64,
    mute: bool,
    volume: f32,
    handler: Arc<dyn TriggerHandler>,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("zone_id", &self.zone_id)
            .field("events", &self.events.len())
            .field("next", &self.next)
            .field("generation", &self.generation)
            .field("mute", &self.mute)
            .field("volume", &self.volume)
            .finish()
    }
}

impl Queue {
    /// Create an empty queue for `zone_id`
    pub fn new(
        zone_id: impl Into<String>,
        settings: QueueSettings,
        handler: Arc<dyn TriggerHandler>,
    ) -> Self {
        Self {
            zone_id: zone_id.into(),
            events: Vec::new(),
            gap: settings.gap,
            memory: settings.memory,
            default_duration: settings.default_duration,
            next: None,
            timer: None,
            generation: 0,
            mute: false,
            volume: settings.volume.clamp(0.0, 1.0),
            handler,
        }
    }

    pub fn zone_id(&self) -> &str {
        &self.zone_id
    }

    /// Events in playback order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn gap(&self) -> Duration {
        self.gap
    }

    pub fn memory(&self) -> usize {
        self.memory
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Set zone volume, clamped to 0.0-1.0
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn get_event(&self, event_id: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.id == event_id)
    }

    pub(crate) fn get_event_mut(&mut self, event_id: &str) -> Option<&mut Event> {
        self.events.iter_mut().find(|e| e.id == event_id)
    }

    /// Event currently selected for the next automatic trigger
    pub fn next(&self) -> Option<&Event> {
        let next = self.next.as_ref()?;
        self.get_event(&next.event_id)
    }

    /// Generation of the armed timer, if one is armed
    pub fn armed_generation(&self) -> Option<u64> {
        self.timer
            .as_ref()
            .filter(|t| !t.is_cancelled())
            .map(PlaybackTimer::generation)
    }

    /// Expand an announcement and insert every occurrence
    ///
    /// Returns the ids of the created events. Call `adjust_playback` and
    /// `update_next_playback` afterwards. An announcement with out-of-range
    /// timing is rejected and the queue is left unchanged.
    pub fn add(&mut self, annon: &Announcement) -> Result<Vec<String>> {
        let events = Event::expand(annon, self.default_duration).map_err(|e| {
            warn!(zone = %self.zone_id, annon = %annon.id, "Announcement rejected: {}", e);
            e
        })?;
        let ids = events.iter().map(|e| e.id.clone()).collect();
        for event in events {
            self.add_to_queue(event);
        }
        debug!(
            zone = %self.zone_id,
            annon = %annon.id,
            occurrences = annon.time.len(),
            "Announcement added"
        );
        Ok(ids)
    }

    /// Replace every event of `old` with the occurrences of `next`
    ///
    /// `old` is kept if `next` is rejected.
    pub fn update(&mut self, next: &Announcement, old: &Announcement) -> Result<Vec<String>> {
        next.validate()?;
        let removed = self.remove_annon(&old.id);
        debug!(zone = %self.zone_id, annon = %old.id, removed, "Superseding announcement");
        self.add(next)
    }

    /// Remove every event belonging to an announcement
    ///
    /// Returns the number of events removed. If the armed event is among
    /// them its timer is cancelled.
    pub fn remove_annon(&mut self, annon_id: &str) -> usize {
        let before = self.events.len();
        self.events.retain(|e| e.annon_id != annon_id);
        let removed = before - self.events.len();

        let next_removed = self
            .next
            .as_ref()
            .is_some_and(|next| self.events.iter().all(|e| e.id != next.event_id));
        if next_removed {
            self.cancel_timer();
        }
        removed
    }

    /// Insert a single event with conflict resolution
    ///
    /// Scans from the head. A candidate that belongs before a non-conflicting
    /// event is spliced in there. A candidate that wins a conflict takes the
    /// slot and the displaced event becomes the candidate for the rest of the
    /// list. Whatever candidate is left at the end is appended.
    pub fn add_to_queue(&mut self, event: Event) {
        if self.events.is_empty() {
            self.events.push(event);
            return;
        }

        let mut candidate = event;
        let mut i = 0;
        while i < self.events.len() {
            let (insert, conflict) = compare(&self.events[i], &candidate);
            if insert && !conflict {
                self.events.insert(i, candidate);
                return;
            }
            if insert {
                candidate = std::mem::replace(&mut self.events[i], candidate);
                debug!(
                    zone = %self.zone_id,
                    winner = %self.events[i].id,
                    displaced = %candidate.id,
                    "Event displaced"
                );
            }
            i += 1;
        }
        self.events.push(candidate);
    }

    /// Enforce `gap` between consecutive playbacks in one forward pass
    ///
    /// Each event consumes the already-adjusted end of its predecessor.
    /// Playback windows only ever move later: removing an event does not pull
    /// its followers forward, and fired events are never moved.
    pub fn adjust_playback(&mut self) {
        for i in 1..self.events.len() {
            let (head, tail) = self.events.split_at_mut(i);
            if tail[0].fired {
                continue;
            }
            tail[0].adjust_playback_time(&head[i - 1], self.gap);
        }
    }

    /// Prune history, pick the next autoplay event and arm its timer
    ///
    /// Leaves an already-armed timer alone when the selection has not changed.
    /// Must run inside a tokio runtime because arming spawns a task.
    pub fn update_next_playback(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.cleanup_old(now);

        let Some(first) = self.first_future(now).cloned() else {
            if self.next.is_some() {
                debug!(zone = %self.zone_id, "No future autoplay event, disarming");
                self.cancel_timer();
            }
            return Ok(());
        };

        let unchanged = self.next.as_ref().is_some_and(|next| {
            next.event_id == first.id && next.playback_start == first.playback_start
        }) && self.armed_generation().is_some();
        if unchanged {
            return Ok(());
        }

        self.set_next_playback(first, now)
    }

    /// Cancel any armed timer and arm a new one for `event`
    ///
    /// Scheduling in the past is rejected: nothing is armed and the next
    /// `update_next_playback` gets another chance.
    pub fn set_next_playback(&mut self, event: Event, now: DateTime<Utc>) -> Result<()> {
        self.cancel_timer();

        let delay = event.playback_start - now;
        if delay < Duration::zero() {
            error!(
                zone = %self.zone_id,
                event = %event.id,
                playback_start = %event.playback_start,
                now = %now,
                "Refusing to schedule playback in the past"
            );
            return Err(Error::InvalidTiming(format!(
                "event {} starts at {}, which is before {}",
                event.id, event.playback_start, now
            )));
        }
        let delay = delay
            .to_std()
            .map_err(|e| Error::InvalidTiming(format!("delay out of range: {}", e)))?;

        self.generation += 1;
        info!(
            zone = %self.zone_id,
            event = %event.id,
            playback_start = %event.playback_start,
            generation = self.generation,
            "Next playback scheduled"
        );
        self.next = Some(NextPlayback {
            event_id: event.id.clone(),
            playback_start: event.playback_start,
        });
        self.timer = Some(PlaybackTimer::arm(
            self.zone_id.clone(),
            event,
            delay,
            self.generation,
            self.handler.clone(),
        ));
        Ok(())
    }

    /// Cancel the armed timer, if any, and clear the next selection
    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
            debug!(zone = %self.zone_id, generation = timer.generation(), "Timer cancelled");
        }
        self.next = None;
    }

    /// Drop old history
    ///
    /// Removes the head while more than `memory` events exist and the event
    /// at index `memory` has already finished playing.
    pub fn cleanup_old(&mut self, now: DateTime<Utc>) {
        while self.events.len() > self.memory && self.events[self.memory].playback_end < now {
            let purged = self.events.remove(0);
            debug!(zone = %self.zone_id, event = %purged.id, "Event purged from history");
        }
    }

    /// First event that starts strictly after `now` and may autoplay
    pub fn first_future(&self, now: DateTime<Utc>) -> Option<&Event> {
        self.events
            .iter()
            .find(|e| e.playback_start > now && e.autoplay)
    }

    /// Record that the trigger handler ran for an event
    ///
    /// Clears `autoplay` so the event is never selected again.
    pub fn mark_fired(&mut self, event_id: &str) -> Result<()> {
        let zone = self.zone_id.clone();
        let event = self
            .get_event_mut(event_id)
            .ok_or_else(|| Error::EventNotFound {
                zone,
                event: event_id.to_string(),
            })?;
        event.fired = true;
        event.autoplay = false;
        Ok(())
    }

    /// Lifecycle status of an event still in the queue
    pub fn status_of(&self, event_id: &str, now: DateTime<Utc>) -> Option<EventStatus> {
        let event = self.get_event(event_id)?;
        let armed = self
            .next
            .as_ref()
            .is_some_and(|next| next.event_id == event_id)
            && self.armed_generation().is_some();

        let status = if event.fired {
            if event.playback_end > now {
                EventStatus::Fired
            } else {
                EventStatus::Retained
            }
        } else if armed {
            EventStatus::Armed
        } else if event.playback_end <= now {
            EventStatus::Retained
        } else {
            EventStatus::Pending
        };
        Some(status)
    }

    /// Adjust and reschedule after a structural change
    ///
    /// A rejected arm is logged by `set_next_playback` and otherwise ignored;
    /// the next reschedule recomputes from scratch.
    pub fn reschedule(&mut self, now: DateTime<Utc>) {
        self.adjust_playback();
        if let Err(e) = self.update_next_playback(now) {
            debug!(zone = %self.zone_id, "Reschedule skipped: {}", e);
        }
    }

    /// Serializable copy of the queue state for the bus
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            queue_id: self.zone_id.clone(),
            mute: self.mute,
            events: self.events.clone(),
            next: self.next().cloned(),
        }
    }
}

/// Compare a queued event against an insertion candidate
///
/// Returns `(insert, conflict)`: `insert` means the candidate belongs at the
/// current position, `conflict` means their nominal windows overlap.
pub fn compare(current: &Event, candidate: &Event) -> (bool, bool) {
    let (overlapping, difference) = overlap(current, candidate);
    if !overlapping {
        return (difference > Duration::zero(), false);
    }

    let insert = if current.priority == candidate.priority {
        if difference == Duration::zero() {
            candidate.duration < current.duration
        } else {
            difference > Duration::zero()
        }
    } else if current.priority.outranks(candidate.priority) {
        false
    } else {
        let residual = current.end_time - candidate.start_time;
        residual > Duration::seconds(DISPLACEMENT_THRESHOLD_SECS)
    };
    (insert, true)
}

/// Overlap test on nominal windows
///
/// Returns whether the windows intersect and
/// `current.start_time - candidate.start_time`.
pub fn overlap(current: &Event, candidate: &Event) -> (bool, Duration) {
    (
        current.overlaps(candidate),
        current.start_time - candidate.start_time,
    )
}
