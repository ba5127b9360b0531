//! Test helpers for announce-queue integration tests
//!
//! Provides recording doubles for the collaborator traits:
//! - VirtualClock: wall clock driven by tokio's paused time
//! - RecordingDispatcher: records every audio dispatch
//! - RecordingHandler: records raw timer firings of a bare `Queue`

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use announce_common::time::Clock;
use announce_common::{AnnonType, Announcement, AudioInfo, Priority};
use announce_queue::{
    AudioDispatcher, Event, EventBus, QueueManager, QueueSettings, StationEvent, TriggerHandler,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::broadcast;

pub fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
}

/// Wall clock that advances with tokio's (paused) clock
///
/// `now()` is `base` plus the virtual time elapsed since construction, so
/// timer delays computed from it line up with `tokio::time::sleep`.
pub struct VirtualClock {
    base: DateTime<Utc>,
    start: tokio::time::Instant,
}

impl VirtualClock {
    /// Must be created inside the tokio runtime
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            start: tokio::time::Instant::now(),
        }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now() - self.start;
        self.base + Duration::from_std(elapsed).unwrap()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub zone_id: String,
    pub event_id: String,
    pub annon_id: String,
    pub volume: f32,
}

#[derive(Default)]
pub struct RecordingDispatcher {
    pub calls: Mutex<Vec<Dispatch>>,
}

impl RecordingDispatcher {
    pub fn calls(&self) -> Vec<Dispatch> {
        self.calls.lock().unwrap().clone()
    }
}

impl AudioDispatcher for RecordingDispatcher {
    fn dispatch(&self, zone_id: &str, event: &Event, volume: f32) {
        self.calls.lock().unwrap().push(Dispatch {
            zone_id: zone_id.to_string(),
            event_id: event.id.clone(),
            annon_id: event.annon_id.clone(),
            volume,
        });
    }
}

#[derive(Default)]
pub struct RecordingHandler {
    pub calls: Mutex<Vec<(String, Event)>>,
}

impl RecordingHandler {
    pub fn calls(&self) -> Vec<(String, Event)> {
        self.calls.lock().unwrap().clone()
    }
}

impl TriggerHandler for RecordingHandler {
    fn on_trigger(&self, zone_id: &str, event: &Event) {
        self.calls
            .lock()
            .unwrap()
            .push((zone_id.to_string(), event.clone()));
    }
}

/// Manager wired to a virtual clock and a recording dispatcher
pub struct Harness {
    pub manager: Arc<QueueManager>,
    pub clock: Arc<VirtualClock>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub rx: broadcast::Receiver<StationEvent>,
}

impl Harness {
    pub fn new(now: DateTime<Utc>) -> Self {
        let clock = Arc::new(VirtualClock::new(now));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let manager = QueueManager::new(
            QueueSettings::default(),
            EventBus::new(256),
            dispatcher.clone(),
            clock.clone(),
        );
        let rx = manager.subscribe();
        Self {
            manager,
            clock,
            dispatcher,
            rx,
        }
    }

    /// Everything published since the last drain
    pub fn drain(&mut self) -> Vec<StationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Triggers published in `events` as `(event_id, dispatched)`
pub fn triggers(events: &[StationEvent]) -> Vec<(String, bool)> {
    events
        .iter()
        .filter_map(|event| match event {
            StationEvent::PlaybackTriggered {
                event_id,
                dispatched,
                ..
            } => Some((event_id.clone(), *dispatched)),
            _ => None,
        })
        .collect()
}

pub fn announcement(
    id: &str,
    times: Vec<DateTime<Utc>>,
    duration_secs: Option<f64>,
    priority: Priority,
) -> Announcement {
    Announcement {
        id: id.to_string(),
        train_id: None,
        annon_type: AnnonType::Departure,
        time: times,
        priority,
        audio: duration_secs.map(|d| AudioInfo {
            duration: Some(d),
            url: None,
        }),
        lang: "en".to_string(),
        text: format!("Announcement {}", id),
        autoplay: true,
    }
}

pub fn secs(s: i64) -> Duration {
    Duration::seconds(s)
}

/// Sleep in virtual time (tests run with a paused clock)
pub async fn advance(secs: u64) {
    tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
}
