//! Scheduled playback occurrence
//!
//! One `Event` is created per occurrence timestamp of an announcement. The
//! nominal window (`start_time..end_time`) is what the producer asked for;
//! the playback window (`playback_start..playback_end`) is where the queue
//! actually placed it after enforcing gaps.

use announce_common::time::duration_secs;
use announce_common::{AnnonType, Announcement, Priority};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// `at + by`, saturating at the latest representable instant
fn offset(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A single scheduled playback of an announcement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique per occurrence
    pub id: String,
    /// Groups all events expanded from one announcement
    pub annon_id: String,
    #[serde(default)]
    pub train_id: Option<String>,
    #[serde(default)]
    pub annon_type: AnnonType,
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub text: String,

    /// Nominal start, as computed by the producer
    pub start_time: DateTime<Utc>,
    /// Nominal end (`start_time + duration`)
    pub end_time: DateTime<Utc>,
    /// Actual start after gap enforcement, never before `start_time`
    pub playback_start: DateTime<Utc>,
    /// Always `playback_start + duration`
    pub playback_end: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub duration: Duration,

    pub priority: Priority,
    /// Suppresses audio dispatch for this event only
    pub mute: bool,
    /// Whether the scheduler may trigger this event on its own
    pub autoplay: bool,
    /// Set once the trigger handler has run for this event
    #[serde(default)]
    pub fired: bool,
}

/// Lifecycle position of an event still held by a queue
///
/// Events that were purged by history cleanup or removed by a delete/update
/// are no longer in the queue and have no status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EventStatus {
    /// Inserted, waiting to become the next trigger
    Pending,
    /// Selected as the queue's next trigger with a timer running
    Armed,
    /// Handler ran and the playback window has not finished yet
    Fired,
    /// Playback window is over; kept as history
    Retained,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventStatus::Pending => write!(f, "Pending"),
            EventStatus::Armed => write!(f, "Armed"),
            EventStatus::Fired => write!(f, "Fired"),
            EventStatus::Retained => write!(f, "Retained"),
        }
    }
}

impl Event {
    /// Create an autoplay event whose playback window equals its nominal window
    pub fn new(
        id: impl Into<String>,
        annon_id: impl Into<String>,
        start_time: DateTime<Utc>,
        duration: Duration,
        priority: Priority,
    ) -> Self {
        let end_time = offset(start_time, duration);
        Self {
            id: id.into(),
            annon_id: annon_id.into(),
            train_id: None,
            annon_type: AnnonType::default(),
            lang: String::new(),
            text: String::new(),
            start_time,
            end_time,
            playback_start: start_time,
            playback_end: end_time,
            duration,
            priority,
            mute: false,
            autoplay: true,
            fired: false,
        }
    }

    /// Expand one occurrence of an announcement into an event
    pub fn from_announcement(
        annon: &Announcement,
        at: DateTime<Utc>,
        default_duration: Duration,
    ) -> Self {
        let mut event = Self::new(
            Uuid::new_v4().to_string(),
            annon.id.clone(),
            at,
            annon.duration(default_duration),
            annon.priority,
        );
        event.train_id = annon.train_id.clone();
        event.annon_type = annon.annon_type;
        event.lang = annon.lang.clone();
        event.text = annon.text.clone();
        event.autoplay = annon.autoplay;
        event
    }

    /// Expand every occurrence of an announcement
    ///
    /// Fails without creating anything if the announcement's timing is out of range.
    pub fn expand(annon: &Announcement, default_duration: Duration) -> Result<Vec<Self>> {
        annon.validate()?;
        Ok(annon
            .time
            .iter()
            .map(|at| Self::from_announcement(annon, *at, default_duration))
            .collect())
    }

    /// Push this event behind `previous` when their playback windows touch
    ///
    /// `previous` must already be adjusted. Returns true if the event moved.
    pub fn adjust_playback_time(&mut self, previous: &Event, gap: Duration) -> bool {
        if self.playback_start > previous.playback_end {
            return false;
        }
        self.playback_start = offset(previous.playback_end, gap);
        self.playback_end = offset(self.playback_start, self.duration);
        true
    }

    /// True if the nominal windows `[start_time, end_time)` intersect
    pub fn overlaps(&self, other: &Event) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}
