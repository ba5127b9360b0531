//! Announcement records produced by the announcement generators
//!
//! An announcement is the logical unit a generator emits. It may carry
//! several occurrence timestamps; the playback queue expands it into one
//! scheduled event per occurrence.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Duration assumed when an announcement carries no audio duration
pub const DEFAULT_DURATION_SECS: i64 = 90;

/// Longest audio duration accepted (one day)
pub const MAX_DURATION_SECS: i64 = 86_400;

/// Latest year an occurrence may be scheduled in
pub const MAX_YEAR: i32 = 9999;

/// Announcement importance
///
/// `P1` is the most important level and orders first (numerically smallest).
/// Serialized as the bare level number (1-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    P1 = 1,
    P2 = 2,
    #[default]
    P3 = 3,
    P4 = 4,
    P5 = 5,
}

impl Priority {
    /// True if `self` is strictly more important than `other`
    pub fn outranks(self, other: Priority) -> bool {
        self < other
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(level: u8) -> std::result::Result<Self, Self::Error> {
        match level {
            1 => Ok(Priority::P1),
            2 => Ok(Priority::P2),
            3 => Ok(Priority::P3),
            4 => Ok(Priority::P4),
            5 => Ok(Priority::P5),
            other => Err(format!("priority must be between 1 and 5, got {}", other)),
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority as u8
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", *self as u8)
    }
}

/// Kind of announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum AnnonType {
    Arrival,
    Departure,
    Delay,
    #[default]
    Custom,
}

impl std::fmt::Display for AnnonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnnonType::Arrival => write!(f, "Arrival"),
            AnnonType::Departure => write!(f, "Departure"),
            AnnonType::Delay => write!(f, "Delay"),
            AnnonType::Custom => write!(f, "Custom"),
        }
    }
}

/// Rendered audio attached to an announcement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioInfo {
    /// Audio length in seconds
    #[serde(default)]
    pub duration: Option<f64>,

    /// Where the rendered audio can be fetched from
    #[serde(default)]
    pub url: Option<String>,
}

/// Announcement as emitted by a generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    /// Announcement id; every derived event carries it as `annonId`
    pub id: String,

    #[serde(default)]
    pub train_id: Option<String>,

    #[serde(default)]
    pub annon_type: AnnonType,

    /// Occurrence timestamps, one scheduled event each
    #[serde(default)]
    pub time: Vec<DateTime<Utc>>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub audio: Option<AudioInfo>,

    #[serde(default)]
    pub lang: String,

    #[serde(default)]
    pub text: String,

    #[serde(default = "default_autoplay")]
    pub autoplay: bool,
}

fn default_autoplay() -> bool {
    true
}

impl Announcement {
    /// Playback length, falling back to `default` when no audio duration is known
    ///
    /// Fractional seconds are rounded up so the window never undershoots the audio.
    /// Lengths above `MAX_DURATION_SECS` are capped; `validate` rejects them.
    pub fn duration(&self, default: Duration) -> Duration {
        match self.audio_secs() {
            Some(secs) if secs > 0.0 => {
                let secs = secs.ceil().min(MAX_DURATION_SECS as f64) as i64;
                Duration::try_seconds(secs).unwrap_or(default)
            }
            _ => default,
        }
    }

    fn audio_secs(&self) -> Option<f64> {
        self.audio
            .as_ref()
            .and_then(|audio| audio.duration)
            .filter(|secs| secs.is_finite())
    }

    /// Reject announcements whose timing cannot be scheduled
    ///
    /// The audio duration must not exceed `MAX_DURATION_SECS` and every
    /// occurrence must fall no later than year `MAX_YEAR`.
    pub fn validate(&self) -> Result<()> {
        if let Some(secs) = self.audio_secs() {
            if secs > MAX_DURATION_SECS as f64 {
                return Err(Error::InvalidInput(format!(
                    "announcement {}: audio duration {}s exceeds {}s",
                    self.id, secs, MAX_DURATION_SECS
                )));
            }
        }
        if let Some(at) = self.time.iter().find(|at| at.year() > MAX_YEAR) {
            return Err(Error::InvalidInput(format!(
                "announcement {}: occurrence {} is after year {}",
                self.id, at, MAX_YEAR
            )));
        }
        Ok(())
    }
}
