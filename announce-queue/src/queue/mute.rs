//! Playback suppression
//!
//! Two independent flags: `Event::mute` silences one occurrence, the queue's
//! `mute` silences the whole zone. Muted events still fire (so the schedule
//! keeps moving); only the audio dispatch is skipped.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{Event, Queue};
use crate::error::{Error, Result};

impl Queue {
    /// Flip the mute flag of one event, returning the new value
    pub fn toggle_mute(&mut self, event_id: &str) -> Result<bool> {
        let zone = self.zone_id.clone();
        let event = self
            .get_event_mut(event_id)
            .ok_or_else(|| Error::EventNotFound {
                zone: zone.clone(),
                event: event_id.to_string(),
            })?;
        event.mute = !event.mute;
        debug!(zone = %zone, event = %event_id, mute = event.mute, "Event mute toggled");
        Ok(event.mute)
    }

    /// Set the zone-wide mute flag
    pub fn set_mute(&mut self, mute: bool) {
        if self.mute != mute {
            info!(zone = %self.zone_id, mute, "Zone mute changed");
        }
        self.mute = mute;
    }

    pub fn is_muted(&self) -> bool {
        self.mute
    }

    /// Mute the next automatic event if it would start before `window_end`
    ///
    /// Keeps an automatic playback from running into an imminent manual one.
    /// Returns true if an event was muted.
    pub fn mute_first_if_required(&mut self, window_end: DateTime<Utc>) -> bool {
        let Some(next_id) = self.next.as_ref().map(|next| next.event_id.clone()) else {
            return false;
        };
        let zone = self.zone_id.clone();
        match self.get_event_mut(&next_id) {
            Some(event) if event.playback_start < window_end => {
                event.mute = true;
                info!(
                    zone = %zone,
                    event = %event.id,
                    playback_start = %event.playback_start,
                    "Muted upcoming event ahead of manual playback"
                );
                true
            }
            _ => false,
        }
    }

    /// Whether audio for `event` may be sent to the zone's devices
    ///
    /// Requires autoplay, an unmuted event and an unmuted zone.
    pub fn should_dispatch(&self, event: &Event) -> bool {
        event.autoplay && !event.mute && !self.mute
    }
}
