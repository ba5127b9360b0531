//! Control messages
//!
//! Operator and producer commands arrive as JSON objects tagged with a
//! `type` field, for example:
//!
//! ```json
//! {"type": "Volume", "queueId": "platform-1", "volume": 0.6}
//! {"type": "Delete", "queueId": "platform-1", "annonId": "ice-42"}
//! ```

use announce_common::Announcement;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::manager::QueueManager;

/// Decoded command for one zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    #[serde(rename_all = "camelCase")]
    Volume { queue_id: String, volume: f32 },

    #[serde(rename_all = "camelCase")]
    ToggleMute { queue_id: String, event_id: String },

    #[serde(rename_all = "camelCase")]
    MuteZone { queue_id: String },

    #[serde(rename_all = "camelCase")]
    UnmuteZone { queue_id: String },

    /// Manual playback of a queued event
    #[serde(rename_all = "camelCase")]
    PlayEvent { queue_id: String, event_id: String },

    #[serde(rename_all = "camelCase")]
    Enqueue {
        queue_id: String,
        announcement: Announcement,
    },

    /// Supersede `old` with `next`
    #[serde(rename_all = "camelCase")]
    Update {
        queue_id: String,
        next: Announcement,
        old: Announcement,
    },

    #[serde(rename_all = "camelCase")]
    Delete { queue_id: String, annon_id: String },

    /// Ask for a `QueueContent` publication
    #[serde(rename_all = "camelCase")]
    RequestContent { queue_id: String },
}

impl ControlMessage {
    /// Decode one JSON message
    pub fn decode(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// Zone the message targets
    pub fn queue_id(&self) -> &str {
        match self {
            ControlMessage::Volume { queue_id, .. }
            | ControlMessage::ToggleMute { queue_id, .. }
            | ControlMessage::MuteZone { queue_id }
            | ControlMessage::UnmuteZone { queue_id }
            | ControlMessage::PlayEvent { queue_id, .. }
            | ControlMessage::Enqueue { queue_id, .. }
            | ControlMessage::Update { queue_id, .. }
            | ControlMessage::Delete { queue_id, .. }
            | ControlMessage::RequestContent { queue_id } => queue_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Volume { .. } => "Volume",
            ControlMessage::ToggleMute { .. } => "ToggleMute",
            ControlMessage::MuteZone { .. } => "MuteZone",
            ControlMessage::UnmuteZone { .. } => "UnmuteZone",
            ControlMessage::PlayEvent { .. } => "PlayEvent",
            ControlMessage::Enqueue { .. } => "Enqueue",
            ControlMessage::Update { .. } => "Update",
            ControlMessage::Delete { .. } => "Delete",
            ControlMessage::RequestContent { .. } => "RequestContent",
        }
    }
}

impl QueueManager {
    /// Apply a decoded control message
    pub fn handle_control(&self, message: ControlMessage) -> Result<()> {
        debug!(zone = %message.queue_id(), kind = message.kind(), "Control message");
        match message {
            ControlMessage::Volume { queue_id, volume } => self.set_volume(&queue_id, volume),
            ControlMessage::ToggleMute { queue_id, event_id } => {
                self.toggle_mute(&queue_id, &event_id).map(|_| ())
            }
            ControlMessage::MuteZone { queue_id } => self.mute_all(&queue_id),
            ControlMessage::UnmuteZone { queue_id } => self.unmute_all(&queue_id),
            ControlMessage::PlayEvent { queue_id, event_id } => {
                self.play_manual(&queue_id, &event_id).map(|_| ())
            }
            ControlMessage::Enqueue {
                queue_id,
                announcement,
            } => self.enqueue(&queue_id, &announcement).map(|_| ()),
            ControlMessage::Update {
                queue_id,
                next,
                old,
            } => self.update(&queue_id, &next, &old).map(|_| ()),
            ControlMessage::Delete { queue_id, annon_id } => {
                self.delete_annon(&queue_id, &annon_id).map(|_| ())
            }
            ControlMessage::RequestContent { queue_id } => self.publish_content(&queue_id),
        }
    }
}
