//! Frame and record types for the lanchat line protocol

use serde::{Deserialize, Serialize};

/// Format used for display timestamps.
///
/// The HistoryEntry frame carries the timestamp as a delimited field, so the
/// format must never produce the field delimiter.
pub const DISPLAY_TIME_FORMAT: &str = "%I.%M %p";

/// One decoded line of the wire protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// First line a client sends after dialing
    NameAnnounce { name: String },

    /// Regular chat line (also used for system notices, sender `SYSTEM`)
    Chat { sender: String, text: String },

    /// One replayed history record
    HistoryEntry {
        sender: String,
        timestamp: String,
        text: String,
    },

    /// Marks the end of history replay
    HistoryEnd,

    /// The host closed the room
    RoomClosed,
}

/// A chat message as seen by a room.
///
/// System records (join/leave/closure notices) are never persisted and never
/// replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    /// Room this record belongs to
    pub room_id: String,

    /// Message body
    pub text: String,

    /// Display name of the author
    pub sender: String,

    /// Human readable time, formatted when the record was created
    pub timestamp: String,

    /// Join/leave/closure notice rather than user chat
    #[serde(default)]
    pub system: bool,
}

impl ChatRecord {
    /// Create a user chat record stamped with the current local time
    pub fn new(
        room_id: impl Into<String>,
        sender: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            text: text.into(),
            sender: sender.into(),
            timestamp: display_timestamp(),
            system: false,
        }
    }

    /// Create a system notice record
    pub fn system(room_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            text: text.into(),
            sender: super::SYSTEM_SENDER.to_string(),
            timestamp: display_timestamp(),
            system: true,
        }
    }

    /// Override the timestamp (used for records restored from storage)
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// The Chat frame that carries this record live
    pub fn to_chat_frame(&self) -> Frame {
        Frame::Chat {
            sender: self.sender.clone(),
            text: self.text.clone(),
        }
    }

    /// The HistoryEntry frame that carries this record during replay
    pub fn to_history_frame(&self) -> Frame {
        Frame::HistoryEntry {
            sender: self.sender.clone(),
            timestamp: self.timestamp.clone(),
            text: self.text.clone(),
        }
    }
}

/// Current local time in [`DISPLAY_TIME_FORMAT`]
pub fn display_timestamp() -> String {
    chrono::Local::now().format(DISPLAY_TIME_FORMAT).to_string()
}
