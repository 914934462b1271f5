//! Events surfaced to whoever renders the chat

/// Notification emitted by a room or a remote link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Join/leave/closure notice or other status line
    SystemNotice { text: String },

    /// A live chat message
    Message {
        sender: String,
        text: String,
        timestamp: String,
        is_mine: bool,
    },

    /// A replayed history record; render without forcing scroll
    HistoryItem {
        sender: String,
        timestamp: String,
        text: String,
        is_mine: bool,
    },

    /// History replay finished
    HistoryLoaded,

    /// The host closed the room
    RoomClosedByHost,

    /// Stream ended without a room-closed notice
    Disconnected,

    /// An outgoing chat line could not be written
    DeliveryFailed { text: String, reason: String },
}

impl ChatEvent {
    pub fn notice(text: impl Into<String>) -> Self {
        ChatEvent::SystemNotice { text: text.into() }
    }
}
