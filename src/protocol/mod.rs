//! Protocol definitions for host/client communication
//!
//! Line-oriented UTF-8 text, one frame per line, `:` reserved as the field
//! delimiter:
//!
//! | Frame        | Line                                  |
//! |--------------|---------------------------------------|
//! | NameAnnounce | `CLIENT_NAME:<name>`                  |
//! | Chat         | `<sender>:<text>`                     |
//! | HistoryEntry | `HIST:<sender>:<timestamp>:<text>`    |
//! | HistoryEnd   | `HIST_END`                            |
//! | RoomClosed   | `SYSTEM:ROOM_CLOSED_BY_HOST`          |

mod message;

pub use message::{display_timestamp, ChatRecord, Frame, DISPLAY_TIME_FORMAT};

use thiserror::Error;

/// Field delimiter
pub const DELIMITER: char = ':';

/// Sender name used for system notices
pub const SYSTEM_SENDER: &str = "SYSTEM";

/// Line that ends history replay
pub const HIST_END: &str = "HIST_END";

/// Line announcing that the host closed the room
pub const ROOM_CLOSED: &str = "SYSTEM:ROOM_CLOSED_BY_HOST";

const HIST_PREFIX: &str = "HIST:";
const CLIENT_NAME_PREFIX: &str = "CLIENT_NAME:";

/// Protocol-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0:?}")]
    Malformed(String),

    #[error("Field {field} contains a line break")]
    EmbeddedNewline { field: &'static str },

    #[error("Field {field} contains the reserved delimiter ':'")]
    ReservedDelimiter { field: &'static str },

    #[error("Display name is empty")]
    EmptyName,

    #[error("Display name '{0}' is reserved")]
    ReservedName(String),
}

/// Encode a frame as a single line (without terminator)
pub fn encode(frame: &Frame) -> Result<String, ProtocolError> {
    match frame {
        Frame::NameAnnounce { name } => {
            check_field("name", name, true)?;
            Ok(format!("{CLIENT_NAME_PREFIX}{name}"))
        }
        Frame::Chat { sender, text } => {
            check_field("sender", sender, true)?;
            check_field("text", text, false)?;
            Ok(format!("{sender}{DELIMITER}{text}"))
        }
        Frame::HistoryEntry {
            sender,
            timestamp,
            text,
        } => {
            check_field("sender", sender, true)?;
            check_field("timestamp", timestamp, true)?;
            check_field("text", text, false)?;
            Ok(format!(
                "{HIST_PREFIX}{sender}{DELIMITER}{timestamp}{DELIMITER}{text}"
            ))
        }
        Frame::HistoryEnd => Ok(HIST_END.to_string()),
        Frame::RoomClosed => Ok(ROOM_CLOSED.to_string()),
    }
}

/// Classify and decode one line.
///
/// Precedence: `HIST_END`, room-closed, `HIST:`, `CLIENT_NAME:`, then chat.
pub fn decode(line: &str) -> Result<Frame, ProtocolError> {
    if line == HIST_END {
        return Ok(Frame::HistoryEnd);
    }
    if line == ROOM_CLOSED {
        return Ok(Frame::RoomClosed);
    }
    if let Some(rest) = line.strip_prefix(HIST_PREFIX) {
        let mut parts = rest.splitn(3, DELIMITER);
        return match (parts.next(), parts.next(), parts.next()) {
            (Some(sender), Some(timestamp), Some(text)) => Ok(Frame::HistoryEntry {
                sender: sender.to_string(),
                timestamp: timestamp.to_string(),
                text: text.to_string(),
            }),
            _ => Err(ProtocolError::Malformed(line.to_string())),
        };
    }
    if let Some(name) = line.strip_prefix(CLIENT_NAME_PREFIX) {
        return Ok(Frame::NameAnnounce {
            name: name.to_string(),
        });
    }
    match line.split_once(DELIMITER) {
        Some((sender, text)) => Ok(Frame::Chat {
            sender: sender.to_string(),
            text: text.to_string(),
        }),
        None => Err(ProtocolError::Malformed(line.to_string())),
    }
}

/// Normalize a display name so it can travel in any frame.
///
/// Control characters are dropped and the delimiter becomes `_`. Names whose
/// chat lines would decode as another frame are reserved.
pub fn sanitize_name(raw: &str) -> Result<String, ProtocolError> {
    let name: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if c == DELIMITER { '_' } else { c })
        .collect();

    if name.is_empty() {
        return Err(ProtocolError::EmptyName);
    }
    if is_reserved_name(&name) {
        return Err(ProtocolError::ReservedName(name));
    }
    Ok(name)
}

fn is_reserved_name(name: &str) -> bool {
    name == SYSTEM_SENDER
        || [HIST_PREFIX, CLIENT_NAME_PREFIX]
            .iter()
            .any(|prefix| prefix.strip_suffix(DELIMITER) == Some(name))
}

/// Fold line breaks into spaces and trim. Returns `None` for blank input.
pub fn sanitize_text(raw: &str) -> Option<String> {
    let text: String = raw
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn check_field(field: &'static str, value: &str, delimited: bool) -> Result<(), ProtocolError> {
    if value.contains(['\n', '\r']) {
        return Err(ProtocolError::EmbeddedNewline { field });
    }
    if delimited && value.contains(DELIMITER) {
        return Err(ProtocolError::ReservedDelimiter { field });
    }
    Ok(())
}
