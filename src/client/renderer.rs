//! Output rendering - turns chat events into terminal lines

use crate::event::ChatEvent;
use regex::Regex;
use std::sync::LazyLock;

/// Regex to match ANSI escape sequences (colors, cursor movement, etc.)
static ANSI_ESCAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Matches:
    // - CSI sequences: ESC [ ... (letter or ~)
    // - OSC sequences: ESC ] ... (BEL or ESC \)
    // - Simple escape sequences: ESC (letter)
    Regex::new(r"\x1b\[[0-9;?]*[a-zA-Z~]|\x1b\][^\x07]*(?:\x07|\x1b\\)|\x1b[a-zA-Z]").unwrap()
});

/// Strip ANSI escape sequences and other control characters from remote text
pub fn strip_ansi_codes(s: &str) -> String {
    ANSI_ESCAPE_RE
        .replace_all(s, "")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

/// Shown on start and for `/help`
pub const HELP_LINES: &[&str] = &[
    "Type a message and press Enter to send it.",
    "  /who          List participants (host only)",
    "  /leave        Leave the room (host: close it, keeping history)",
    "  /terminate    Close the room and delete its history (host only)",
    "  /help         Show this help",
    "  //text        Send text starting with '/'",
];

/// One printable line for an event
pub fn render_event(event: &ChatEvent) -> String {
    match event {
        ChatEvent::SystemNotice { text } => format!("*** {}", strip_ansi_codes(text)),
        ChatEvent::Message {
            sender,
            text,
            timestamp,
            is_mine,
        } => render_message(sender, text, timestamp, *is_mine),
        ChatEvent::HistoryItem {
            sender,
            timestamp,
            text,
            is_mine,
        } => format!("~ {}", render_message(sender, text, timestamp, *is_mine)),
        ChatEvent::HistoryLoaded => "*** Chat history loaded.".to_string(),
        ChatEvent::RoomClosedByHost => "*** Host has closed the room.".to_string(),
        ChatEvent::Disconnected => "*** Disconnected from host.".to_string(),
        ChatEvent::DeliveryFailed { text, reason } => {
            format!("!!! Not delivered ({}): {}", reason, strip_ansi_codes(text))
        }
    }
}

fn render_message(sender: &str, text: &str, timestamp: &str, is_mine: bool) -> String {
    let sender = if is_mine {
        "me".to_string()
    } else {
        strip_ansi_codes(sender)
    };
    format!(
        "[{}] {}: {}",
        strip_ansi_codes(timestamp),
        sender,
        strip_ansi_codes(text)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi_codes() {
        assert_eq!(strip_ansi_codes("\x1b[31mred\x1b[0m text"), "red text");
        assert_eq!(strip_ansi_codes("bell\x07"), "bell");
    }

    #[test]
    fn test_render_message_marks_own_lines() {
        let line = render_event(&ChatEvent::Message {
            sender: "alice".to_string(),
            text: "hello".to_string(),
            timestamp: "01.05 PM".to_string(),
            is_mine: true,
        });
        assert_eq!(line, "[01.05 PM] me: hello");
    }

    #[test]
    fn test_render_history_item() {
        let line = render_event(&ChatEvent::HistoryItem {
            sender: "bob".to_string(),
            timestamp: "09.00 AM".to_string(),
            text: "earlier".to_string(),
            is_mine: false,
        });
        assert_eq!(line, "~ [09.00 AM] bob: earlier");
    }

    #[test]
    fn test_render_notice_strips_escapes() {
        let line = render_event(&ChatEvent::notice("\x1b[2Jbob joined the chat."));
        assert_eq!(line, "*** bob joined the chat.");
    }
}
