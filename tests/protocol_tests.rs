//! Integration tests for the line protocol

use lanchat::protocol::{
    decode, encode, sanitize_name, sanitize_text, ChatRecord, Frame, ProtocolError,
    DISPLAY_TIME_FORMAT, HIST_END, ROOM_CLOSED,
};
use proptest::prelude::*;

#[test]
fn test_control_lines_take_precedence() {
    assert_eq!(decode("HIST_END").unwrap(), Frame::HistoryEnd);
    assert_eq!(
        decode("SYSTEM:ROOM_CLOSED_BY_HOST").unwrap(),
        Frame::RoomClosed
    );

    // Anything else from SYSTEM is an ordinary notice
    assert_eq!(
        decode("SYSTEM:bob joined the chat.").unwrap(),
        Frame::Chat {
            sender: "SYSTEM".to_string(),
            text: "bob joined the chat.".to_string(),
        }
    );
}

#[test]
fn test_history_entry_keeps_colons_in_text() {
    let frame = decode("HIST:alice:01.05 PM:see you at 10:30").unwrap();
    assert_eq!(
        frame,
        Frame::HistoryEntry {
            sender: "alice".to_string(),
            timestamp: "01.05 PM".to_string(),
            text: "see you at 10:30".to_string(),
        }
    );
}

#[test]
fn test_short_history_entry_is_malformed() {
    assert!(matches!(
        decode("HIST:alice:no-text-field"),
        Err(ProtocolError::Malformed(_))
    ));
}

#[test]
fn test_name_announce() {
    assert_eq!(
        decode("CLIENT_NAME:bob").unwrap(),
        Frame::NameAnnounce {
            name: "bob".to_string()
        }
    );
}

#[test]
fn test_chat_splits_on_first_delimiter() {
    assert_eq!(
        decode("bob:ratio is 3:1").unwrap(),
        Frame::Chat {
            sender: "bob".to_string(),
            text: "ratio is 3:1".to_string(),
        }
    );
    assert_eq!(
        decode("bob:").unwrap(),
        Frame::Chat {
            sender: "bob".to_string(),
            text: String::new(),
        }
    );
}

#[test]
fn test_line_without_delimiter_is_malformed() {
    assert_eq!(
        decode("hello there"),
        Err(ProtocolError::Malformed("hello there".to_string()))
    );
    assert!(decode("").is_err());
}

#[test]
fn test_encode_rejects_unframeable_fields() {
    assert_eq!(
        encode(&Frame::Chat {
            sender: "a:b".to_string(),
            text: "hi".to_string(),
        }),
        Err(ProtocolError::ReservedDelimiter { field: "sender" })
    );
    assert_eq!(
        encode(&Frame::Chat {
            sender: "alice".to_string(),
            text: "two\nlines".to_string(),
        }),
        Err(ProtocolError::EmbeddedNewline { field: "text" })
    );
    assert_eq!(
        encode(&Frame::HistoryEntry {
            sender: "alice".to_string(),
            timestamp: "13:05".to_string(),
            text: "hi".to_string(),
        }),
        Err(ProtocolError::ReservedDelimiter { field: "timestamp" })
    );
}

#[test]
fn test_encode_control_frames() {
    assert_eq!(encode(&Frame::HistoryEnd).unwrap(), "HIST_END");
    assert_eq!(
        encode(&Frame::RoomClosed).unwrap(),
        "SYSTEM:ROOM_CLOSED_BY_HOST"
    );
    assert_eq!(encode(&Frame::HistoryEnd).unwrap(), HIST_END);
    assert_eq!(encode(&Frame::RoomClosed).unwrap(), ROOM_CLOSED);
    assert_eq!(
        encode(&Frame::NameAnnounce {
            name: "carol".to_string()
        })
        .unwrap(),
        "CLIENT_NAME:carol"
    );
}

#[test]
fn test_record_frames() {
    let record = ChatRecord::new("12345", "alice", "hi: there").with_timestamp("09.15 AM");
    assert!(!record.system);
    assert_eq!(encode(&record.to_chat_frame()).unwrap(), "alice:hi: there");
    assert_eq!(
        encode(&record.to_history_frame()).unwrap(),
        "HIST:alice:09.15 AM:hi: there"
    );

    let notice = ChatRecord::system("12345", "bob left the chat.");
    assert!(notice.system);
    assert_eq!(
        encode(&notice.to_chat_frame()).unwrap(),
        "SYSTEM:bob left the chat."
    );
}

#[test]
fn test_display_timestamps_never_contain_the_delimiter() {
    let record = ChatRecord::new("1", "alice", "hi");
    assert!(!record.timestamp.contains(':'));
    assert!(!DISPLAY_TIME_FORMAT.contains(':'));
}

#[test]
fn test_sanitize_name() {
    assert_eq!(sanitize_name("  alice ").unwrap(), "alice");
    assert_eq!(sanitize_name("a:b").unwrap(), "a_b");
    assert_eq!(sanitize_name("bo\u{7}b").unwrap(), "bob");
    assert_eq!(sanitize_name("   "), Err(ProtocolError::EmptyName));
    assert_eq!(
        sanitize_name("SYSTEM"),
        Err(ProtocolError::ReservedName("SYSTEM".to_string()))
    );
}

#[test]
fn test_names_that_collide_with_control_prefixes_are_reserved() {
    for reserved in ["SYSTEM", "HIST", "CLIENT_NAME", " HIST "] {
        assert!(
            matches!(sanitize_name(reserved), Err(ProtocolError::ReservedName(_))),
            "{:?} should be reserved",
            reserved
        );
    }

    // Close relatives still decode as chat
    for allowed in ["HIST_END", "hist", "HISTORY", "CLIENT"] {
        let name = sanitize_name(allowed).unwrap();
        let line = encode(&Frame::Chat {
            sender: name.clone(),
            text: "a:b:c".to_string(),
        })
        .unwrap();
        assert_eq!(
            decode(&line).unwrap(),
            Frame::Chat {
                sender: name,
                text: "a:b:c".to_string(),
            }
        );
    }
}

#[test]
fn test_sanitize_text() {
    assert_eq!(sanitize_text("hello\nworld").as_deref(), Some("hello world"));
    assert_eq!(sanitize_text("  padded \r\n").as_deref(), Some("padded"));
    assert_eq!(sanitize_text(" \n\t "), None);
}

proptest! {
    #[test]
    fn prop_decode_never_panics(line in "\\PC*") {
        let _ = decode(&line);
    }

    #[test]
    fn prop_chat_lines_decode_to_what_was_encoded(
        sender in "[a-zA-Z0-9_ ]{1,16}",
        text in "[^\r\n]{0,64}",
    ) {
        prop_assume!(sender != "SYSTEM" && sender != "HIST" && sender != "CLIENT_NAME");
        let frame = Frame::Chat { sender, text };
        let line = encode(&frame).unwrap();
        prop_assert_eq!(decode(&line).unwrap(), frame);
    }

    #[test]
    fn prop_sanitized_names_are_always_encodable(raw in "\\PC{0,32}") {
        if let Ok(name) = sanitize_name(&raw) {
            let frame = Frame::NameAnnounce { name };
            prop_assert!(encode(&frame).is_ok());
        }
    }

    #[test]
    fn prop_chat_from_sanitized_names_decodes_as_chat(
        raw in "[A-Z_:]{1,12}",
        text in "[a-z: ]{0,24}",
    ) {
        if let Ok(sender) = sanitize_name(&raw) {
            let frame = Frame::Chat { sender, text };
            let line = encode(&frame).unwrap();
            prop_assert_eq!(decode(&line).unwrap(), frame);
        }
    }
}
