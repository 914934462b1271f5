//! Integration tests for the history worker and its stores

use lanchat::history::{FileHistory, HistoryHandle, HistoryStore, MemoryHistory};
use lanchat::protocol::ChatRecord;
use tempfile::tempdir;

#[tokio::test]
async fn test_handle_preserves_append_order() {
    let history = HistoryHandle::spawn(MemoryHistory::new()).unwrap();

    for i in 0..100 {
        history.append(ChatRecord::new("12345", "alice", format!("line {}", i)));
    }

    let records = history.read_all("12345").await.unwrap();
    assert_eq!(records.len(), 100);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.text, format!("line {}", i));
    }
}

#[tokio::test]
async fn test_system_records_are_not_persisted() {
    let history = HistoryHandle::spawn(MemoryHistory::new()).unwrap();

    history.append(ChatRecord::system("12345", "alice joined the chat."));
    history.append(ChatRecord::new("12345", "alice", "hi"));

    let records = history.read_all("12345").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sender, "alice");
}

#[tokio::test]
async fn test_delete_only_touches_one_room() {
    let history = HistoryHandle::spawn(MemoryHistory::new()).unwrap();
    history.append(ChatRecord::new("11111", "alice", "a"));
    history.append(ChatRecord::new("22222", "bob", "b"));

    history.delete_all("11111").await.unwrap();

    assert!(history.read_all("11111").await.unwrap().is_empty());
    assert_eq!(history.read_all("22222").await.unwrap().len(), 1);

    // Deleting an unknown room is fine
    history.delete_all("33333").await.unwrap();
}

#[tokio::test]
async fn test_file_history_survives_restart() {
    let dir = tempdir().unwrap();

    {
        let history = HistoryHandle::spawn(FileHistory::new(dir.path()).unwrap()).unwrap();
        history.append(
            ChatRecord::new("12345", "alice", "before restart").with_timestamp("08.00 AM"),
        );
        // read_all is ordered after the append on the worker
        assert_eq!(history.read_all("12345").await.unwrap().len(), 1);
    }

    let history = HistoryHandle::spawn(FileHistory::new(dir.path()).unwrap()).unwrap();
    let records = history.read_all("12345").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].text, "before restart");
    assert_eq!(records[0].timestamp, "08.00 AM");
    assert!(!records[0].system);
}

#[tokio::test]
async fn test_boxed_store() {
    let store: Box<dyn HistoryStore> = Box::new(MemoryHistory::new());
    let history = HistoryHandle::spawn(store).unwrap();
    history.append(ChatRecord::new("1", "carol", "boxed"));
    assert_eq!(history.read_all("1").await.unwrap()[0].text, "boxed");
}

#[test]
fn test_memory_store_directly() {
    let mut store = MemoryHistory::new();
    store.append(&ChatRecord::new("1", "alice", "one")).unwrap();
    store.append(&ChatRecord::new("1", "bob", "two")).unwrap();

    let senders: Vec<_> = store
        .read_all("1")
        .unwrap()
        .into_iter()
        .map(|r| r.sender)
        .collect();
    assert_eq!(senders, vec!["alice", "bob"]);
    assert!(store.read_all("2").unwrap().is_empty());
}
