//! History store backends

use super::{HistoryError, HistoryStore};
use crate::protocol::ChatRecord;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Volatile store, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryHistory {
    rooms: HashMap<String, Vec<ChatRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistory {
    fn append(&mut self, record: &ChatRecord) -> Result<(), HistoryError> {
        self.rooms
            .entry(record.room_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    fn read_all(&mut self, room_id: &str) -> Result<Vec<ChatRecord>, HistoryError> {
        Ok(self.rooms.get(room_id).cloned().unwrap_or_default())
    }

    fn delete_all(&mut self, room_id: &str) -> Result<(), HistoryError> {
        self.rooms.remove(room_id);
        Ok(())
    }
}

/// One JSON-lines file per room under a base directory
#[derive(Debug)]
pub struct FileHistory {
    base_path: PathBuf,
}

impl FileHistory {
    /// Open (creating if needed) a store rooted at `base_path`
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// File for one room. ASCII letters, digits and `-` are kept; every
    /// other byte becomes `_XX`, so distinct ids never share a file.
    fn room_path(&self, room_id: &str) -> PathBuf {
        let mut file_stem = String::with_capacity(room_id.len());
        for byte in room_id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                file_stem.push(char::from(byte));
            } else {
                file_stem.push_str(&format!("_{:02X}", byte));
            }
        }
        self.base_path.join(format!("{}.jsonl", file_stem))
    }
}

impl HistoryStore for FileHistory {
    fn append(&mut self, record: &ChatRecord) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.room_path(&record.room_id))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn read_all(&mut self, room_id: &str) -> Result<Vec<ChatRecord>, HistoryError> {
        let path = self.room_path(room_id);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ChatRecord>(&line) {
                Ok(record) if record.room_id == room_id => records.push(record),
                Ok(record) => {
                    tracing::warn!(
                        "Skipping record of room {} found in {:?}",
                        record.room_id,
                        path
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Skipping unreadable history line {} in {:?}: {}",
                        index + 1,
                        path,
                        e
                    );
                }
            }
        }
        Ok(records)
    }

    fn delete_all(&mut self, room_id: &str) -> Result<(), HistoryError> {
        match fs::remove_file(self.room_path(room_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_history_keeps_insertion_order_per_room() {
        let dir = tempdir().unwrap();
        let mut store = FileHistory::new(dir.path().join("history")).unwrap();

        store
            .append(&ChatRecord::new("12345", "alice", "first").with_timestamp("01.00 PM"))
            .unwrap();
        store
            .append(&ChatRecord::new("99999", "carol", "elsewhere"))
            .unwrap();
        store
            .append(&ChatRecord::new("12345", "bob", "second: with colon"))
            .unwrap();

        let records = store.read_all("12345").unwrap();
        let texts: Vec<_> = records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second: with colon"]);
        assert_eq!(records[0].timestamp, "01.00 PM");
    }

    #[test]
    fn test_file_history_delete_is_scoped_and_repeatable() {
        let dir = tempdir().unwrap();
        let mut store = FileHistory::new(dir.path()).unwrap();

        store.append(&ChatRecord::new("a", "alice", "hi")).unwrap();
        store.append(&ChatRecord::new("b", "bob", "yo")).unwrap();

        store.delete_all("a").unwrap();
        store.delete_all("a").unwrap();

        assert!(store.read_all("a").unwrap().is_empty());
        assert_eq!(store.read_all("b").unwrap().len(), 1);
    }

    #[test]
    fn test_file_history_skips_corrupt_lines() {
        let dir = tempdir().unwrap();
        let mut store = FileHistory::new(dir.path()).unwrap();
        store.append(&ChatRecord::new("r1", "alice", "ok")).unwrap();

        let path = store.room_path("r1");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();
        drop(file);
        store.append(&ChatRecord::new("r1", "bob", "still ok")).unwrap();

        let records = store.read_all("r1").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].sender, "bob");
    }

    #[test]
    fn test_similar_room_ids_do_not_share_a_file() {
        let dir = tempdir().unwrap();
        let mut store = FileHistory::new(dir.path()).unwrap();

        store
            .append(&ChatRecord::new("team.a", "alice", "secret of team.a"))
            .unwrap();
        store
            .append(&ChatRecord::new("team_a", "bob", "secret of team_a"))
            .unwrap();
        assert_ne!(store.room_path("team.a"), store.room_path("team_a"));

        let records = store.read_all("team_a").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "secret of team_a");

        store.delete_all("team_a").unwrap();
        assert_eq!(store.read_all("team.a").unwrap().len(), 1);
        assert!(store.read_all("team_a").unwrap().is_empty());
    }

    #[test]
    fn test_foreign_records_in_a_room_file_are_ignored() {
        let dir = tempdir().unwrap();
        let mut store = FileHistory::new(dir.path()).unwrap();
        store.append(&ChatRecord::new("r1", "alice", "mine")).unwrap();

        let stray = serde_json::to_string(&ChatRecord::new("r2", "bob", "not mine")).unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(store.room_path("r1"))
            .unwrap();
        writeln!(file, "{}", stray).unwrap();
        drop(file);

        let records = store.read_all("r1").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "mine");
    }

    #[test]
    fn test_plain_room_ids_keep_readable_file_names() {
        let dir = tempdir().unwrap();
        let store = FileHistory::new(dir.path()).unwrap();
        assert_eq!(store.room_path("12345"), dir.path().join("12345.jsonl"));
        assert_eq!(store.room_path("a.b"), dir.path().join("a_2Eb.jsonl"));
    }

    #[test]
    fn test_room_ids_cannot_escape_base_path() {
        let dir = tempdir().unwrap();
        let store = FileHistory::new(dir.path()).unwrap();
        let path = store.room_path("../../etc/passwd");
        assert_eq!(path.parent().unwrap(), dir.path());
    }
}
