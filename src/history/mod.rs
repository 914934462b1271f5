//! Chat history persistence
//!
//! Stores are plain synchronous backends. [`HistoryHandle`] runs one of them
//! on a dedicated thread and feeds it commands in order, so every history
//! operation is totally ordered and nothing async ever blocks on storage.

mod store;

pub use store::{FileHistory, MemoryHistory};

use crate::protocol::ChatRecord;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("History record encoding error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("History worker is not running")]
    WorkerGone,
}

/// Append/read/delete message records keyed by room identifier
pub trait HistoryStore: Send + 'static {
    fn append(&mut self, record: &ChatRecord) -> Result<(), HistoryError>;

    /// All records of a room in insertion order
    fn read_all(&mut self, room_id: &str) -> Result<Vec<ChatRecord>, HistoryError>;

    fn delete_all(&mut self, room_id: &str) -> Result<(), HistoryError>;
}

impl HistoryStore for Box<dyn HistoryStore> {
    fn append(&mut self, record: &ChatRecord) -> Result<(), HistoryError> {
        (**self).append(record)
    }

    fn read_all(&mut self, room_id: &str) -> Result<Vec<ChatRecord>, HistoryError> {
        (**self).read_all(room_id)
    }

    fn delete_all(&mut self, room_id: &str) -> Result<(), HistoryError> {
        (**self).delete_all(room_id)
    }
}

enum HistoryCommand {
    Append(ChatRecord),
    ReadAll {
        room_id: String,
        reply: oneshot::Sender<Result<Vec<ChatRecord>, HistoryError>>,
    },
    DeleteAll {
        room_id: String,
        reply: oneshot::Sender<Result<(), HistoryError>>,
    },
}

/// Cloneable handle to the history worker thread.
///
/// The worker exits once every handle is dropped.
#[derive(Clone)]
pub struct HistoryHandle {
    sender: mpsc::UnboundedSender<HistoryCommand>,
}

impl HistoryHandle {
    /// Start a worker thread that owns `store`
    pub fn spawn<S: HistoryStore>(store: S) -> Result<Self, HistoryError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("lanchat-history".to_string())
            .spawn(move || run_worker(store, receiver))?;
        Ok(Self { sender })
    }

    /// Queue a record for persistence. System records are ignored.
    pub fn append(&self, record: ChatRecord) {
        if record.system {
            return;
        }
        if self.sender.send(HistoryCommand::Append(record)).is_err() {
            tracing::error!("History worker is gone; record dropped");
        }
    }

    /// All persisted records of a room, in insertion order
    pub async fn read_all(&self, room_id: &str) -> Result<Vec<ChatRecord>, HistoryError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(HistoryCommand::ReadAll {
                room_id: room_id.to_string(),
                reply,
            })
            .map_err(|_| HistoryError::WorkerGone)?;
        response.await.map_err(|_| HistoryError::WorkerGone)?
    }

    pub async fn delete_all(&self, room_id: &str) -> Result<(), HistoryError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(HistoryCommand::DeleteAll {
                room_id: room_id.to_string(),
                reply,
            })
            .map_err(|_| HistoryError::WorkerGone)?;
        response.await.map_err(|_| HistoryError::WorkerGone)?
    }
}

fn run_worker<S: HistoryStore>(
    mut store: S,
    mut receiver: mpsc::UnboundedReceiver<HistoryCommand>,
) {
    while let Some(command) = receiver.blocking_recv() {
        match command {
            HistoryCommand::Append(record) => {
                if let Err(e) = store.append(&record) {
                    tracing::error!("Failed to append history for room {}: {}", record.room_id, e);
                }
            }
            HistoryCommand::ReadAll { room_id, reply } => {
                let _ = reply.send(store.read_all(&room_id));
            }
            HistoryCommand::DeleteAll { room_id, reply } => {
                let result = store.delete_all(&room_id);
                if result.is_ok() {
                    tracing::info!("Deleted history for room {}", room_id);
                }
                let _ = reply.send(result);
            }
        }
    }

    tracing::debug!("History worker finished");
}
