//! Host-side state for one connected participant

use crate::connection::Connection;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Identifies a session; used as the broadcast exclude token
pub type SessionId = Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Outbound queue of session {0} is full")]
    QueueFull(SessionId),

    #[error("Session {0} is closed")]
    Closed(SessionId),
}

/// Snapshot of a session for introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub name: String,
    pub peer: SocketAddr,
}

/// One connected remote participant.
///
/// Outgoing lines go through a bounded queue drained by a writer task, so a
/// slow peer only ever stalls its own writer.
pub struct ClientSession {
    id: SessionId,
    connection: Arc<Connection>,
    name: Mutex<String>,
    admitted: AtomicBool,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

impl ClientSession {
    /// Wrap an accepted connection and start its writer task
    pub fn spawn(connection: Connection, queue_capacity: usize) -> Arc<Self> {
        let connection = Arc::new(connection);
        let (tx, rx) = mpsc::channel::<String>(queue_capacity.max(1));

        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            name: Mutex::new(connection.peer_addr().ip().to_string()),
            connection: Arc::clone(&connection),
            admitted: AtomicBool::new(false),
            outbound: Mutex::new(Some(tx)),
            writer_task: Mutex::new(None),
            receive_task: Mutex::new(None),
        });

        let handle = tokio::spawn(session_writer_task(connection, rx));
        *lock(&session.writer_task) = Some(handle);

        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> String {
        lock(&self.name).clone()
    }

    pub(crate) fn set_name(&self, name: String) {
        *lock(&self.name) = name;
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.connection.peer_addr()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            name: self.name(),
            peer: self.peer_addr(),
        }
    }

    /// Whether the name announcement has been processed
    pub fn is_admitted(&self) -> bool {
        self.admitted.load(Ordering::Acquire)
    }

    pub(crate) fn mark_admitted(&self) {
        self.admitted.store(true, Ordering::Release);
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }

    pub(crate) fn set_receive_task(&self, handle: JoinHandle<()>) {
        *lock(&self.receive_task) = Some(handle);
    }

    /// Queue a line without waiting. Fails if the queue is full or closed.
    pub fn send(&self, line: &str) -> Result<(), SessionError> {
        let outbound = lock(&self.outbound);
        let tx = outbound.as_ref().ok_or(SessionError::Closed(self.id))?;
        tx.try_send(line.to_string()).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::QueueFull(self.id),
            TrySendError::Closed(_) => SessionError::Closed(self.id),
        })
    }

    /// Queue a line, waiting for queue space
    pub async fn send_wait(&self, line: &str) -> Result<(), SessionError> {
        let tx = lock(&self.outbound)
            .clone()
            .ok_or(SessionError::Closed(self.id))?;
        tx.send(line.to_string())
            .await
            .map_err(|_| SessionError::Closed(self.id))
    }

    /// Close the connection immediately. Idempotent.
    pub fn cleanup(&self) {
        lock(&self.outbound).take();
        self.connection.close();
    }

    /// Flush queued lines (bounded by `drain_timeout`), then close.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        lock(&self.outbound).take();

        let writer = lock(&self.writer_task).take();
        if let Some(mut writer) = writer {
            if tokio::time::timeout(drain_timeout, &mut writer).await.is_err() {
                tracing::warn!("Session {} did not drain in time", self.id);
                writer.abort();
            }
        }
        self.connection.close();
    }

    /// Wait for the receive task to finish, aborting it after `timeout`
    pub async fn join(&self, timeout: Duration) {
        let receiver = lock(&self.receive_task).take();
        if let Some(mut receiver) = receiver {
            if tokio::time::timeout(timeout, &mut receiver).await.is_err() {
                tracing::warn!("Abandoning receive task of session {}", self.id);
                receiver.abort();
            }
        }
    }
}

/// Drains a session's outbound queue onto its connection
async fn session_writer_task(connection: Arc<Connection>, mut receiver: mpsc::Receiver<String>) {
    while let Some(line) = receiver.recv().await {
        if let Err(e) = connection.write_line(&line).await {
            tracing::warn!("Write to {} failed: {}", connection.peer_addr(), e);
            connection.close();
            break;
        }
    }

    tracing::debug!("Session writer task finished for {}", connection.peer_addr());
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
