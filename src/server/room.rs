//! Room lifecycle, membership and broadcast

use super::listener::accept_loop;
use super::session::{ClientSession, SessionId, SessionInfo};
use crate::config::HostConfig;
use crate::event::ChatEvent;
use crate::history::HistoryHandle;
use crate::protocol::{self, ChatRecord, ProtocolError};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::{JoinHandle, JoinSet};

/// Lifecycle of a hosted room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    /// Accepting and relaying
    Open,
    /// Closing sessions; nothing new is admitted or recorded
    Terminating,
    /// All sessions evicted
    Closed,
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid host name: {0}")]
    InvalidName(ProtocolError),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Room is no longer open")]
    NotOpen,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Parameters for [`Room::start`]
#[derive(Debug, Clone)]
pub struct RoomSettings {
    /// Externally assigned room identifier, also the history key
    pub room_id: String,

    /// Display name of the hosting participant
    pub host_name: String,

    pub bind_address: IpAddr,

    /// Port to listen on; 0 picks an ephemeral port
    pub port: u16,

    /// Per-session outbound queue capacity
    pub outbound_queue: usize,

    /// How long termination waits for each session to flush and finish
    pub drain_timeout: Duration,

    /// Consecutive accept failures that end the room
    pub max_accept_failures: u32,

    /// Pause after a failed accept
    pub accept_backoff: Duration,
}

impl RoomSettings {
    pub fn new(room_id: impl Into<String>, host_name: impl Into<String>) -> Self {
        Self::from_config(&HostConfig::default(), room_id, host_name)
    }

    pub fn from_config(
        config: &HostConfig,
        room_id: impl Into<String>,
        host_name: impl Into<String>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            host_name: host_name.into(),
            bind_address: config.bind_address,
            port: config.port,
            outbound_queue: config.outbound_queue,
            drain_timeout: Duration::from_millis(config.drain_timeout_ms),
            max_accept_failures: config.max_accept_failures,
            accept_backoff: Duration::from_millis(config.accept_backoff_ms),
        }
    }

    /// Listen on loopback only
    pub fn local_only(mut self) -> Self {
        self.bind_address = IpAddr::V4(Ipv4Addr::LOCALHOST);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Lifecycle state and live sessions, guarded together so that admission
/// and termination cannot interleave.
struct Registry {
    state: RoomState,
    sessions: HashMap<SessionId, Arc<ClientSession>>,
}

pub(super) struct RoomInner {
    pub(super) settings: RoomSettings,
    local_addr: SocketAddr,
    registry: RwLock<Registry>,
    lifecycle: watch::Sender<RoomState>,
    history: HistoryHandle,
    events: mpsc::UnboundedSender<ChatEvent>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

/// A hosted chat room.
///
/// Cheap to clone. The room keeps serving until [`Room::terminate`] is
/// called, even if every handle is dropped.
#[derive(Clone)]
pub struct Room {
    inner: Arc<RoomInner>,
}

impl Room {
    /// Bind the listening socket and start accepting participants
    pub async fn start(
        mut settings: RoomSettings,
        history: HistoryHandle,
        events: mpsc::UnboundedSender<ChatEvent>,
    ) -> Result<Self, RoomError> {
        settings.host_name =
            protocol::sanitize_name(&settings.host_name).map_err(RoomError::InvalidName)?;

        let addr = SocketAddr::new(settings.bind_address, settings.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RoomError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| RoomError::Bind { addr, source })?;

        tracing::info!("Room {} listening on {}", settings.room_id, local_addr);

        let (lifecycle, _) = watch::channel(RoomState::Open);
        let inner = Arc::new(RoomInner {
            settings,
            local_addr,
            registry: RwLock::new(Registry {
                state: RoomState::Open,
                sessions: HashMap::new(),
            }),
            lifecycle,
            history,
            events,
            accept_task: Mutex::new(None),
        });

        inner.emit(ChatEvent::notice(format!(
            "You are hosting room {}",
            inner.settings.room_id
        )));

        let handle = tokio::spawn(accept_loop(Arc::clone(&inner), listener));
        *lock(&inner.accept_task) = Some(handle);

        Ok(Self { inner })
    }

    pub fn id(&self) -> &str {
        &self.inner.settings.room_id
    }

    pub fn host_name(&self) -> &str {
        &self.inner.settings.host_name
    }

    /// Address the room actually listens on
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn state(&self) -> RoomState {
        self.inner.state()
    }

    /// Admitted participants, in no particular order
    pub async fn participants(&self) -> Vec<SessionInfo> {
        let registry = self.inner.registry.read().await;
        registry
            .sessions
            .values()
            .filter(|session| session.is_admitted())
            .map(|session| session.info())
            .collect()
    }

    /// Send a chat line authored by the host.
    ///
    /// Goes through the same path as relayed client messages: surfaced
    /// locally, broadcast to every session and recorded in history.
    pub async fn post(&self, text: &str) -> Result<ChatRecord, RoomError> {
        let text = protocol::sanitize_text(text).ok_or(RoomError::EmptyMessage)?;
        if self.state() != RoomState::Open {
            return Err(RoomError::NotOpen);
        }

        let record = ChatRecord::new(self.id(), self.host_name(), text);
        let line = protocol::encode(&record.to_chat_frame())?;
        self.inner.dispatch_chat(None, record.clone(), &line).await;
        Ok(record)
    }

    /// Write `line` to every admitted session except `exclude`
    pub async fn broadcast(&self, line: &str, exclude: Option<SessionId>) {
        self.inner.broadcast(line, exclude).await;
    }

    /// Close the room for everyone. A second call is a no-op.
    pub async fn terminate(&self, delete_history: bool) {
        self.inner.terminate(delete_history).await;
    }

    /// Resolves once the room reaches [`RoomState::Closed`]
    pub async fn closed(&self) {
        let mut lifecycle = self.inner.lifecycle.subscribe();
        while *lifecycle.borrow_and_update() != RoomState::Closed {
            if lifecycle.changed().await.is_err() {
                return;
            }
        }
    }
}

impl RoomInner {
    pub(super) fn room_id(&self) -> &str {
        &self.settings.room_id
    }

    pub(super) fn state(&self) -> RoomState {
        *self.lifecycle.borrow()
    }

    pub(super) fn lifecycle(&self) -> watch::Receiver<RoomState> {
        self.lifecycle.subscribe()
    }

    pub(super) fn emit(&self, event: ChatEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    /// Add a freshly accepted session. Refused once the room is closing.
    pub(super) async fn register(&self, session: Arc<ClientSession>) -> bool {
        let mut registry = self.registry.write().await;
        if registry.state != RoomState::Open {
            return false;
        }
        registry.sessions.insert(session.id(), session);
        true
    }

    /// Remove a finished session and tell the others it left.
    ///
    /// Sessions already evicted by termination leave silently.
    pub(super) async fn release(&self, session: &ClientSession) {
        session.cleanup();

        let announce = {
            let mut registry = self.registry.write().await;
            registry.sessions.remove(&session.id()).is_some() && registry.state == RoomState::Open
        };

        if announce {
            self.announce(&format!("{} left the chat.", session.name()), None).await;
        }
    }

    /// System notice to the local UI and to every session except `exclude`
    pub(super) async fn announce(&self, text: &str, exclude: Option<SessionId>) {
        if self.state() != RoomState::Open {
            return;
        }
        self.emit(ChatEvent::notice(text));

        let record = ChatRecord::system(self.room_id(), text);
        match protocol::encode(&record.to_chat_frame()) {
            Ok(line) => self.broadcast(&line, exclude).await,
            Err(e) => tracing::warn!("Cannot encode notice {:?}: {}", text, e),
        }
    }

    /// Replay stored history to one session, terminated by `HIST_END`
    pub(super) async fn replay_history(&self, session: &ClientSession) -> anyhow::Result<()> {
        let records = match self.history.read_all(self.room_id()).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Failed to read history of room {}: {}", self.room_id(), e);
                Vec::new()
            }
        };

        let mut replayed = 0usize;
        for record in records.iter().filter(|record| !record.system) {
            match protocol::encode(&record.to_history_frame()) {
                Ok(line) => {
                    session.send_wait(&line).await?;
                    replayed += 1;
                }
                Err(e) => tracing::warn!("Skipping unreplayable history record: {}", e),
            }
        }
        session.send_wait(protocol::HIST_END).await?;

        tracing::debug!("Replayed {} history records to {}", replayed, session.name());
        Ok(())
    }

    /// Single relay path for chat from the host (`origin == None`) or a session
    pub(super) async fn dispatch_chat(
        &self,
        origin: Option<SessionId>,
        record: ChatRecord,
        line: &str,
    ) {
        {
            // Appending under the read lock orders it before any deletion.
            let registry = self.registry.read().await;
            if registry.state != RoomState::Open {
                tracing::debug!("Room {} is closing; dropping chat line", self.room_id());
                return;
            }
            self.history.append(record.clone());
        }

        self.emit(ChatEvent::Message {
            sender: record.sender,
            text: record.text,
            timestamp: record.timestamp,
            is_mine: origin.is_none(),
        });
        self.broadcast(line, origin).await;
    }

    pub(super) async fn broadcast(&self, line: &str, exclude: Option<SessionId>) {
        // Snapshot first: sessions may be removed while we write.
        let recipients: Vec<Arc<ClientSession>> = {
            let registry = self.registry.read().await;
            registry
                .sessions
                .values()
                .filter(|session| session.is_admitted() && Some(session.id()) != exclude)
                .cloned()
                .collect()
        };

        tracing::debug!("Broadcasting to {} sessions: {}", recipients.len(), line);
        for session in recipients {
            if let Err(e) = session.send(line) {
                tracing::warn!("Dropping session {} ({}): {}", session.name(), session.id(), e);
                // Its receive loop wakes up and runs the usual cleanup.
                session.cleanup();
            }
        }
    }

    pub(super) async fn terminate(&self, delete_history: bool) {
        let sessions: Vec<Arc<ClientSession>> = {
            let mut registry = self.registry.write().await;
            if registry.state != RoomState::Open {
                tracing::debug!("Room {} is already terminating", self.room_id());
                return;
            }
            registry.state = RoomState::Terminating;
            self.lifecycle.send_replace(RoomState::Terminating);
            registry.sessions.drain().map(|(_, session)| session).collect()
        };

        tracing::info!(
            "Terminating room {} ({} sessions, delete_history={})",
            self.room_id(),
            sessions.len(),
            delete_history
        );
        self.emit(ChatEvent::notice("Host is closing the room..."));

        for session in &sessions {
            if let Err(e) = session.send(protocol::ROOM_CLOSED) {
                tracing::warn!("Could not notify {} of closure: {}", session.name(), e);
            }
        }

        let drain_timeout = self.settings.drain_timeout;
        let mut closing = JoinSet::new();
        for session in sessions {
            closing.spawn(async move {
                session.shutdown(drain_timeout).await;
                session.join(drain_timeout).await;
            });
        }
        while closing.join_next().await.is_some() {}

        if delete_history {
            if let Err(e) = self.history.delete_all(self.room_id()).await {
                tracing::error!("Failed to delete history of room {}: {}", self.room_id(), e);
            }
        }

        let accept = lock(&self.accept_task).take();
        if let Some(mut accept) = accept {
            if tokio::time::timeout(drain_timeout, &mut accept).await.is_err() {
                accept.abort();
            }
        }

        self.registry.write().await.state = RoomState::Closed;
        self.lifecycle.send_replace(RoomState::Closed);
        self.emit(ChatEvent::notice(format!("Room {} closed.", self.room_id())));
        tracing::info!("Room {} closed", self.room_id());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
