//! Client-side connection to a hosted room

use crate::connection::{Connection, ConnectionError};
use crate::event::ChatEvent;
use crate::protocol::{self, display_timestamp, Frame, ProtocolError, SYSTEM_SENDER};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Used by [`RemoteLink::connect`]
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Dialing a host failed; nothing is left open
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Unknown host: {0}")]
    UnknownHost(String),

    #[error("Connection refused by {0}")]
    Refused(SocketAddr),

    #[error("Connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid display name: {0}")]
    InvalidName(#[from] ProtocolError),
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Not connected to the room")]
    Closed,

    #[error("Message is empty")]
    EmptyMessage,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

struct Outgoing {
    line: String,
    text: String,
}

struct LinkInner {
    connection: Connection,
    local_name: String,
    terminated_by_host: AtomicBool,
    left: AtomicBool,
    events: mpsc::UnboundedSender<ChatEvent>,
}

/// A participant's connection to the host.
///
/// Dropping the link leaves the room.
pub struct RemoteLink {
    inner: Arc<LinkInner>,
    outbound: mpsc::UnboundedSender<Outgoing>,
}

impl RemoteLink {
    /// Dial `host:port` and announce `local_name`
    pub async fn connect(
        host: &str,
        port: u16,
        local_name: &str,
        events: mpsc::UnboundedSender<ChatEvent>,
    ) -> Result<Self, ConnectError> {
        Self::connect_with_timeout(host, port, local_name, DEFAULT_CONNECT_TIMEOUT, events).await
    }

    pub async fn connect_with_timeout(
        host: &str,
        port: u16,
        local_name: &str,
        connect_timeout: Duration,
        events: mpsc::UnboundedSender<ChatEvent>,
    ) -> Result<Self, ConnectError> {
        let local_name = protocol::sanitize_name(local_name)?;
        let stream = dial(host, port, connect_timeout).await?;
        let connection = Connection::new(stream).map_err(into_connect_error)?;

        tracing::info!("Connected to {} as {}", connection.peer_addr(), local_name);

        let announce = protocol::encode(&Frame::NameAnnounce {
            name: local_name.clone(),
        })?;
        if let Err(e) = connection.write_line(&announce).await {
            connection.close();
            return Err(into_connect_error(e));
        }

        let _ = events.send(ChatEvent::notice(format!(
            "Connected to {}",
            connection.peer_addr()
        )));

        let inner = Arc::new(LinkInner {
            connection,
            local_name,
            terminated_by_host: AtomicBool::new(false),
            left: AtomicBool::new(false),
            events,
        });

        let (outbound, receiver) = mpsc::unbounded_channel();
        tokio::spawn(link_writer_task(Arc::clone(&inner), receiver));
        tokio::spawn(link_receive_task(Arc::clone(&inner)));

        Ok(Self { inner, outbound })
    }

    pub fn local_name(&self) -> &str {
        &self.inner.local_name
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.connection.peer_addr()
    }

    pub fn is_connected(&self) -> bool {
        !self.inner.connection.is_closed()
    }

    /// Whether the host ended the room (as opposed to a plain disconnect)
    pub fn terminated_by_host(&self) -> bool {
        self.inner.terminated_by_host.load(Ordering::Acquire)
    }

    /// Queue a chat line for the host. Never waits on the network.
    pub fn send_chat(&self, text: &str) -> Result<(), LinkError> {
        let text = protocol::sanitize_text(text).ok_or(LinkError::EmptyMessage)?;
        if !self.is_connected() {
            return Err(LinkError::Closed);
        }

        let line = protocol::encode(&Frame::Chat {
            sender: self.inner.local_name.clone(),
            text: text.clone(),
        })?;
        self.outbound
            .send(Outgoing {
                line,
                text: text.clone(),
            })
            .map_err(|_| LinkError::Closed)?;

        self.inner.emit(ChatEvent::Message {
            sender: self.inner.local_name.clone(),
            text,
            timestamp: display_timestamp(),
            is_mine: true,
        });
        Ok(())
    }

    /// Leave the room. Idempotent.
    pub fn disconnect(&self) {
        if !self.inner.left.swap(true, Ordering::AcqRel) {
            tracing::info!("Leaving room at {}", self.peer_addr());
        }
        self.inner.connection.close();
    }

    /// Resolves once the connection is closed, by either side
    pub async fn closed(&self) {
        self.inner.connection.closed().await;
    }
}

impl Drop for RemoteLink {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl LinkInner {
    fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }

    fn close_by_host(&self) {
        if self.terminated_by_host.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Host closed the room");
        self.emit(ChatEvent::RoomClosedByHost);
        self.connection.close();
    }
}

async fn dial(host: &str, port: u16, connect_timeout: Duration) -> Result<TcpStream, ConnectError> {
    let addrs: Vec<SocketAddr> = match tokio::net::lookup_host((host, port)).await {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            tracing::warn!("Could not resolve {}: {}", host, e);
            return Err(ConnectError::UnknownHost(host.to_string()));
        }
    };
    if addrs.is_empty() {
        return Err(ConnectError::UnknownHost(host.to_string()));
    }

    let mut last_error = None;
    for addr in addrs {
        tracing::debug!("Dialing {}", addr);
        match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                last_error = Some(ConnectError::Refused(addr));
            }
            Ok(Err(e)) => last_error = Some(ConnectError::Io(e)),
            Err(_) => {
                last_error = Some(ConnectError::Io(std::io::Error::new(
                    ErrorKind::TimedOut,
                    format!("timed out connecting to {}", addr),
                )));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| ConnectError::UnknownHost(host.to_string())))
}

fn into_connect_error(error: ConnectionError) -> ConnectError {
    match error {
        ConnectionError::Io(e) => ConnectError::Io(e),
        other => ConnectError::Io(std::io::Error::new(ErrorKind::Other, other)),
    }
}

/// Writes queued chat lines; failures are reported, not fatal
async fn link_writer_task(link: Arc<LinkInner>, mut receiver: mpsc::UnboundedReceiver<Outgoing>) {
    while let Some(outgoing) = receiver.recv().await {
        if let Err(e) = link.connection.write_line(&outgoing.line).await {
            tracing::warn!("Failed to deliver chat line: {}", e);
            link.emit(ChatEvent::DeliveryFailed {
                text: outgoing.text,
                reason: e.to_string(),
            });
        }
    }

    tracing::debug!("Link writer task finished");
}

/// Classifies incoming lines until the stream ends or the host closes the room
async fn link_receive_task(link: Arc<LinkInner>) {
    loop {
        match link.connection.read_line().await {
            Ok(Some(line)) => match protocol::decode(&line) {
                Ok(Frame::HistoryEntry {
                    sender,
                    timestamp,
                    text,
                }) => {
                    let is_mine = sender == link.local_name;
                    link.emit(ChatEvent::HistoryItem {
                        sender,
                        timestamp,
                        text,
                        is_mine,
                    });
                }
                Ok(Frame::HistoryEnd) => link.emit(ChatEvent::HistoryLoaded),
                Ok(Frame::RoomClosed) => {
                    link.close_by_host();
                    break;
                }
                Ok(Frame::Chat { sender, text }) if sender == SYSTEM_SENDER => {
                    link.emit(ChatEvent::SystemNotice { text });
                }
                Ok(Frame::Chat { sender, text }) => {
                    let is_mine = sender == link.local_name;
                    link.emit(ChatEvent::Message {
                        sender,
                        text,
                        timestamp: display_timestamp(),
                        is_mine,
                    });
                }
                Ok(frame) => tracing::warn!("Dropping unexpected {:?} from host", frame),
                Err(e) => tracing::warn!("Dropping line from host: {}", e),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Error reading from host: {}", e);
                break;
            }
        }
    }

    let by_host = link.terminated_by_host.load(Ordering::Acquire);
    let left = link.left.load(Ordering::Acquire);
    if !by_host && !left {
        tracing::info!("Disconnected from host");
        link.emit(ChatEvent::Disconnected);
    }
    link.connection.close();
    tracing::debug!("Link receive task finished");
}
