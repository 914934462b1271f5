//! Accept loop, session admission and the per-session receive loop

use super::room::{RoomInner, RoomState};
use super::session::ClientSession;
use crate::connection::Connection;
use crate::protocol::{self, ChatRecord, Frame, SYSTEM_SENDER};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

/// Accept connections until the room leaves [`RoomState::Open`]
pub(super) async fn accept_loop(room: Arc<RoomInner>, listener: TcpListener) {
    let mut lifecycle = room.lifecycle();
    let mut failures = 0u32;
    let mut fatal = false;

    loop {
        tokio::select! {
            _ = stopped(&mut lifecycle) => {
                tracing::info!("Room {} stopped accepting connections", room.room_id());
                break;
            }

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        failures = 0;
                        tracing::info!("Connection from {}", addr);
                        admit(&room, stream).await;
                    }
                    Err(e) => {
                        failures += 1;
                        tracing::error!("Failed to accept connection: {}", e);
                        if failures >= room.settings.max_accept_failures {
                            tracing::error!(
                                "Giving up on room {} after {} accept failures",
                                room.room_id(),
                                failures
                            );
                            fatal = true;
                            break;
                        }
                        tokio::time::sleep(room.settings.accept_backoff).await;
                    }
                }
            }
        }
    }

    // Closing the listening socket.
    drop(listener);

    if fatal {
        let room = Arc::clone(&room);
        tokio::spawn(async move { room.terminate(false).await });
    }
}

async fn stopped(lifecycle: &mut watch::Receiver<RoomState>) {
    loop {
        if *lifecycle.borrow_and_update() != RoomState::Open {
            return;
        }
        if lifecycle.changed().await.is_err() {
            return;
        }
    }
}

/// Wrap an accepted stream in a session and start its receive task
async fn admit(room: &Arc<RoomInner>, stream: TcpStream) {
    let connection = match Connection::new(stream) {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!("Dropping connection that failed setup: {}", e);
            return;
        }
    };

    let session = ClientSession::spawn(connection, room.settings.outbound_queue);
    if !room.register(Arc::clone(&session)).await {
        tracing::info!("Room {} is closing; refusing {}", room.room_id(), session.peer_addr());
        session.cleanup();
        return;
    }

    let handle = tokio::spawn(handle_client(Arc::clone(room), Arc::clone(&session)));
    session.set_receive_task(handle);
}

/// Lifetime of one session: name announcement, join notice, history
/// replay, relay loop, cleanup
async fn handle_client(room: Arc<RoomInner>, session: Arc<ClientSession>) {
    let name = read_announced_name(&session).await;
    session.set_name(name.clone());
    session.mark_admitted();

    tracing::info!(
        "{} joined room {} from {} (session {})",
        name,
        room.room_id(),
        session.peer_addr(),
        session.id()
    );

    room.announce(&format!("{} joined the chat.", name), Some(session.id())).await;

    if let Err(e) = room.replay_history(&session).await {
        tracing::warn!("History replay to {} failed: {}", name, e);
    }

    receive_loop(&room, &session).await;

    room.release(&session).await;
    tracing::info!("Client handler finished: {} ({})", name, session.id());
}

/// The first line must be a name announcement; anything else falls back to
/// the peer address
async fn read_announced_name(session: &ClientSession) -> String {
    let peer = session.peer_addr();

    match session.connection().read_line().await {
        Ok(Some(line)) => match protocol::decode(&line) {
            Ok(Frame::NameAnnounce { name }) => match protocol::sanitize_name(&name) {
                Ok(name) => return name,
                Err(e) => tracing::warn!("Rejected name from {}: {}", peer, e),
            },
            Ok(frame) => {
                tracing::warn!("Expected name announcement from {}, got {:?}", peer, frame)
            }
            Err(e) => tracing::warn!("Malformed name announcement from {}: {}", peer, e),
        },
        Ok(None) => tracing::debug!("{} closed before announcing a name", peer),
        Err(e) => tracing::warn!("Error reading name from {}: {}", peer, e),
    }

    fallback_name(peer)
}

fn fallback_name(peer: SocketAddr) -> String {
    protocol::sanitize_name(&peer.ip().to_string()).unwrap_or_else(|_| "guest".to_string())
}

async fn receive_loop(room: &RoomInner, session: &ClientSession) {
    let name = session.name();

    loop {
        match session.connection().read_line().await {
            Ok(Some(line)) => match protocol::decode(&line) {
                Ok(Frame::Chat { sender, .. }) if sender == SYSTEM_SENDER => {
                    tracing::warn!("Dropping system-sender line from {}", name);
                }
                Ok(Frame::Chat { sender, text }) => {
                    tracing::debug!("Host received from {}: {}", name, line);
                    let record = ChatRecord::new(room.room_id(), sender, text);
                    room.dispatch_chat(Some(session.id()), record, &line).await;
                }
                Ok(frame) => {
                    tracing::warn!("Dropping unexpected {:?} from {}", frame, name);
                }
                Err(e) => {
                    tracing::warn!("Dropping line from {}: {}", name, e);
                }
            },
            Ok(None) => {
                tracing::info!("Client disconnected: {}", name);
                break;
            }
            Err(e) => {
                tracing::warn!("Error reading from {}: {}", name, e);
                break;
            }
        }
    }
}
