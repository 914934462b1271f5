//! Line-oriented connection over a TCP stream

use std::net::SocketAddr;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};

/// Longest accepted line in bytes, terminator excluded
pub const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection is closed")]
    Closed,

    #[error("Line exceeds the 64 KiB limit")]
    LineTooLong,
}

/// One bidirectional line stream.
///
/// Shared behind an `Arc`: one reader task, any number of writers. `close`
/// wakes up a pending `read_line` or `write_line` and drops the write half so
/// the peer observes end of stream.
pub struct Connection {
    peer: SocketAddr,
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    closed: watch::Sender<bool>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Result<Self, ConnectionError> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        let (closed, _) = watch::channel(false);

        Ok(Self {
            peer,
            reader: Mutex::new(BufReader::new(reader)),
            writer: Mutex::new(Some(writer)),
            closed,
        })
    }

    /// Remote address of this connection
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once `close` has been called
    pub async fn closed(&self) {
        let mut closed = self.closed.subscribe();
        closed_signal(&mut closed).await;
    }

    /// Read the next line, without its terminator.
    ///
    /// Returns `Ok(None)` on end of stream or after `close`.
    pub async fn read_line(&self) -> Result<Option<String>, ConnectionError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Ok(None);
        }

        let mut reader = self.reader.lock().await;
        // Room for a full-length line plus "\r\n"
        let mut limited = (&mut *reader).take(MAX_LINE_BYTES as u64 + 2);
        let mut buf = Vec::new();

        let read = tokio::select! {
            read = limited.read_until(b'\n', &mut buf) => read?,
            _ = closed_signal(&mut closed) => return Ok(None),
        };

        if read == 0 {
            return Ok(None);
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        if buf.len() > MAX_LINE_BYTES {
            return Err(ConnectionError::LineTooLong);
        }

        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Write `line` followed by a newline and flush
    pub async fn write_line(&self, line: &str) -> Result<(), ConnectionError> {
        let mut closed = self.closed.subscribe();
        let mut guard = self.writer.lock().await;

        if *closed.borrow_and_update() {
            guard.take();
            return Err(ConnectionError::Closed);
        }
        let writer = guard.as_mut().ok_or(ConnectionError::Closed)?;

        let mut framed = Vec::with_capacity(line.len() + 1);
        framed.extend_from_slice(line.as_bytes());
        framed.push(b'\n');

        let result = tokio::select! {
            result = async {
                writer.write_all(&framed).await?;
                writer.flush().await
            } => result.map_err(ConnectionError::from),
            _ = closed_signal(&mut closed) => Err(ConnectionError::Closed),
        };

        if result.is_err() || self.is_closed() {
            guard.take();
        }
        result
    }

    /// Close the connection. Idempotent, safe from any task.
    pub fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        tracing::debug!("Closing connection to {}", self.peer);

        // A writer holding the lock drops the half itself once it wakes up.
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
    }
}

/// Resolves once `close` has been called
async fn closed_signal(closed: &mut watch::Receiver<bool>) {
    loop {
        if *closed.borrow_and_update() {
            return;
        }
        if closed.changed().await.is_err() {
            return;
        }
    }
}
