//! JSON-lines TCP adapter.
//!
//! Each accepted socket becomes a [`ConnectionId`]. Lines in are [`ClientMessage`]s; the hub's
//! outbound messages are routed to the owning socket as one JSON document per line.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use tradewinds_core::{ConnectionId, ErrorKind};

use crate::hub::{Outbound, RoomHub};
use crate::protocol::{client_message_from_line, server_message_to_line, ServerMessage};

/// Longest accepted request line, newline included.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

type Clients = Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>>>;

#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    Line,
    Eof,
    TooLong,
}

/// Read one line into `buf` without buffering more than `limit` bytes.
async fn read_bounded_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    limit: usize,
) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let read = reader.take(limit as u64).read_until(b'\n', buf).await?;
    if read == 0 {
        Ok(LineRead::Eof)
    } else if read == limit && buf.last() != Some(&b'\n') {
        Ok(LineRead::TooLong)
    } else {
        Ok(LineRead::Line)
    }
}

pub struct LineServer {
    hub: RoomHub,
    clients: Clients,
    next_id: AtomicU64,
}

impl LineServer {
    pub fn new(hub: RoomHub) -> Self {
        Self {
            hub,
            clients: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Forward hub output to sockets until the hub's channel closes.
    pub fn spawn_router(&self, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
        let clients = self.clients.clone();
        tokio::spawn(async move {
            while let Some(Outbound { to, message }) = outbound.recv().await {
                if let Some(tx) = clients.read().await.get(&to) {
                    let _ = tx.send(message);
                }
            }
            debug!("outbound router stopped");
        });
    }

    /// Accept connections forever.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            let conn = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
            info!(%conn, %peer, "client connected");
            let server = self.clone();
            tokio::spawn(async move {
                server.run_connection(conn, stream).await;
            });
        }
    }

    async fn run_connection(&self, conn: ConnectionId, stream: TcpStream) {
        let (read_half, mut write_half) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
        self.clients.write().await.insert(conn, tx.clone());

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let line = match server_message_to_line(&message) {
                    Ok(line) => line,
                    Err(err) => {
                        warn!(%conn, error = %err, "failed to encode message");
                        continue;
                    }
                };
                if write_half.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        let reject = |message: String| {
            let _ = tx.send(ServerMessage::Error {
                kind: ErrorKind::Validation,
                action: "decode".to_string(),
                message,
            });
        };

        let mut reader = BufReader::new(read_half);
        let mut buf = Vec::new();
        loop {
            match read_bounded_line(&mut reader, &mut buf, MAX_LINE_BYTES).await {
                Ok(LineRead::Line) => {}
                Ok(LineRead::Eof) => break,
                Ok(LineRead::TooLong) => {
                    warn!(%conn, limit = MAX_LINE_BYTES, "request line too long, closing");
                    reject(format!("request line exceeds {MAX_LINE_BYTES} bytes"));
                    break;
                }
                Err(err) => {
                    debug!(%conn, error = %err, "read failed");
                    break;
                }
            }
            let line = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => line,
                Err(err) => {
                    reject(err.to_string());
                    continue;
                }
            };
            match client_message_from_line(line) {
                Ok(msg) => self.hub.handle(conn, msg).await,
                Err(err) => reject(err.to_string()),
            }
        }

        self.clients.write().await.remove(&conn);
        self.hub.disconnect(conn).await;
        writer.abort();
        info!(%conn, "client disconnected");
    }
}
