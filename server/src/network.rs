//! WebSocket transport adapter
//!
//! Bridges raw connections to the session layer: one reader and one writer
//! task per connection. The writer drains the session's outbound channel of
//! pre-encoded frames, so nothing in the tick path ever waits on a socket.
//! All admission, validation, and teardown decisions live in
//! [`crate::session`]; this module only moves frames.

use crate::session::SessionManager;
use futures_util::{SinkExt, StreamExt};
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Accepts connections forever, spawning a handler task per connection.
pub async fn run_listener(sessions: Arc<SessionManager>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let sessions = Arc::clone(&sessions);
                tokio::spawn(async move {
                    handle_connection(sessions, stream, addr).await;
                });
            }
            Err(err) => {
                error!("Failed to accept connection: {}", err);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

async fn handle_connection(sessions: Arc<SessionManager>, stream: TcpStream, addr: SocketAddr) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(err) => {
            warn!("WebSocket handshake failed from {}: {}", addr, err);
            return;
        }
    };

    let (mut sink, mut source) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    let player = match sessions.connect(outbound_tx).await {
        Some(player) => player,
        None => {
            // At capacity: close immediately, no id was assigned.
            let _ = sink.close().await;
            return;
        }
    };
    let id = player.id;
    info!("Player {} connected from {}", id, addr);

    // Writer task: forwards queued frames until the session is torn down
    // (disconnect drops the sender, ending the stream) or the socket dies.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Reader loop: any protocol violation terminates the connection.
    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if sessions.inbound(id, &text).await.is_err() {
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!("Binary frame from player {}, closing", id);
                sessions.note_bogus().await;
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
            Ok(Message::Close(_)) => break,
            Err(err) => {
                warn!("Read error from player {}: {}", id, err);
                break;
            }
        }
    }

    sessions.disconnect(id).await;
    let _ = writer.await;
}
