//! Integration tests for the authoritative multiplayer server
//!
//! These tests run real server instances: over live WebSocket connections
//! for transport-level behavior, and against the engine's step API where
//! tick-window timing must be deterministic.

use futures_util::{SinkExt, StreamExt};
use server::{stats, GameServer, ServerConfig};
use shared::ServerMessage;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// WEBSOCKET TRANSPORT TESTS
mod transport_tests {
    use super::*;

    /// A fresh connection receives a Hello identifying its own player.
    #[tokio::test]
    async fn hello_arrives_on_connect() {
        let (addr, _stats) = spawn_server(ServerConfig::default()).await;
        let mut client = connect(addr).await;

        match next_message(&mut client).await {
            Some(ServerMessage::Hello { id, x, y, hue }) => {
                assert!(id >= 1);
                assert!((0.0..shared::WORLD_WIDTH).contains(&x));
                assert!((0.0..shared::WORLD_HEIGHT).contains(&y));
                assert!(hue < 360);
            }
            other => panic!("expected Hello, got {:?}", other),
        }
    }

    /// A malformed frame closes the offending connection, counts one bogus
    /// message, and leaves other players connected.
    #[tokio::test]
    async fn malformed_frame_closes_only_offender() {
        let (addr, stats) = spawn_server(ServerConfig::default()).await;

        let mut offender = connect(addr).await;
        let mut bystander = connect(addr).await;
        assert!(matches!(
            next_message(&mut offender).await,
            Some(ServerMessage::Hello { .. })
        ));
        assert!(matches!(
            next_message(&mut bystander).await,
            Some(ServerMessage::Hello { .. })
        ));

        offender
            .send(Message::Text("definitely not a move intent".into()))
            .await
            .expect("send garbage");

        assert!(
            closed_without_text(&mut offender).await,
            "offender should be force-closed"
        );
        wait_for_counter(&stats, stats::BOGUS_MESSAGES, 1).await;

        // The bystander is still served: it hears the offender leave.
        let mut saw_left = false;
        for _ in 0..10 {
            match next_message(&mut bystander).await {
                Some(ServerMessage::PlayerLeft { .. }) => {
                    saw_left = true;
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        assert!(saw_left, "bystander should see the offender leave");
    }
}

/// CAPACITY TESTS
mod capacity_tests {
    use super::*;

    /// With capacity 2, the third connection is rejected before being
    /// assigned an id: it receives no Hello, the rejection counter moves by
    /// exactly one, and no broadcast ever mentions a third player.
    #[tokio::test]
    async fn third_connection_is_rejected_invisibly() {
        let config = ServerConfig {
            max_players: 2,
            ..ServerConfig::default()
        };
        let (addr, stats) = spawn_server(config).await;

        let mut first = connect(addr).await;
        let mut second = connect(addr).await;

        let first_id = expect_hello(&mut first).await;
        let second_id = expect_hello(&mut second).await;
        assert_ne!(first_id, second_id);

        let mut rejected = connect(addr).await;
        assert!(
            closed_without_text(&mut rejected).await,
            "rejected connection must never receive a message"
        );
        wait_for_counter(&stats, stats::CONNECTIONS_REJECTED, 1).await;
        assert_eq!(
            stats.lock().await.counter(stats::CONNECTIONS_REJECTED),
            1
        );

        // Drain a few ticks of traffic: every mentioned id belongs to the
        // two admitted players.
        tokio::time::sleep(Duration::from_millis(100)).await;
        while let Ok(Some(message)) =
            timeout(Duration::from_millis(50), read_message(&mut first)).await
        {
            let id = mentioned_id(&message);
            assert!(
                id == first_id || id == second_id,
                "unexpected player in broadcast: {:?}",
                message
            );
        }
    }

    /// A freed slot can be reused, but ids are never reused.
    #[tokio::test]
    async fn slot_frees_on_disconnect() {
        let config = ServerConfig {
            max_players: 1,
            ..ServerConfig::default()
        };
        let (addr, _stats) = spawn_server(config).await;

        let mut first = connect(addr).await;
        let first_id = expect_hello(&mut first).await;
        first.close(None).await.expect("close");
        drop(first);

        // Give the server a moment to tear the session down.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut second = connect(addr).await;
        let second_id = expect_hello(&mut second).await;
        assert!(second_id > first_id);
    }
}

/// TICK-WINDOW LIFECYCLE TESTS (socketless, deterministic ticks)
mod lifecycle_tests {
    use super::*;

    /// A player that joins, moves, and disconnects before the next tick is
    /// invisible: no other connection receives any message mentioning it.
    #[tokio::test]
    async fn same_tick_lifetime_is_never_broadcast() {
        let mut server = GameServer::new(ServerConfig::default());
        let sessions = server.sessions();

        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let bystander = sessions.connect(tx_b).await.expect("admitted");
        server.step(0.016).await;
        while rx_b.try_recv().is_ok() {}

        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let ghost = sessions.connect(tx_a).await.expect("admitted");
        sessions
            .inbound(ghost.id, r#"{"start":true,"direction":"right"}"#)
            .await
            .expect("valid intent");
        sessions.disconnect(ghost.id).await;

        for _ in 0..3 {
            server.step(0.016).await;
        }

        while let Ok(frame) = rx_b.try_recv() {
            let message: ServerMessage = serde_json::from_str(&frame).expect("valid frame");
            assert_ne!(
                mentioned_id(&message),
                ghost.id,
                "bystander {} heard about ghost: {:?}",
                bystander.id,
                message
            );
        }
    }

    /// Movement toggled in one tick keeps applying on every later tick
    /// until released, and a late joiner's greeting reflects both the
    /// advanced position and the still-held intent.
    #[tokio::test]
    async fn held_intent_keeps_integrating() {
        let mut server = GameServer::new(ServerConfig::default());
        let sessions = server.sessions();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let player = sessions.connect(tx).await.expect("admitted");
        server.step(0.016).await;
        sessions
            .inbound(player.id, r#"{"start":true,"direction":"right"}"#)
            .await
            .expect("valid intent");

        // 120 ticks at 16ms move the player 288 units to the right
        // (wrapped), so the greeted position cannot equal the spawn.
        for _ in 0..120 {
            server.step(0.016).await;
        }
        while rx.try_recv().is_ok() {}

        let (tx_o, mut rx_o) = mpsc::unbounded_channel();
        let observer = sessions.connect(tx_o).await.expect("admitted");
        server.step(0.016).await;

        let mut greeted_mover = false;
        let mut replayed_intent = false;
        while let Ok(frame) = rx_o.try_recv() {
            let message: ServerMessage = serde_json::from_str(&frame).expect("valid frame");
            match message {
                ServerMessage::PlayerJoined { id, x, y, .. } if id == player.id => {
                    greeted_mover = true;
                    assert_ne!(x, player.x, "position should have advanced");
                    assert!((0.0..shared::WORLD_WIDTH).contains(&x));
                    assert!((0.0..shared::WORLD_HEIGHT).contains(&y));
                }
                ServerMessage::PlayerMoving {
                    id, start: true, ..
                } if id == player.id => {
                    replayed_intent = true;
                }
                _ => {}
            }
        }
        assert!(greeted_mover, "observer {} missed the greeting", observer.id);
        assert!(replayed_intent, "held intent was not replayed to observer");
    }
}

// HELPER FUNCTIONS

/// Starts a server on an ephemeral port and returns its address plus a
/// handle to its stats registry.
async fn spawn_server(
    config: ServerConfig,
) -> (
    std::net::SocketAddr,
    std::sync::Arc<tokio::sync::Mutex<server::stats::Stats>>,
) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    let server = GameServer::new(config);
    let stats = server.stats();
    tokio::spawn(server.run(listener));

    (addr, stats)
}

async fn connect(addr: std::net::SocketAddr) -> WsClient {
    let (client, _) = timeout(
        Duration::from_secs(2),
        connect_async(format!("ws://{}", addr)),
    )
    .await
    .expect("connect timeout")
    .expect("websocket handshake");
    client
}

/// Reads the next decoded server message, skipping non-text frames.
/// Returns None once the connection is closed.
async fn read_message(client: &mut WsClient) -> Option<ServerMessage> {
    loop {
        match client.next().await? {
            Ok(Message::Text(text)) => {
                return Some(serde_json::from_str(&text).expect("valid server message"))
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

async fn next_message(client: &mut WsClient) -> Option<ServerMessage> {
    timeout(Duration::from_secs(2), read_message(client))
        .await
        .expect("message timeout")
}

async fn expect_hello(client: &mut WsClient) -> u32 {
    match next_message(client).await {
        Some(ServerMessage::Hello { id, .. }) => id,
        other => panic!("expected Hello, got {:?}", other),
    }
}

/// True if the connection closes without delivering any further text frame.
async fn closed_without_text(client: &mut WsClient) -> bool {
    let result = timeout(Duration::from_secs(2), read_message(client)).await;
    matches!(result, Ok(None))
}

fn mentioned_id(message: &ServerMessage) -> u32 {
    match message {
        ServerMessage::Hello { id, .. }
        | ServerMessage::PlayerJoined { id, .. }
        | ServerMessage::PlayerLeft { id }
        | ServerMessage::PlayerMoving { id, .. } => *id,
    }
}

/// Polls a counter until it reaches `expected` or two seconds elapse.
async fn wait_for_counter(
    stats: &std::sync::Arc<tokio::sync::Mutex<server::stats::Stats>>,
    name: &str,
    expected: u64,
) {
    for _ in 0..40 {
        if stats.lock().await.counter(name) >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "counter {} never reached {} (got {})",
        name,
        expected,
        stats.lock().await.counter(name)
    );
}
