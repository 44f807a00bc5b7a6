//! # Authoritative Simulation Server
//!
//! Server-authoritative real-time multiplayer simulation. Clients connect
//! over WebSockets, send movement-intent toggles, and receive a continuously
//! reconciled view of every connected player's position on a toroidal world.
//!
//! ## Architecture
//!
//! All player-visible state changes flow through a single logical thread of
//! control, the tick engine. Connection tasks run concurrently but only ever
//! append to the event queue or touch their own socket; once per tick the
//! engine drains the queue, reconciles it, broadcasts, and integrates
//! movement. The queue is therefore the sole synchronization point between
//! the network edge and the simulation.
//!
//! ## Module Organization
//!
//! - [`world`] — player registry and movement integration (toroidal wrap,
//!   intent-vector summing).
//! - [`events`] — the per-tick event queue connecting connection tasks to
//!   the engine.
//! - [`engine`] — the fixed-rate tick loop and its ordered phases.
//! - [`session`] — connection admission, frame validation, teardown.
//! - [`stats`] — counters, bounded moving averages, timers, and the
//!   snapshot subscription feed.
//! - [`network`] — the WebSocket listener and per-connection tasks.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use server::{GameServer, ServerConfig};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     let server = GameServer::new(ServerConfig::default());
//!     server.run(listener).await;
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod events;
pub mod network;
pub mod session;
pub mod stats;
pub mod world;

use engine::TickEngine;
use events::EventQueue;
use session::{SessionLimits, SessionManager};
use stats::{Stats, StatsSnapshot};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex, RwLock};
use world::World;

/// Shared simulation parameters, fixed for the lifetime of a server.
///
/// These must match whatever the clients were built against; they are
/// configuration, not protocol-negotiated.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub width: f32,
    pub height: f32,
    pub player_size: f32,
    pub speed: f32,
    pub max_players: usize,
    pub tick_rate: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            width: shared::WORLD_WIDTH,
            height: shared::WORLD_HEIGHT,
            player_size: shared::PLAYER_SIZE,
            speed: shared::PLAYER_SPEED,
            max_players: shared::MAX_PLAYERS,
            tick_rate: shared::TICK_RATE,
        }
    }
}

/// One independent server instance: world, queue, stats, sessions, engine.
///
/// Nothing is global; multiple instances can coexist in one process, which
/// is how the integration tests run servers side by side.
pub struct GameServer {
    engine: TickEngine,
    sessions: Arc<SessionManager>,
    stats: Arc<Mutex<Stats>>,
}

impl GameServer {
    pub fn new(config: ServerConfig) -> Self {
        let world = Arc::new(RwLock::new(World::new(
            config.width,
            config.height,
            config.speed,
        )));
        let queue = Arc::new(EventQueue::new());
        let stats = Arc::new(Mutex::new(Stats::new()));
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&world),
            Arc::clone(&queue),
            Arc::clone(&stats),
            SessionLimits {
                width: config.width,
                height: config.height,
                player_size: config.player_size,
                max_players: config.max_players,
            },
        ));
        let engine = TickEngine::new(
            world,
            queue,
            Arc::clone(&stats),
            Arc::clone(&sessions),
            config.tick_rate,
        );

        Self {
            engine,
            sessions,
            stats,
        }
    }

    /// Handle to the connection layer, used by the transport and by tests
    /// that drive sessions without sockets.
    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }

    /// Handle to the stats registry.
    pub fn stats(&self) -> Arc<Mutex<Stats>> {
        Arc::clone(&self.stats)
    }

    /// Registers a stats snapshot subscriber.
    pub async fn subscribe_stats(&self) -> mpsc::UnboundedReceiver<StatsSnapshot> {
        self.stats.lock().await.subscribe()
    }

    /// Runs a single tick with an explicit delta time. Test hook; the
    /// production loop lives in [`GameServer::run`].
    pub async fn step(&mut self, dt: f32) {
        self.engine.tick(dt).await;
    }

    /// Serves connections from the listener and runs the tick loop until
    /// the process exits.
    pub async fn run(self, listener: TcpListener) {
        tokio::spawn(network::run_listener(Arc::clone(&self.sessions), listener));
        self.engine.run().await;
    }
}
