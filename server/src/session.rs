//! Connection lifecycle management: accept, validate, disconnect
//!
//! The session manager is the only component that admits or evicts players.
//! It enforces the capacity limit at accept time, assigns ids and spawn
//! state, validates every inbound frame, and translates connection activity
//! into events for the tick engine. It never touches player positions or
//! movement flags directly; those belong to the engine's tick phases.
//!
//! Outbound delivery is fire-and-forget: each session registers an unbounded
//! channel of pre-encoded frames, so a slow or broken connection can never
//! stall the tick for other players.

use crate::events::{Event, EventQueue};
use crate::stats::{self, Stats};
use crate::world::{Player, World};
use log::{info, warn};
use rand::Rng;
use shared::{decode_intent, ProtocolError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock, RwLockReadGuard};

/// Spawn parameters and the capacity limit, fixed at startup.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub width: f32,
    pub height: f32,
    pub player_size: f32,
    pub max_players: usize,
}

/// Tracks every live connection's outbound channel and admits new players.
pub struct SessionManager {
    world: Arc<RwLock<World>>,
    queue: Arc<EventQueue>,
    stats: Arc<Mutex<Stats>>,
    senders: RwLock<HashMap<u32, mpsc::UnboundedSender<String>>>,
    limits: SessionLimits,
}

impl SessionManager {
    pub fn new(
        world: Arc<RwLock<World>>,
        queue: Arc<EventQueue>,
        stats: Arc<Mutex<Stats>>,
        limits: SessionLimits,
    ) -> Self {
        Self {
            world,
            queue,
            stats,
            senders: RwLock::new(HashMap::new()),
            limits,
        }
    }

    /// Admits a new connection, or rejects it if the server is full.
    ///
    /// On success the player is registered in the world at a uniformly
    /// random spawn point with a random hue, the outbound channel is
    /// registered, and a `Joined` event is enqueued for the next tick.
    /// On rejection no id is assigned and only the rejection counter moves;
    /// the caller must close the channel.
    pub async fn connect(&self, outbound: mpsc::UnboundedSender<String>) -> Option<Player> {
        let player = {
            let mut world = self.world.write().await;
            if world.len() >= self.limits.max_players {
                drop(world);
                warn!("Connection rejected: server at capacity");
                self.stats.lock().await.inc(stats::CONNECTIONS_REJECTED);
                return None;
            }

            let mut rng = rand::thread_rng();
            let x = rng.gen_range(0.0..self.limits.width - self.limits.player_size);
            let y = rng.gen_range(0.0..self.limits.height - self.limits.player_size);
            let hue = rng.gen_range(0..360u16);
            world.spawn(x, y, hue)
        };

        self.senders.write().await.insert(player.id, outbound);
        self.queue.push(Event::Joined {
            id: player.id,
            x: player.x,
            y: player.y,
            hue: player.hue,
        });
        self.stats.lock().await.inc(stats::CONNECTIONS);
        info!("Player {} connected", player.id);

        Some(player)
    }

    /// Validates one inbound text frame from a connected player.
    ///
    /// A valid move intent is enqueued carrying the player's current
    /// server-side position; the client's own position claims are never
    /// trusted. Any malformed frame counts as bogus and returns an error,
    /// after which the caller must terminate the connection.
    pub async fn inbound(&self, id: u32, frame: &str) -> Result<(), ProtocolError> {
        let intent = match decode_intent(frame) {
            Ok(intent) => intent,
            Err(err) => {
                warn!("Bogus message from player {}: {}", id, err);
                self.note_bogus().await;
                return Err(err);
            }
        };

        // The player can only be missing if disconnect cleanup raced this
        // frame; the event would be stale anyway, so drop it silently.
        let world = self.world.read().await;
        if let Some(player) = world.get(id) {
            self.queue.push(Event::Moving {
                id,
                x: player.x,
                y: player.y,
                start: intent.start,
                direction: intent.direction,
            });
        }

        Ok(())
    }

    /// Counts a protocol violation that did not reach the decoder (for
    /// example a binary frame).
    pub async fn note_bogus(&self) {
        self.stats.lock().await.inc(stats::BOGUS_MESSAGES);
    }

    /// Tears down a session: removes the player from the world immediately,
    /// drops the outbound channel, and enqueues a `Left` event.
    ///
    /// Idempotent; only the first call for an id does anything, so the
    /// reader-error and writer-close paths can both invoke it.
    pub async fn disconnect(&self, id: u32) {
        let removed = self.world.write().await.remove(id);
        if !removed {
            return;
        }

        self.senders.write().await.remove(&id);
        self.queue.push(Event::Left { id });
        self.stats.lock().await.inc(stats::DISCONNECTIONS);
        info!("Player {} disconnected", id);
    }

    /// Read access to the outbound channel table, held by the engine for
    /// the duration of a broadcast phase.
    pub async fn outbound(&self) -> RwLockReadGuard<'_, HashMap<u32, mpsc::UnboundedSender<String>>> {
        self.senders.read().await
    }

    /// Number of sessions with a live outbound channel.
    pub async fn session_count(&self) -> usize {
        self.senders.read().await.len()
    }
}
