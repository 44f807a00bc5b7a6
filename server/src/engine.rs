//! The authoritative tick engine: fixed-rate scheduler and tick phases
//!
//! Once per tick the engine drains the event queue, reconciles same-tick
//! join/leave noise, drives the ordered broadcast phases, integrates
//! movement, and records bookkeeping stats. It is the only component that
//! mutates player movement state or sends broadcasts, which keeps the whole
//! simulation on a single logical thread of control.
//!
//! Phase order matters: greeting before the join broadcast so a newcomer
//! never hears about itself twice, the leave broadcast after both so a
//! cross-tick join+leave is still announced then removed, and movement
//! replay before integration so broadcast positions match what clients
//! extrapolate from.

use crate::events::{Event, EventQueue};
use crate::session::SessionManager;
use crate::stats::{self, Stats};
use crate::world::World;
use log::{debug, error, info};
use shared::ServerMessage;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, RwLock};

/// A stats snapshot is pushed to subscribers every this many ticks.
const SNAPSHOT_INTERVAL: u64 = 60;

/// A join that survived reconciliation, with the spawn state to announce.
#[derive(Debug, Clone, PartialEq)]
pub struct Arrival {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub hue: u16,
}

/// Collapses the tick's raw events into disjoint arrival and departure sets.
///
/// A `Left` whose id joined within the same tick erases that join instead of
/// producing a departure: the player's entire lifetime fit inside one tick
/// window and is invisible to everyone else. `Moving` events pass through
/// untouched; the engine replays them from the raw queue in arrival order.
pub fn reconcile(events: &[Event]) -> (Vec<Arrival>, Vec<u32>) {
    let mut arrivals: Vec<Arrival> = Vec::new();
    let mut departures: Vec<u32> = Vec::new();

    for event in events {
        match event {
            Event::Joined { id, x, y, hue } => {
                arrivals.push(Arrival {
                    id: *id,
                    x: *x,
                    y: *y,
                    hue: *hue,
                });
            }
            Event::Left { id } => {
                if let Some(index) = arrivals.iter().position(|a| a.id == *id) {
                    arrivals.remove(index);
                } else {
                    departures.push(*id);
                }
            }
            Event::Moving { .. } => {}
        }
    }

    (arrivals, departures)
}

/// Outbound traffic tallied during one tick, reset every tick.
#[derive(Debug, Default, Clone, Copy)]
struct TickOutput {
    messages: u64,
    bytes: u64,
}

type OutboundTable = HashMap<u32, mpsc::UnboundedSender<String>>;

fn encode(message: &ServerMessage) -> Option<String> {
    match shared::encode_message(message) {
        Ok(frame) => Some(frame),
        Err(err) => {
            error!("Failed to encode outbound message: {}", err);
            None
        }
    }
}

/// Queues one frame on a session's outbound channel. Missing or closed
/// channels are ignored; delivery never blocks the tick.
fn deliver(outbound: &OutboundTable, id: u32, frame: &str, out: &mut TickOutput) {
    if let Some(tx) = outbound.get(&id) {
        if tx.send(frame.to_string()).is_ok() {
            out.messages += 1;
            out.bytes += frame.len() as u64;
        }
    }
}

fn send_to(outbound: &OutboundTable, id: u32, message: &ServerMessage, out: &mut TickOutput) {
    if let Some(frame) = encode(message) {
        deliver(outbound, id, &frame, out);
    }
}

/// The fixed-rate simulation driver.
pub struct TickEngine {
    world: Arc<RwLock<World>>,
    queue: Arc<EventQueue>,
    stats: Arc<Mutex<Stats>>,
    sessions: Arc<SessionManager>,
    period: Duration,
    ticks: u64,
}

impl TickEngine {
    pub fn new(
        world: Arc<RwLock<World>>,
        queue: Arc<EventQueue>,
        stats: Arc<Mutex<Stats>>,
        sessions: Arc<SessionManager>,
        tick_rate: u32,
    ) -> Self {
        Self {
            world,
            queue,
            stats,
            sessions,
            period: Duration::from_secs_f32(1.0 / tick_rate as f32),
            ticks: 0,
        }
    }

    /// Number of ticks executed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs the scheduler loop forever.
    ///
    /// Each tick sleeps for `period - processing_time`, floored at zero, so
    /// an overrun shortens the next sleep instead of skipping or batching
    /// ticks; under sustained overrun the effective rate simply drops.
    pub async fn run(mut self) {
        info!(
            "Tick engine running at {:.0} ticks/sec nominal",
            1.0 / self.period.as_secs_f32()
        );

        let mut last_tick = Instant::now();
        loop {
            let tick_start = Instant::now();
            let dt = tick_start.duration_since(last_tick).as_secs_f32();
            last_tick = tick_start;

            self.tick(dt).await;

            let sleep_for = self.period.saturating_sub(tick_start.elapsed());
            tokio::time::sleep(sleep_for).await;
        }
    }

    /// Executes one complete tick: reconciliation, the four broadcast
    /// phases, integration, and bookkeeping.
    pub async fn tick(&mut self, dt: f32) {
        let started = Instant::now();

        // Phase 0: drain and reconcile the event queue.
        let events = self.queue.drain();
        let (arrivals, departures) = reconcile(&events);

        let mut out = TickOutput::default();
        let player_count;

        {
            let world = self.world.read().await;
            let outbound = self.sessions.outbound().await;

            // Phase 1: greet each newcomer with its own identity, then a
            // full snapshot of every other player including in-flight
            // movement.
            for arrival in &arrivals {
                send_to(
                    &outbound,
                    arrival.id,
                    &ServerMessage::Hello {
                        id: arrival.id,
                        x: arrival.x,
                        y: arrival.y,
                        hue: arrival.hue,
                    },
                    &mut out,
                );

                for other in world.players() {
                    if other.id == arrival.id {
                        continue;
                    }
                    send_to(
                        &outbound,
                        arrival.id,
                        &ServerMessage::PlayerJoined {
                            id: other.id,
                            x: other.x,
                            y: other.y,
                            hue: other.hue,
                        },
                        &mut out,
                    );
                    for direction in other.held_directions() {
                        send_to(
                            &outbound,
                            arrival.id,
                            &ServerMessage::PlayerMoving {
                                id: other.id,
                                x: other.x,
                                y: other.y,
                                start: true,
                                direction,
                            },
                            &mut out,
                        );
                    }
                }
            }

            // Phase 2: announce each newcomer to everyone else. Newcomers
            // already learned about themselves in the greeting.
            for arrival in &arrivals {
                if let Some(frame) = encode(&ServerMessage::PlayerJoined {
                    id: arrival.id,
                    x: arrival.x,
                    y: arrival.y,
                    hue: arrival.hue,
                }) {
                    for other in world.players() {
                        if other.id != arrival.id {
                            deliver(&outbound, other.id, &frame, &mut out);
                        }
                    }
                }
            }

            // Phase 3: announce departures to every remaining player.
            for id in &departures {
                if let Some(frame) = encode(&ServerMessage::PlayerLeft { id: *id }) {
                    for player in world.players() {
                        deliver(&outbound, player.id, &frame, &mut out);
                    }
                }
            }
        }

        {
            let mut world = self.world.write().await;
            let outbound = self.sessions.outbound().await;

            // Phase 4: replay movement toggles in arrival order, mutating
            // intent flags and rebroadcasting verbatim to every registered
            // player, the mover included. Toggles for players that left
            // mid-tick are stale and skipped silently.
            for event in &events {
                if let Event::Moving {
                    id,
                    x,
                    y,
                    start,
                    direction,
                } = event
                {
                    if !world.set_intent(*id, *direction, *start) {
                        continue;
                    }
                    if let Some(frame) = encode(&ServerMessage::PlayerMoving {
                        id: *id,
                        x: *x,
                        y: *y,
                        start: *start,
                        direction: *direction,
                    }) {
                        for target in world.ids() {
                            deliver(&outbound, target, &frame, &mut out);
                        }
                    }
                }
            }

            // Phase 5: integrate movement for the tick's elapsed time.
            world.advance_all(dt);
            player_count = world.len();
        }

        // Phase 6: bookkeeping and periodic snapshot publication.
        self.ticks += 1;
        let processing_ms = started.elapsed().as_secs_f64() * 1000.0;

        let mut stats = self.stats.lock().await;
        stats.inc(stats::TICKS);
        stats.sample(stats::TICK_MILLIS, processing_ms);
        stats.sample(stats::MESSAGES_PER_TICK, out.messages as f64);
        stats.sample(stats::BYTES_PER_TICK, out.bytes as f64);

        if self.ticks % SNAPSHOT_INTERVAL == 0 {
            stats.publish();
            if player_count > 0 {
                debug!(
                    "Tick {}: {} players, {} msgs, {} bytes, {:.2}ms processing",
                    self.ticks, player_count, out.messages, out.bytes, processing_ms
                );
            }
        }
    }
}
