//! Authoritative world model: player registry and movement integration
//!
//! The world owns every player for its whole lifetime. Connections register
//! and remove players, but only the tick engine mutates positions and
//! movement intents, once per tick, after all broadcast phases.

use log::info;
use shared::Direction;
use std::collections::HashMap;

/// A connected player's authoritative state.
///
/// Positions always satisfy `0 <= x < width` and `0 <= y < height`; the
/// world wraps both axes toroidally on every integration step. The hue is
/// assigned once at creation and never changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    /// Server-assigned id, unique for the lifetime of the process.
    pub id: u32,
    pub x: f32,
    pub y: f32,
    /// Display hue in degrees, `0..360`.
    pub hue: u16,
    pub moving_left: bool,
    pub moving_right: bool,
    pub moving_up: bool,
    pub moving_down: bool,
}

impl Player {
    pub fn new(id: u32, x: f32, y: f32, hue: u16) -> Self {
        Self {
            id,
            x,
            y,
            hue,
            moving_left: false,
            moving_right: false,
            moving_up: false,
            moving_down: false,
        }
    }

    /// Reads the intent flag for one direction.
    pub fn intent(&self, direction: Direction) -> bool {
        match direction {
            Direction::Left => self.moving_left,
            Direction::Right => self.moving_right,
            Direction::Up => self.moving_up,
            Direction::Down => self.moving_down,
        }
    }

    /// Sets the intent flag for one direction.
    pub fn set_intent(&mut self, direction: Direction, start: bool) {
        match direction {
            Direction::Left => self.moving_left = start,
            Direction::Right => self.moving_right = start,
            Direction::Up => self.moving_up = start,
            Direction::Down => self.moving_down = start,
        }
    }

    /// Directions currently held, in a fixed left/right/up/down order.
    ///
    /// Used when greeting a newcomer: each held direction is replayed as a
    /// start toggle so the new client reconstructs in-flight movement.
    pub fn held_directions(&self) -> Vec<Direction> {
        Direction::ALL
            .into_iter()
            .filter(|d| self.intent(*d))
            .collect()
    }
}

/// Wraps `value` into `[0, range)`, non-negative for any sign of `value`.
pub fn wrap(value: f32, range: f32) -> f32 {
    ((value % range) + range) % range
}

/// Advances one player by `dt` seconds of movement.
///
/// Sums the unit vectors of all held directions and, when the sum is
/// non-zero, divides it by its *squared* length before scaling by speed and
/// dt. Dividing by the squared length (rather than the length) is the
/// long-standing behavior clients extrapolate with, so diagonal movement
/// runs at half the nominal per-axis speed instead of 1/sqrt(2). Kept as-is
/// and pinned by tests; changing it would desync every existing client.
pub fn advance(player: &mut Player, speed: f32, width: f32, height: f32, dt: f32) {
    let mut dx = 0.0_f32;
    let mut dy = 0.0_f32;
    for direction in Direction::ALL {
        if player.intent(direction) {
            let (vx, vy) = direction.vector();
            dx += vx;
            dy += vy;
        }
    }

    let length_squared = dx * dx + dy * dy;
    if length_squared > 0.0 {
        dx /= length_squared;
        dy /= length_squared;
        player.x = wrap(player.x + dx * speed * dt, width);
        player.y = wrap(player.y + dy * speed * dt, height);
    }
}

/// The player registry and integration parameters.
pub struct World {
    players: HashMap<u32, Player>,
    /// Next id to hand out; monotonically increasing, never reused.
    next_id: u32,
    width: f32,
    height: f32,
    speed: f32,
}

impl World {
    pub fn new(width: f32, height: f32, speed: f32) -> Self {
        Self {
            players: HashMap::new(),
            next_id: 1,
            width,
            height,
            speed,
        }
    }

    /// Registers a new player at the given spawn point and returns a copy.
    ///
    /// The caller (the connection layer) chooses spawn position and hue;
    /// the world only assigns the id.
    pub fn spawn(&mut self, x: f32, y: f32, hue: u16) -> Player {
        let id = self.next_id;
        self.next_id += 1;

        let player = Player::new(id, x, y, hue);
        info!("Player {} spawned at ({:.1}, {:.1})", id, x, y);
        self.players.insert(id, player.clone());
        player
    }

    /// Removes a player. Returns true if it was registered.
    pub fn remove(&mut self, id: u32) -> bool {
        if self.players.remove(&id).is_some() {
            info!("Player {} removed", id);
            true
        } else {
            false
        }
    }

    /// Sets a movement-intent flag. Returns false if the player is gone,
    /// which callers treat as a stale reference and skip silently.
    pub fn set_intent(&mut self, id: u32, direction: Direction, start: bool) -> bool {
        match self.players.get_mut(&id) {
            Some(player) => {
                player.set_intent(direction, start);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: u32) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.players.contains_key(&id)
    }

    /// All registered players, in no particular order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// All registered ids, collected so callers can send while re-locking.
    pub fn ids(&self) -> Vec<u32> {
        self.players.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Integrates movement for every player. Called once per tick, after
    /// the broadcast phases; this is the only place positions change.
    pub fn advance_all(&mut self, dt: f32) {
        let (speed, width, height) = (self.speed, self.width, self.height);
        for player in self.players.values_mut() {
            advance(player, speed, width, height, dt);
        }
    }
}
