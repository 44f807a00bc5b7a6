//! Shared world constants and wire protocol for the toroid multiplayer server
//!
//! Everything a client and the server must agree on lives here: the world
//! dimensions, movement speed, capacity limit, and the JSON message shapes
//! exchanged over the WebSocket channel. The protocol is textual, one JSON
//! object per frame, with server-to-client messages tagged by a `kind` field.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// World width in units. Player x positions always stay in `[0, WORLD_WIDTH)`.
pub const WORLD_WIDTH: f32 = 800.0;
/// World height in units. Player y positions always stay in `[0, WORLD_HEIGHT)`.
pub const WORLD_HEIGHT: f32 = 600.0;
/// Side length of a player's square hit box.
pub const PLAYER_SIZE: f32 = 32.0;
/// Movement speed in units per second along a single axis.
pub const PLAYER_SPEED: f32 = 150.0;
/// Maximum number of simultaneously connected players.
pub const MAX_PLAYERS: usize = 69;
/// Target simulation rate in ticks per second.
pub const TICK_RATE: u32 = 60;

/// One of the four movement directions a player can hold.
///
/// Directions are independent toggles: any subset may be active at once,
/// and their unit vectors are summed during integration.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    /// Unit vector for this direction. The y axis grows downward.
    pub fn vector(self) -> (f32, f32) {
        match self {
            Direction::Left => (-1.0, 0.0),
            Direction::Right => (1.0, 0.0),
            Direction::Up => (0.0, -1.0),
            Direction::Down => (0.0, 1.0),
        }
    }

    /// All directions in a fixed order, used when replaying held intents.
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
    ];
}

/// The single message shape a client may send: a movement-intent toggle.
///
/// `start: true` begins holding the direction, `start: false` releases it.
/// Any other frame content is a protocol violation and terminates the
/// connection, so unknown fields are rejected rather than ignored.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MoveIntent {
    pub start: bool,
    pub direction: Direction,
}

/// Server-to-client messages, tagged by `kind` on the wire.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind")]
pub enum ServerMessage {
    /// First message a client receives, identifying its own player.
    Hello { id: u32, x: f32, y: f32, hue: u16 },
    /// Another player exists (sent both as greeting snapshot and join
    /// announcement).
    PlayerJoined { id: u32, x: f32, y: f32, hue: u16 },
    /// A player left and should be removed from the client's view.
    PlayerLeft { id: u32 },
    /// A player toggled a movement intent; position is the server-side
    /// position at the time the toggle was enqueued.
    PlayerMoving {
        id: u32,
        x: f32,
        y: f32,
        start: bool,
        direction: Direction,
    },
}

/// Typed decode failure for inbound client frames.
///
/// Every variant is fatal to the offending connection: the server closes the
/// channel and counts the frame as bogus.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame was not valid JSON or did not match the move-intent shape.
    #[error("malformed move intent: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Frame was not a text frame (binary data has no meaning here).
    #[error("unexpected non-text frame")]
    NonText,
}

/// Parses a client frame as a movement-intent toggle.
///
/// Rejects anything that is not exactly `{start: bool, direction: ...}`:
/// wrong types, missing fields, unknown fields, or unknown directions.
pub fn decode_intent(raw: &str) -> Result<MoveIntent, ProtocolError> {
    Ok(serde_json::from_str(raw)?)
}

/// Encodes a server message as a single JSON text frame.
pub fn encode_message(message: &ServerMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}
