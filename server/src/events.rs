//! Per-tick event queue shared between connection tasks and the tick engine
//!
//! Connection tasks only ever append; the tick engine drains the whole queue
//! exactly once per tick. The queue is the sole synchronization point for
//! player-visible state changes: appends are atomic with respect to the
//! drain, so a drain never observes a partial append and no append is lost.

use shared::Direction;
use std::sync::{Mutex, PoisonError};

/// A raw event produced by the connection layer between ticks.
///
/// Events never survive the tick that consumes them.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A player connected and was registered in the world.
    Joined { id: u32, x: f32, y: f32, hue: u16 },
    /// A player disconnected and was removed from the world.
    Left { id: u32 },
    /// A player toggled a movement intent. Carries the server-side position
    /// at the time the toggle arrived, not any client-reported coordinate.
    Moving {
        id: u32,
        x: f32,
        y: f32,
        start: bool,
        direction: Direction,
    },
}

/// Transient buffer of events accumulated since the last tick.
#[derive(Debug, Default)]
pub struct EventQueue {
    inner: Mutex<Vec<Event>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one event. Callable from any task at any time.
    pub fn push(&self, event: Event) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Takes every buffered event, leaving the queue empty.
    ///
    /// Arrival order is preserved; the engine relies on it when replaying
    /// movement events.
    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(
            &mut *self
                .inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
