//! Server statistics: counters, bounded moving averages, and uptime timers
//!
//! Stats are created once at startup and live for the whole process. The
//! closed `Stat` variant holds plain data; formatting and snapshotting are
//! free functions over it. Subscribers receive an immutable snapshot of
//! every stat each time the engine publishes (at most once per 60 ticks).

use log::debug;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Moving averages keep at most this many samples; the oldest is evicted
/// first when the window is full.
pub const AVERAGE_WINDOW: usize = 30;

// Stat names, registered in this order at startup.
pub const UPTIME: &str = "uptime";
pub const TICKS: &str = "ticks";
pub const CONNECTIONS: &str = "connections";
pub const DISCONNECTIONS: &str = "disconnections";
pub const CONNECTIONS_REJECTED: &str = "connections_rejected";
pub const BOGUS_MESSAGES: &str = "bogus_messages";
pub const TICK_MILLIS: &str = "tick_millis";
pub const MESSAGES_PER_TICK: &str = "messages_per_tick";
pub const BYTES_PER_TICK: &str = "bytes_per_tick";

/// One tracked statistic: plain data, no attached behavior.
#[derive(Debug, Clone)]
pub enum Stat {
    /// Monotonically non-decreasing count.
    Counter { value: u64, description: &'static str },
    /// Sliding window of the most recent samples, oldest evicted first.
    Average {
        samples: VecDeque<f64>,
        description: &'static str,
    },
    /// An instant to measure elapsed time against.
    Timer {
        started: Instant,
        description: &'static str,
    },
}

/// A stat's current value, as published to subscribers.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum SnapshotValue {
    Count(u64),
    Mean(f64),
    Elapsed(String),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SnapshotEntry {
    pub name: String,
    pub description: String,
    pub value: SnapshotValue,
}

/// Flat point-in-time copy of every tracked stat.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatsSnapshot {
    pub entries: Vec<SnapshotEntry>,
}

/// Formats an elapsed duration as days/hours/mins/secs, largest non-zero
/// unit first, zero units omitted, singular names at exactly 1.
///
/// Falls back to `"0 secs"` when everything rounds to zero.
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let units = [
        (total / 86_400, "day", "days"),
        (total / 3_600 % 24, "hour", "hours"),
        (total / 60 % 60, "min", "mins"),
        (total % 60, "sec", "secs"),
    ];

    let parts: Vec<String> = units
        .iter()
        .filter(|(value, _, _)| *value > 0)
        .map(|(value, singular, plural)| {
            format!("{} {}", value, if *value == 1 { singular } else { plural })
        })
        .collect();

    if parts.is_empty() {
        "0 secs".to_string()
    } else {
        parts.join(" ")
    }
}

/// Current value of a stat, polymorphic over the closed variant.
pub fn current_value(stat: &Stat) -> SnapshotValue {
    match stat {
        Stat::Counter { value, .. } => SnapshotValue::Count(*value),
        Stat::Average { samples, .. } => {
            let mean = if samples.is_empty() {
                0.0
            } else {
                samples.iter().sum::<f64>() / samples.len() as f64
            };
            SnapshotValue::Mean(mean)
        }
        Stat::Timer { started, .. } => SnapshotValue::Elapsed(format_duration(started.elapsed())),
    }
}

fn description(stat: &Stat) -> &'static str {
    match stat {
        Stat::Counter { description, .. }
        | Stat::Average { description, .. }
        | Stat::Timer { description, .. } => description,
    }
}

/// Registry of every named stat plus the snapshot subscribers.
pub struct Stats {
    entries: Vec<(&'static str, Stat)>,
    subscribers: Vec<mpsc::UnboundedSender<StatsSnapshot>>,
}

impl Stats {
    /// Creates the full process-lifetime stat set.
    pub fn new() -> Self {
        let now = Instant::now();
        let counter = |description| Stat::Counter {
            value: 0,
            description,
        };
        let average = |description| Stat::Average {
            samples: VecDeque::with_capacity(AVERAGE_WINDOW),
            description,
        };

        Self {
            entries: vec![
                (
                    UPTIME,
                    Stat::Timer {
                        started: now,
                        description: "time since server start",
                    },
                ),
                (TICKS, counter("simulation ticks completed")),
                (CONNECTIONS, counter("connections accepted")),
                (DISCONNECTIONS, counter("connections closed")),
                (
                    CONNECTIONS_REJECTED,
                    counter("connections rejected at capacity"),
                ),
                (BOGUS_MESSAGES, counter("malformed client messages")),
                (TICK_MILLIS, average("tick processing time (ms)")),
                (MESSAGES_PER_TICK, average("messages sent per tick")),
                (BYTES_PER_TICK, average("bytes sent per tick")),
            ],
            subscribers: Vec::new(),
        }
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Stat> {
        self.entries
            .iter_mut()
            .find(|(n, _)| *n == name)
            .map(|(_, stat)| stat)
    }

    fn get(&self, name: &str) -> Option<&Stat> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, stat)| stat)
    }

    /// Increments a counter by one. Unknown names are ignored.
    pub fn inc(&mut self, name: &str) {
        if let Some(Stat::Counter { value, .. }) = self.get_mut(name) {
            *value += 1;
        }
    }

    /// Pushes a sample into a bounded average, evicting the oldest sample
    /// once the window holds `AVERAGE_WINDOW` values.
    pub fn sample(&mut self, name: &str, sample: f64) {
        if let Some(Stat::Average { samples, .. }) = self.get_mut(name) {
            samples.push_back(sample);
            if samples.len() > AVERAGE_WINDOW {
                samples.pop_front();
            }
        }
    }

    /// Current counter value, zero for non-counters. Used by diagnostics
    /// and tests.
    pub fn counter(&self, name: &str) -> u64 {
        match self.get(name) {
            Some(Stat::Counter { value, .. }) => *value,
            _ => 0,
        }
    }

    /// Samples currently in an average's window, oldest first.
    pub fn window(&self, name: &str) -> Vec<f64> {
        match self.get(name) {
            Some(Stat::Average { samples, .. }) => samples.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// Builds a flat snapshot of every stat's current value.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            entries: self
                .entries
                .iter()
                .map(|(name, stat)| SnapshotEntry {
                    name: name.to_string(),
                    description: description(stat).to_string(),
                    value: current_value(stat),
                })
                .collect(),
        }
    }

    /// Registers a new snapshot subscriber. The subscriber receives one
    /// full snapshot per subsequent publish.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<StatsSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Pushes the current snapshot to every live subscriber, dropping any
    /// whose receiver has gone away.
    pub fn publish(&mut self) {
        if self.subscribers.is_empty() {
            return;
        }

        let snapshot = self.snapshot();
        self.subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
        debug!(
            "Published stats snapshot to {} subscriber(s)",
            self.subscribers.len()
        );
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}
