//! Fixed-rate snapshot scheduling
//!
//! The scheduler keeps a virtual clock: each fired tick moves the deadline
//! forward by exactly one period from the previous deadline, never from
//! "now". A stall therefore produces back-to-back catch-up ticks instead of
//! permanently shifting the cadence.

use crate::broadcast::Broadcaster;
use shared::Snapshot;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct TickScheduler {
    period: Duration,
    next_tick: Instant,
    ticks: u64,
}

impl TickScheduler {
    /// Creates a scheduler whose first tick is due at `start`
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            next_tick: start,
            ticks: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn next_deadline(&self) -> Instant {
        self.next_tick
    }

    /// Number of ticks fired so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_tick
    }

    /// Records a fired tick and schedules the next one a period later
    pub fn advance(&mut self) -> u64 {
        self.next_tick += self.period;
        self.ticks += 1;
        self.ticks
    }

    /// Waits until the next deadline, then advances past it
    ///
    /// Returns immediately while catching up on overdue ticks.
    pub async fn wait(&mut self) -> u64 {
        tokio::time::sleep_until(self.next_tick).await;
        self.advance()
    }
}

/// Builds the snapshot payload and sends it to every connection
pub fn broadcast_snapshot(broadcaster: &Broadcaster) -> Snapshot {
    let snapshot = Snapshot::new(broadcaster.registry().world_snapshot());
    broadcaster.broadcast_all(&snapshot.to_string());
    snapshot
}
