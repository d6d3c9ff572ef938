//! Connection registry and per-player world state
//!
//! The registry is the world: a player exists exactly as long as its
//! connection is registered. Two lock granularities are in play:
//! - one registry lock guarding the connection -> player map
//! - one lock per player guarding its mutable name and position
//!
//! The registry lock is never held while a player lock is taken.
//! [`ConnectionRegistry::snapshot`] copies the `Arc`s out and releases the
//! map before any player field is read, so readers walking a snapshot never
//! contend with registration and never invert the lock order.

use bytes::Bytes;
use log::info;
use parking_lot::Mutex;
use shared::SnapshotEntry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Opaque handle for one accepted transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Queue feeding the task that owns a connection's write half
pub type Outbound = mpsc::UnboundedSender<Bytes>;

/// Server side of a live connection
///
/// Frames pushed here are written by a dedicated writer task. The task
/// handles let the orchestrator stop both halves once the connection is
/// dropped, even if the peer has stopped reading and the writer is stuck.
#[derive(Debug)]
pub struct ConnectionLink {
    id: ConnectionId,
    outbound: Outbound,
    reader: Option<AbortHandle>,
    writer: Option<AbortHandle>,
}

impl ConnectionLink {
    pub fn new(id: ConnectionId, outbound: Outbound) -> Self {
        Self {
            id,
            outbound,
            reader: None,
            writer: None,
        }
    }

    pub fn with_reader(mut self, reader: AbortHandle) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn with_writer(mut self, writer: AbortHandle) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues an encoded frame; returns false once the writer has gone away
    pub fn send(&self, frame: Bytes) -> bool {
        self.outbound.send(frame).is_ok()
    }

    /// Stops both connection tasks; frames still queued are discarded
    pub fn close(&self) {
        for task in self.reader.iter().chain(self.writer.iter()) {
            task.abort();
        }
    }
}

/// Mutable public state of a player
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub name: String,
    pub x: f32,
    pub y: f32,
}

/// One active participant, bound to exactly one connection
#[derive(Debug)]
pub struct Player {
    id: u32,
    link: ConnectionLink,
    state: Mutex<PlayerState>,
}

impl Player {
    /// Creates a player at the origin with the generated name `Player<id>`
    pub fn new(id: u32, link: ConnectionLink) -> Self {
        Self {
            id,
            link,
            state: Mutex::new(PlayerState {
                name: format!("Player{}", id),
                x: 0.0,
                y: 0.0,
            }),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn connection(&self) -> ConnectionId {
        self.link.id()
    }

    pub fn link(&self) -> &ConnectionLink {
        &self.link
    }

    pub fn name(&self) -> String {
        self.state.lock().name.clone()
    }

    pub fn position(&self) -> (f32, f32) {
        let state = self.state.lock();
        (state.x, state.y)
    }

    /// Copies the whole state under one lock acquisition
    pub fn state(&self) -> PlayerState {
        self.state.lock().clone()
    }

    /// Updates the position; returns the name as it was at that instant
    pub fn move_to(&self, x: f32, y: f32) -> String {
        let mut state = self.state.lock();
        state.x = x;
        state.y = y;
        state.name.clone()
    }

    /// Replaces the display name and returns the previous one
    pub fn rename(&self, new_name: impl Into<String>) -> String {
        let mut state = self.state.lock();
        std::mem::replace(&mut state.name, new_name.into())
    }

    pub fn snapshot_entry(&self) -> SnapshotEntry {
        let state = self.state.lock();
        SnapshotEntry::new(self.id, state.name.clone(), state.x, state.y)
    }
}

/// Thread-safe map from live connections to their players
#[derive(Debug)]
pub struct ConnectionRegistry {
    players: Mutex<BTreeMap<ConnectionId, Arc<Player>>>,
    next_player_id: AtomicU32,
    next_connection_id: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            players: Mutex::new(BTreeMap::new()),
            next_player_id: AtomicU32::new(1),
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Hands out player identifiers; never reused while the server runs
    pub fn allocate_player_id(&self) -> u32 {
        self.next_player_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn allocate_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Adds a player under its connection handle
    ///
    /// Returns the entry it displaced, which only happens if a handle is
    /// registered twice.
    pub fn register(&self, player: Arc<Player>) -> Option<Arc<Player>> {
        let connection = player.connection();
        let id = player.id();
        let previous = self.players.lock().insert(connection, player);
        info!("Player {} registered on {}", id, connection);
        previous
    }

    /// Removes a connection's player; absent handles are a no-op
    pub fn unregister(&self, connection: ConnectionId) -> Option<Arc<Player>> {
        self.players.lock().remove(&connection)
    }

    pub fn lookup(&self, connection: ConnectionId) -> Option<Arc<Player>> {
        self.players.lock().get(&connection).cloned()
    }

    /// Point-in-time copy of every player, in connection order
    ///
    /// Only the `Arc`s are copied under the registry lock; player fields are
    /// read by the caller afterwards.
    pub fn snapshot(&self) -> Vec<Arc<Player>> {
        self.players.lock().values().cloned().collect()
    }

    /// Public state of every player, each copied under its own lock
    pub fn world_snapshot(&self) -> Vec<SnapshotEntry> {
        self.snapshot()
            .iter()
            .map(|player| player.snapshot_entry())
            .collect()
    }

    /// Empties the registry, returning every player that was in it
    pub fn drain(&self) -> Vec<Arc<Player>> {
        std::mem::take(&mut *self.players.lock())
            .into_values()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.players.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.lock().is_empty()
    }
}
