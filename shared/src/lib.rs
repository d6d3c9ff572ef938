//! Wire protocol shared by the world server and its clients
//!
//! Frames carry UTF-8 text. Clients send command lines such as `/move 1 2`;
//! the server answers with the [`Notice`] lines below and periodically with a
//! [`Snapshot`] of every live player.

pub mod codec;

pub use codec::{encode_frame, FrameDecoder, FrameError, HEADER_LEN};

use std::fmt;
use std::str::FromStr;

/// Largest payload either side will accept (10 MiB)
pub const MAX_FRAME_LEN: usize = 10 * 1024 * 1024;
pub const DEFAULT_PORT: u16 = 5182;
pub const DEFAULT_TICK_RATE: u32 = 20;

/// Header line that opens every snapshot payload
pub const SNAPSHOT_HEADER: &str = "SNAP";

/// Text notices sent from server to client, one line each
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Welcome { name: String },
    Joined { name: String },
    Left { name: String },
    Moved { name: String, x: f32, y: f32 },
    Renamed { old: String, new: String },
    Chat { name: String, text: String },
    BadMove,
    UnknownCommand,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Welcome { name } => writeln!(f, "WELCOME {}", name),
            Notice::Joined { name } => writeln!(f, "{} has joined the world.", name),
            Notice::Left { name } => writeln!(f, "{} has left the world.", name),
            Notice::Moved { name, x, y } => writeln!(f, "{} moved to {},{}", name, x, y),
            Notice::Renamed { old, new } => writeln!(f, "{} is now {}", old, new),
            Notice::Chat { name, text } => writeln!(f, "{}: {}", name, text),
            Notice::BadMove => writeln!(f, "ERROR bad /move format"),
            Notice::UnknownCommand => writeln!(f, "UNKNOWN_CMD"),
        }
    }
}

/// One player's public state as carried in a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub id: u32,
    pub name: String,
    pub x: f32,
    pub y: f32,
}

impl SnapshotEntry {
    pub fn new(id: u32, name: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            id,
            name: name.into(),
            x,
            y,
        }
    }
}

/// Authoritative world state broadcast once per tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub players: Vec<SnapshotEntry>,
}

impl Snapshot {
    pub fn new(players: Vec<SnapshotEntry>) -> Self {
        Self { players }
    }

    /// Returns true if the payload text is a snapshot rather than a notice
    pub fn is_snapshot(payload: &str) -> bool {
        payload
            .lines()
            .next()
            .map_or(false, |line| line == SNAPSHOT_HEADER)
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", SNAPSHOT_HEADER)?;
        for p in &self.players {
            writeln!(f, "{} {} {} {}", p.id, p.name, p.x, p.y)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed snapshot: {0}")]
pub struct SnapshotParseError(pub String);

impl FromStr for Snapshot {
    type Err = SnapshotParseError;

    /// Parses a snapshot payload; names may contain spaces, so the id is the
    /// first token and the coordinates are the last two.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lines = s.lines();
        if lines.next() != Some(SNAPSHOT_HEADER) {
            return Err(SnapshotParseError("missing header".to_string()));
        }

        let mut players = Vec::new();
        for line in lines {
            let bad = || SnapshotParseError(format!("bad line {:?}", line));

            let (id, rest) = line.split_once(' ').ok_or_else(bad)?;
            let (rest, y) = rest.rsplit_once(' ').ok_or_else(bad)?;
            let (name, x) = rest.rsplit_once(' ').ok_or_else(bad)?;

            players.push(SnapshotEntry {
                id: id.parse().map_err(|_| bad())?,
                name: name.to_string(),
                x: x.parse().map_err(|_| bad())?,
                y: y.parse().map_err(|_| bad())?,
            });
        }

        Ok(Snapshot { players })
    }
}
