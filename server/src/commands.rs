//! Text command parsing and execution
//!
//! Recognized commands are matched by prefix: `/move <x> <y>`,
//! `/name <newname>` and `/say <text>`. Everything a command sends has been
//! queued by the time [`CommandInterpreter::execute`] returns.

use crate::broadcast::Broadcaster;
use crate::registry::Player;
use log::debug;
use shared::Notice;
use thiserror::Error;

const MOVE_PREFIX: &str = "/move ";
const NAME_PREFIX: &str = "/name ";
const SAY_PREFIX: &str = "/say ";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Move { x: f32, y: f32 },
    Rename(String),
    Say(String),
    Unknown(String),
    /// Empty lines and empty renames; nothing happens
    Noop,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("bad /move format")]
    BadMove,
}

/// Strips one trailing `\n` and then one trailing `\r`
pub fn strip_line_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

impl Command {
    /// Parses one line with its terminator already stripped
    pub fn parse(line: &str) -> Result<Command, CommandError> {
        if line.is_empty() {
            return Ok(Command::Noop);
        }

        if let Some(args) = line.strip_prefix(MOVE_PREFIX) {
            let mut parts = args.split_whitespace();
            let x = parse_coordinate(parts.next())?;
            let y = parse_coordinate(parts.next())?;
            return Ok(Command::Move { x, y });
        }

        if let Some(name) = line.strip_prefix(NAME_PREFIX) {
            // A control character would split the player's snapshot line
            if name.is_empty() || name.chars().any(char::is_control) {
                return Ok(Command::Noop);
            }
            return Ok(Command::Rename(name.to_string()));
        }

        if let Some(text) = line.strip_prefix(SAY_PREFIX) {
            return Ok(Command::Say(text.to_string()));
        }

        Ok(Command::Unknown(line.to_string()))
    }
}

fn parse_coordinate(token: Option<&str>) -> Result<f32, CommandError> {
    token
        .and_then(|t| t.parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .ok_or(CommandError::BadMove)
}

/// Applies decoded payloads to the issuing player and the world
#[derive(Debug, Clone)]
pub struct CommandInterpreter {
    broadcaster: Broadcaster,
}

impl CommandInterpreter {
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self { broadcaster }
    }

    /// Interprets one raw payload from `player`
    pub fn handle_payload(&self, player: &Player, payload: &[u8]) {
        let text = String::from_utf8_lossy(payload);
        self.handle_line(player, strip_line_terminator(&text));
    }

    /// Interprets one line with its terminator already stripped
    pub fn handle_line(&self, player: &Player, line: &str) {
        match Command::parse(line) {
            Ok(command) => self.execute(player, command),
            Err(e) => {
                debug!("Player {} sent malformed command {:?}: {}", player.id(), line, e);
                self.broadcaster.send_to(player, &Notice::BadMove.to_string());
            }
        }
    }

    pub fn execute(&self, player: &Player, command: Command) {
        match command {
            Command::Move { x, y } => {
                let name = player.move_to(x, y);
                self.broadcaster.broadcast_except(
                    player.connection(),
                    &Notice::Moved { name, x, y }.to_string(),
                );
            }
            Command::Rename(new) => {
                let old = player.rename(new.clone());
                debug!("Player {} renamed from {} to {}", player.id(), old, new);
                self.broadcaster
                    .broadcast_except(player.connection(), &Notice::Renamed { old, new }.to_string());
            }
            Command::Say(text) => {
                let name = player.name();
                self.broadcaster
                    .broadcast_all(&Notice::Chat { name, text }.to_string());
            }
            Command::Unknown(line) => {
                debug!("Player {} sent unknown command {:?}", player.id(), line);
                self.broadcaster
                    .send_to(player, &Notice::UnknownCommand.to_string());
            }
            Command::Noop => {}
        }
    }
}
