//! Fan-out of text payloads to registered connections
//!
//! Sends are best effort: a recipient whose writer has gone away silently
//! misses the message, and nothing is retried or reported to the caller.
//! The read path is what eventually drops such a connection.

use crate::registry::{ConnectionId, ConnectionRegistry, Player};
use log::{debug, warn};
use shared::encode_frame;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Sends to every registered connection, the originator included
    pub fn broadcast_all(&self, payload: &str) {
        self.fan_out(None, payload);
    }

    /// Sends to every registered connection except `excluded`
    pub fn broadcast_except(&self, excluded: ConnectionId, payload: &str) {
        self.fan_out(Some(excluded), payload);
    }

    /// Sends to a single player
    pub fn send_to(&self, player: &Player, payload: &str) {
        let frame = match encode_frame(payload.as_bytes()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping outbound message for player {}: {}", player.id(), e);
                return;
            }
        };

        if !player.link().send(frame) {
            debug!("Send to player {} failed, writer closed", player.id());
        }
    }

    fn fan_out(&self, excluded: Option<ConnectionId>, payload: &str) {
        let frame = match encode_frame(payload.as_bytes()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping broadcast: {}", e);
                return;
            }
        };

        for player in self.registry.snapshot() {
            if Some(player.connection()) == excluded {
                continue;
            }

            // Bytes clones share the encoded buffer
            if !player.link().send(frame.clone()) {
                debug!("Broadcast to player {} failed, writer closed", player.id());
            }
        }
    }
}
