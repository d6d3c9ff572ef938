//! Server network layer: connection I/O and the orchestrator loop
//!
//! One orchestrator task owns the listener and interleaves four event
//! sources in a single `select!` loop: the stop signal, the tick deadline,
//! new connections, and frames forwarded by per-connection reader tasks.
//! Every registry mutation and command driven by the network happens on
//! that task, so frames from one connection are applied in arrival order and
//! a drop is only processed after every frame that preceded it.

use crate::broadcast::Broadcaster;
use crate::commands::CommandInterpreter;
use crate::config::ServerConfig;
use crate::error::{DisconnectReason, ServerError};
use crate::registry::{ConnectionId, ConnectionLink, ConnectionRegistry, Player};
use crate::tick::{broadcast_snapshot, TickScheduler};
use bytes::Bytes;
use log::{debug, error, info, warn};
use shared::{FrameDecoder, Notice};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

const READ_BUFFER_SIZE: usize = 4096;
const STATS_INTERVAL_TICKS: u64 = 100;

/// Messages sent from connection tasks to the orchestrator loop
#[derive(Debug)]
pub enum ServerEvent {
    FrameReceived {
        connection: ConnectionId,
        payload: Bytes,
    },
    ConnectionLost {
        connection: ConnectionId,
        reason: DisconnectReason,
    },
}

/// Stops a running server from any thread or task
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    running: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn stop(&self) {
        self.running.send_replace(false);
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }
}

/// Authoritative world server
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Broadcaster,
    interpreter: CommandInterpreter,

    events_tx: mpsc::UnboundedSender<ServerEvent>,
    events_rx: mpsc::UnboundedReceiver<ServerEvent>,
    running_tx: Arc<watch::Sender<bool>>,
    running_rx: watch::Receiver<bool>,
}

impl Server {
    /// Validates the configuration and binds the listening socket
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let interpreter = CommandInterpreter::new(broadcaster.clone());

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (running_tx, running_rx) = watch::channel(true);

        Ok(Server {
            listener,
            local_addr,
            config,
            registry,
            broadcaster,
            interpreter,
            events_tx,
            events_rx,
            running_tx: Arc::new(running_tx),
            running_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running_tx),
        }
    }

    /// Runs until stopped, then closes every connection and the listener
    pub async fn run(mut self) -> Result<(), ServerError> {
        let mut scheduler = TickScheduler::new(self.config.tick_period(), Instant::now());
        info!(
            "Server started: {} ticks/s ({:?} period)",
            self.config.tick_rate,
            scheduler.period()
        );

        let result = loop {
            if !*self.running_rx.borrow_and_update() {
                info!("Stop requested, shutting down");
                break Ok(());
            }

            tokio::select! {
                biased;

                // Re-checked at the top of the loop
                _ = self.running_rx.changed() => {}

                tick = scheduler.wait() => {
                    broadcast_snapshot(&self.broadcaster);

                    if tick % STATS_INTERVAL_TICKS == 0 {
                        debug!("Tick {}: {} players", tick, self.registry.len());
                    }
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.accept_connection(stream, peer),
                    Err(e) if is_connection_error(&e) => {
                        warn!("Failed to accept connection: {}", e);
                    }
                    Err(e) => {
                        error!("Listener failed: {}", e);
                        break Err(ServerError::Listener(e));
                    }
                },

                // The server holds a sender, so the channel never closes
                Some(event) = self.events_rx.recv() => self.handle_event(event),
            }
        };

        self.close_all();
        drop(self.listener);
        info!("Server stopped");

        result
    }

    /// Wires a fresh stream to reader/writer tasks and registers its player
    fn accept_connection(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        let connection = self.registry.allocate_connection_id();
        let (read_half, write_half) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_loop(connection, write_half, outbound_rx));
        let reader = tokio::spawn(read_loop(connection, read_half, self.events_tx.clone()));

        let link = ConnectionLink::new(connection, outbound_tx)
            .with_reader(reader.abort_handle())
            .with_writer(writer.abort_handle());
        let player = Arc::new(Player::new(self.registry.allocate_player_id(), link));
        let name = player.name();

        info!("Player {} connected from {} ({})", player.id(), peer, connection);
        self.registry.register(Arc::clone(&player));

        self.broadcaster
            .send_to(&player, &Notice::Welcome { name: name.clone() }.to_string());
        self.broadcaster
            .broadcast_except(connection, &Notice::Joined { name }.to_string());
    }

    fn handle_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::FrameReceived {
                connection,
                payload,
            } => match self.registry.lookup(connection) {
                Some(player) => self.interpreter.handle_payload(&player, &payload),
                None => debug!("Ignoring frame from dropped {}", connection),
            },
            ServerEvent::ConnectionLost { connection, reason } => {
                self.drop_connection(connection, &reason);
            }
        }
    }

    /// Removes a connection and its player; dropping twice is a no-op
    fn drop_connection(&self, connection: ConnectionId, reason: &DisconnectReason) {
        let Some(player) = self.registry.unregister(connection) else {
            return;
        };
        player.link().close();

        if reason.is_error() {
            warn!("Dropping player {} ({}): {}", player.id(), connection, reason);
        } else {
            info!("Player {} disconnected ({})", player.id(), connection);
        }

        self.broadcaster
            .broadcast_all(&Notice::Left { name: player.name() }.to_string());
    }

    fn close_all(&self) {
        let players = self.registry.drain();
        for player in &players {
            player.link().close();
        }
        info!("Closed {} connections", players.len());
    }
}

/// Reads from one connection and forwards complete frames in order
///
/// Ends by reporting why the connection should be dropped. Frames that were
/// complete before a bad header are still forwarded first.
async fn read_loop(
    connection: ConnectionId,
    mut reader: OwnedReadHalf,
    events: mpsc::UnboundedSender<ServerEvent>,
) {
    let mut decoder = FrameDecoder::new();
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    let reason = loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break DisconnectReason::Closed,
            Ok(n) => {
                decoder.extend(&buffer[..n]);
                if let Err(reason) = forward_frames(connection, &mut decoder, &events) {
                    break reason;
                }
            }
            Err(e) if is_transient(&e) => continue,
            Err(e) => break DisconnectReason::Io(e),
        }
    };

    // Fails only once the orchestrator is gone, which means shutdown
    let _ = events.send(ServerEvent::ConnectionLost { connection, reason });
}

fn forward_frames(
    connection: ConnectionId,
    decoder: &mut FrameDecoder,
    events: &mpsc::UnboundedSender<ServerEvent>,
) -> Result<(), DisconnectReason> {
    while let Some(payload) = decoder.next_frame()? {
        let _ = events.send(ServerEvent::FrameReceived {
            connection,
            payload,
        });
    }
    Ok(())
}

/// Accept failures that concern one pending connection, not the listener
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
    )
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Drains a connection's outbound queue onto its socket
///
/// Write failures are logged and swallowed; the connection is only torn
/// down by the read side. A writer blocked on a peer that never reads is
/// aborted through its [`ConnectionLink`] when the connection is dropped.
async fn write_loop(
    connection: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            debug!("Send to {} failed: {}", connection, e);
        }
    }

    let _ = writer.shutdown().await;
}
