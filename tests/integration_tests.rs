//! Integration tests for the world server
//!
//! These tests start a real server on an ephemeral loopback port and drive
//! it with raw protocol clients.

use client::connection::{self, FrameReader, FrameWriter};
use server::config::ServerConfig;
use server::error::ServerError;
use server::network::{Server, ShutdownHandle};
use server::registry::ConnectionRegistry;
use shared::{Snapshot, MAX_FRAME_LEN};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(3);

struct TestServer {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    registry: Arc<ConnectionRegistry>,
    task: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    async fn start(tick_rate: u32) -> Self {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap(), tick_rate);
        let server = Server::bind(config).await.expect("Failed to bind server");

        let addr = server.local_addr();
        let shutdown = server.shutdown_handle();
        let registry = server.registry();
        let task = tokio::spawn(server.run());

        TestServer {
            addr,
            shutdown,
            registry,
            task,
        }
    }

    /// Connects and consumes the welcome notice
    async fn join(&self) -> (TestClient, String) {
        let mut client = TestClient::connect(self.addr).await;
        let welcome = client.next_notice().await;
        let name = welcome
            .strip_prefix("WELCOME ")
            .and_then(|rest| rest.strip_suffix('\n'))
            .unwrap_or_else(|| panic!("Expected welcome, got {:?}", welcome))
            .to_string();
        (client, name)
    }

    async fn stop(self) {
        self.shutdown.stop();
        let result = timeout(WAIT, self.task)
            .await
            .expect("Server did not stop in time")
            .expect("Server task panicked");
        assert!(result.is_ok());
    }
}

struct TestClient {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let (reader, writer) = connection::connect(addr).await.expect("Failed to connect");
        TestClient { reader, writer }
    }

    async fn send(&mut self, line: &str) {
        self.writer.send_line(line).await.expect("Send failed");
    }

    /// Next payload of any kind, `None` once the server closed the stream
    async fn next_payload(&mut self) -> Option<String> {
        timeout(WAIT, self.reader.next_text())
            .await
            .expect("Timed out waiting for payload")
            .ok()
            .flatten()
    }

    /// Next payload that is not a tick snapshot
    async fn next_notice(&mut self) -> String {
        loop {
            let payload = self
                .next_payload()
                .await
                .expect("Connection closed while waiting for notice");
            if !Snapshot::is_snapshot(&payload) {
                return payload;
            }
        }
    }

    async fn next_snapshot_where(&mut self, pred: impl Fn(&Snapshot) -> bool) -> Snapshot {
        loop {
            let payload = self
                .next_payload()
                .await
                .expect("Connection closed while waiting for snapshot");
            if Snapshot::is_snapshot(&payload) {
                let snapshot: Snapshot = payload.parse().expect("Malformed snapshot");
                if pred(&snapshot) {
                    return snapshot;
                }
            }
        }
    }

    /// Reads until the server closes the connection
    async fn expect_closed(&mut self) {
        while self.next_payload().await.is_some() {}
    }
}

/// CONNECTION LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// Tests welcome and join notices on accept
    #[tokio::test]
    async fn welcome_and_join_notices() {
        let server = TestServer::start(20).await;

        let (mut a, name_a) = server.join().await;
        assert_eq!(name_a, "Player1");

        let (_b, name_b) = server.join().await;
        assert_eq!(name_b, "Player2");

        assert_eq!(a.next_notice().await, "Player2 has joined the world.\n");
        assert_eq!(server.registry.len(), 2);

        server.stop().await;
    }

    /// Tests that N connections yield N registry entries with distinct ids
    #[tokio::test]
    async fn many_connections_have_distinct_ids() {
        let server = TestServer::start(20).await;

        let mut clients = Vec::new();
        for i in 1..=8 {
            let (client, name) = server.join().await;
            assert_eq!(name, format!("Player{}", i));
            clients.push(client);
        }

        let snapshot = server.registry.snapshot();
        let ids: Vec<u32> = snapshot.iter().map(|p| p.id()).collect();
        assert_eq!(ids, (1..=8).collect::<Vec<u32>>());

        server.stop().await;
    }

    /// Tests leave notices and that dropped identifiers are never reused
    #[tokio::test]
    async fn disconnect_notifies_peers_and_ids_are_not_reused() {
        let server = TestServer::start(50).await;

        let (mut a, _) = server.join().await;
        let (b, _) = server.join().await;
        assert_eq!(a.next_notice().await, "Player2 has joined the world.\n");

        drop(b);
        assert_eq!(a.next_notice().await, "Player2 has left the world.\n");

        let (_c, name_c) = server.join().await;
        assert_eq!(name_c, "Player3");
        assert_eq!(a.next_notice().await, "Player3 has joined the world.\n");

        let snapshot = a
            .next_snapshot_where(|s| s.players.iter().any(|p| p.id == 3))
            .await;
        let ids: Vec<u32> = snapshot.players.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 3]);

        server.stop().await;
    }

    /// Tests that stopping the server closes every client connection
    #[tokio::test]
    async fn shutdown_closes_all_connections() {
        let server = TestServer::start(20).await;

        let (mut a, _) = server.join().await;
        let (mut b, _) = server.join().await;
        let registry = Arc::clone(&server.registry);

        server.stop().await;

        a.expect_closed().await;
        b.expect_closed().await;
        assert!(registry.is_empty());
    }

    /// Tests that the listener is released once the server has stopped
    #[tokio::test]
    async fn listener_is_closed_after_shutdown() {
        let server = TestServer::start(20).await;
        let addr = server.addr;
        let (_a, _) = server.join().await;

        server.stop().await;

        let result = tokio::net::TcpStream::connect(addr).await;
        assert!(result.is_err(), "listener still accepting after shutdown");
    }

    /// Tests that shutdown leaves no task behind for a peer that never reads
    #[tokio::test]
    async fn shutdown_with_silent_peer_leaves_no_tasks() {
        let server = TestServer::start(20).await;
        let (mut silent, _) = server.join().await;

        // Every /say is echoed back, filling the silent peer's socket buffers
        let line = format!("/say {}", "x".repeat(1024 * 1024));
        for _ in 0..64 {
            silent.send(&line).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;

        server.stop().await;

        let metrics = tokio::runtime::Handle::current().metrics();
        let drained = timeout(WAIT, async {
            while metrics.num_alive_tasks() > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(
            drained.is_ok(),
            "{} server tasks still alive after shutdown",
            metrics.num_alive_tasks()
        );
    }
}

/// COMMAND TESTS
mod command_tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// Tests that /move updates state and notifies everyone but the sender
    #[tokio::test]
    async fn move_notifies_others_only() {
        let server = TestServer::start(20).await;

        let (mut a, _) = server.join().await;
        let (mut b, _) = server.join().await;
        let (mut c, _) = server.join().await;
        a.next_notice().await;
        a.next_notice().await;
        b.next_notice().await;

        a.send("/move 3.5 -2.0").await;
        assert_eq!(b.next_notice().await, "Player1 moved to 3.5,-2\n");
        assert_eq!(c.next_notice().await, "Player1 moved to 3.5,-2\n");

        let player = server.registry.snapshot()[0].clone();
        let (x, y) = player.position();
        assert_approx_eq!(x, 3.5);
        assert_approx_eq!(y, -2.0);

        // The sender's next notice is its own chat line, not a move echo
        a.send("/say done").await;
        assert_eq!(a.next_notice().await, "Player1: done\n");

        server.stop().await;
    }

    /// Tests that a malformed /move only produces an error for the sender
    #[tokio::test]
    async fn bad_move_replies_to_sender_only() {
        let server = TestServer::start(20).await;

        let (mut a, _) = server.join().await;
        let (mut b, _) = server.join().await;
        a.next_notice().await;

        a.send("/move abc 1").await;
        assert_eq!(a.next_notice().await, "ERROR bad /move format\n");

        // b's next notice is the chat line, proving nothing was broadcast
        a.send("/say after").await;
        assert_eq!(b.next_notice().await, "Player1: after\n");
        assert_eq!(server.registry.snapshot()[0].position(), (0.0, 0.0));

        server.stop().await;
    }

    /// Tests rename broadcasts and /say reaching the sender
    #[tokio::test]
    async fn rename_then_say() {
        let server = TestServer::start(20).await;

        let (mut a, _) = server.join().await;
        let (mut b, _) = server.join().await;
        a.next_notice().await;

        a.send("/name A").await;
        assert_eq!(b.next_notice().await, "Player1 is now A\n");

        a.send("/say hi").await;
        assert_eq!(a.next_notice().await, "A: hi\n");
        assert_eq!(b.next_notice().await, "A: hi\n");

        server.stop().await;
    }

    /// Tests the unknown command reply and silent empty lines
    #[tokio::test]
    async fn unknown_and_empty_commands() {
        let server = TestServer::start(20).await;
        let (mut a, _) = server.join().await;

        a.send("").await;
        a.send("/dance").await;
        assert_eq!(a.next_notice().await, "UNKNOWN_CMD\n");

        server.stop().await;
    }
}

/// TICK AND FRAMING TESTS
mod tick_tests {
    use super::*;

    /// Tests that snapshots reflect live player state
    #[tokio::test]
    async fn snapshot_reflects_moves_and_names() {
        let server = TestServer::start(50).await;

        let (mut a, _) = server.join().await;
        let (mut b, _) = server.join().await;
        a.next_notice().await;

        a.send("/name A").await;
        b.send("/move 1 1").await;
        b.send("/name B").await;

        let snapshot = a
            .next_snapshot_where(|s| {
                s.players.len() == 2 && s.players[1].name == "B" && s.players[0].name == "A"
            })
            .await;
        assert_eq!(snapshot.to_string(), "SNAP\n1 A 0 0\n2 B 1 1\n");

        server.stop().await;
    }

    /// Tests that snapshots keep arriving at roughly the tick rate
    #[tokio::test]
    async fn snapshots_arrive_periodically() {
        let server = TestServer::start(50).await;
        let (mut a, _) = server.join().await;

        let start = tokio::time::Instant::now();
        for _ in 0..5 {
            a.next_snapshot_where(|_| true).await;
        }
        // Five 20ms ticks; generous upper bound for loaded CI machines
        assert!(start.elapsed() < Duration::from_secs(2));

        server.stop().await;
    }

    /// Tests reassembly of frames split across many writes
    #[tokio::test]
    async fn byte_at_a_time_frames_are_reassembled() {
        let server = TestServer::start(20).await;
        let (mut a, _) = server.join().await;

        let mut bytes = shared::encode_frame(b"/say one\n").unwrap().to_vec();
        bytes.extend_from_slice(&shared::encode_frame(b"/say two\r\n").unwrap());
        for byte in &bytes {
            a.writer.send_raw(&[*byte]).await.unwrap();
        }

        assert_eq!(a.next_notice().await, "Player1: one\n");
        assert_eq!(a.next_notice().await, "Player1: two\n");

        server.stop().await;
    }

    /// Tests that an oversized frame drops only the offending connection
    #[tokio::test]
    async fn oversized_frame_drops_connection() {
        let server = TestServer::start(20).await;

        let (mut a, _) = server.join().await;
        let (mut b, _) = server.join().await;
        a.next_notice().await;

        let header = (MAX_FRAME_LEN as u32 + 1).to_be_bytes();
        a.writer.send_raw(&header).await.unwrap();

        assert_eq!(b.next_notice().await, "Player1 has left the world.\n");
        a.expect_closed().await;
        assert_eq!(server.registry.len(), 1);

        // The survivor is unaffected
        b.send("/say still here").await;
        assert_eq!(b.next_notice().await, "Player2: still here\n");

        server.stop().await;
    }
}
