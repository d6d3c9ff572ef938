use crate::connection::{self, FrameReader, FrameWriter};
use log::{debug, info, warn};
use shared::Snapshot;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;

/// Line typed by the user that ends the session
pub const QUIT_COMMAND: &str = "/quit";

/// Formats a received payload for the terminal
///
/// Returns `None` when the payload should not be shown.
pub fn format_server_message(payload: &str, hide_snapshots: bool) -> Option<String> {
    if hide_snapshots && Snapshot::is_snapshot(payload) {
        return None;
    }

    let mut out = format!("[SERVER] {}", payload);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    Some(out)
}

/// Interactive session: stdin lines go out, server payloads get printed
pub struct Client {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    hide_snapshots: bool,
}

impl Client {
    pub async fn connect(
        server_addr: &str,
        hide_snapshots: bool,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let (reader, writer) = connection::connect(server_addr).await?;
        info!("Connected to server {}", server_addr);

        Ok(Client {
            reader,
            writer,
            hide_snapshots,
        })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let Client {
            mut reader,
            mut writer,
            hide_snapshots,
        } = self;

        let mut printer = tokio::spawn(async move {
            loop {
                match reader.next_text().await {
                    Ok(Some(payload)) => {
                        if let Some(text) = format_server_message(&payload, hide_snapshots) {
                            print!("{}", text);
                        }
                    }
                    Ok(None) => {
                        println!("Server closed connection.");
                        break;
                    }
                    Err(e) => {
                        warn!("Receive failed: {}", e);
                        println!("Server closed connection or error.");
                        break;
                    }
                }
            }
        });

        let mut lines = spawn_stdin_reader();
        println!("Type commands (/name, /say, /move x y). Type {} to exit.", QUIT_COMMAND);

        loop {
            tokio::select! {
                _ = &mut printer => break,
                line = lines.recv() => {
                    let Some(line) = line else { break };
                    if line == QUIT_COMMAND {
                        break;
                    }
                    if let Err(e) = writer.send_line(&line).await {
                        warn!("Send failed: {}", e);
                        println!("Send failed.");
                        break;
                    }
                }
            }
        }

        if let Err(e) = writer.shutdown().await {
            debug!("Shutdown after session end failed: {}", e);
        }
        printer.abort();
        println!("Disconnected.");

        Ok(())
    }
}

/// Reads stdin on a plain thread so exiting never waits on a pending read
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let trimmed = line.trim_end_matches(&['\r', '\n'][..]).to_string();
                    if tx.send(trimmed).is_err() {
                        break;
                    }
                }
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_notice() {
        assert_eq!(
            format_server_message("WELCOME Player1\n", false).as_deref(),
            Some("[SERVER] WELCOME Player1\n")
        );
    }

    #[test]
    fn test_format_adds_missing_newline() {
        assert_eq!(
            format_server_message("odd", false).as_deref(),
            Some("[SERVER] odd\n")
        );
    }

    #[test]
    fn test_snapshots_can_be_hidden() {
        let snapshot = "SNAP\n1 A 0 0\n";
        assert!(format_server_message(snapshot, true).is_none());
        assert_eq!(
            format_server_message(snapshot, false).as_deref(),
            Some("[SERVER] SNAP\n1 A 0 0\n")
        );
        assert!(format_server_message("A: hi\n", true).is_some());
    }
}
