//! # World Client Library
//!
//! A line-oriented test client for the world server. It speaks the same
//! length-prefixed text protocol as the server and is mostly useful for
//! poking at a running server by hand:
//!
//! - every payload received is printed prefixed with `[SERVER] `
//! - every line typed on stdin is sent as one frame with a trailing `\n`
//! - `/quit` ends the session
//!
//! ## Module Organization
//!
//! ### Connection Module (`connection`)
//! Framed reader and writer halves over a TCP stream, built on the shared
//! codec. Integration tests drive the server through these directly.
//!
//! ### Network Module (`network`)
//! The interactive session: a printer task for inbound payloads and a stdin
//! reader feeding outbound lines.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::connection;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let (mut reader, mut writer) = connection::connect("127.0.0.1:5182").await?;
//!
//!     println!("{:?}", reader.next_text().await?); // WELCOME Player1
//!     writer.send_line("/say hello").await?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod network;
