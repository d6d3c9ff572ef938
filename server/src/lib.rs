//! # World Server Library
//!
//! This library provides the authoritative session server for a small shared
//! 2D world. Clients connect over TCP, issue text commands, and receive an
//! authoritative snapshot of every player at a fixed tick rate.
//!
//! ## Core Responsibilities
//!
//! ### Connection Management
//! Every accepted connection gets exactly one player. The player lives as
//! long as the connection is registered and its identifier is never reused
//! while the server runs. Connections are dropped on orderly close, read
//! errors, or framing violations; the remaining players are told who left.
//!
//! ### Command Interpretation
//! Payloads are text lines. `/move <x> <y>`, `/name <newname>` and
//! `/say <text>` mutate the issuing player or chat with everyone; anything
//! else gets an `UNKNOWN_CMD` reply.
//!
//! ### State Broadcasting
//! On every tick the server copies each player's public state and sends a
//! `SNAP` payload to all connections. Ticks follow a fixed virtual clock, so
//! a stalled loop catches up instead of drifting.
//!
//! ## Architecture Design
//!
//! ### Single Orchestrator Task
//! One task owns the listener and multiplexes accepts, inbound frames, tick
//! deadlines and the stop signal. Reader tasks only decode frames and
//! forward them; writer tasks only drain outbound queues. All commands are
//! applied on the orchestrator, in arrival order per connection.
//!
//! ### Two Lock Granularities
//! The [`registry::ConnectionRegistry`] guards its map with one lock, and
//! each [`registry::Player`] guards its own name and position. The map lock
//! is never held while a player lock is taken.
//!
//! ## Module Organization
//!
//! - [`registry`]: connection to player map and per-player state
//! - [`commands`]: command parsing and execution
//! - [`broadcast`]: fan-out to all or all-but-one connection
//! - [`tick`]: fixed-rate scheduler and snapshot broadcast
//! - [`network`]: listener, connection tasks and the orchestrator loop
//! - [`config`] / [`error`]: startup settings and error types
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!
//!     let shutdown = server.shutdown_handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.stop();
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod commands;
pub mod config;
pub mod error;
pub mod network;
pub mod registry;
pub mod tick;
