//! # watchserve
//!
//! Hot-reload a TCP server's connection handler whenever a watched file
//! changes, without dropping or re-binding the listening socket.
//!
//! ## Overview
//!
//! `watchserve` is for long-running servers whose handler construction
//! depends on externally editable state (templates, configuration, compiled
//! assets) and that must stay reachable on the same address and port across
//! reloads. It coordinates three collaborators:
//!
//! - a file watcher that turns OS write notifications for one path into
//!   change events (at most one pending at a time),
//! - a rebuild callback you provide, which awaits the next change and
//!   installs a fresh handler,
//! - an accept loop that binds the socket exactly once and starts a new
//!   serve cycle against the rebuilt handler after every reload.
//!
//! Each serve cycle runs against the handler snapshot taken when it was
//! spawned, so a reload never swaps the handler out from under connections
//! that are already being served.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::net::SocketAddr;
//! use tokio::io::AsyncWriteExt;
//! use tokio::net::TcpStream;
//! use watchserve::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let server = WatchServer::new("greeting.txt")?;
//!     server
//!         .listen_and_serve("127.0.0.1:4000", |server: WatchServer| async move {
//!             // Blocks until the watched file changes. The channel is primed,
//!             // so the first call returns immediately and builds the initial
//!             // handler before any serving begins.
//!             let Some(path) = server.next_change().await else { return };
//!             let greeting = std::fs::read_to_string(&path).unwrap_or_default();
//!             server.set_handler(move |mut stream: TcpStream, _peer: SocketAddr| {
//!                 let greeting = greeting.clone();
//!                 async move {
//!                     let _ = stream.write_all(greeting.as_bytes()).await;
//!                 }
//!             });
//!         })
//!         .await
//! }
//! ```
//!
//! ## What it does not do
//!
//! There is no graceful shutdown: the server runs until the process exits or
//! the listening address cannot be bound. Rebuild failures are the callback's
//! own concern; until the next successful rebuild, connections are accepted
//! and closed without dispatch. A watched file that is deleted and recreated
//! is no longer watched.

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod notify;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{BoundServer, Handler, WatchServer};
    pub use crate::error::{Result, ServerError};
}
