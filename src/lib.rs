//! Layered Connection - connection lifecycle with stackable protocol layers.
//!
//! This library models a bidirectional message channel as a small state
//! machine with a uniform event surface, and lets protocol layers be stacked
//! on top of one another, each one itself a connection.
//!
//! # Architecture
//!
//! ```text
//! application ◄──► JsonLayer ◄──► TextLayer ◄──► WebSocketConnection ◄──► peer
//!                 (cascade)      (cascade)       (root transport)
//! ```
//!
//! Key design principles:
//!
//! - Every connection moves `opening → opened → closing → closed`, with
//!   `closed` terminal
//! - Commands (`send`, `close`) are silently ignored in states that do not
//!   accept them
//! - State is committed before listeners run, so listeners may call back
//!   into the connection
//! - Parent events drive cascades; closing a cascade never closes its
//!   parent implicitly unless the layer asks for it
//!
//! # Quick Start
//!
//! ```no_run
//! use layered_connection::layers::{JsonLayer, TextLayer};
//! use layered_connection::transport::{WebSocketConnection, WebSocketOptions};
//! use layered_connection::{CascadeExt, Connection, EventKind, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let ws = WebSocketConnection::connect("ws://127.0.0.1:9000", WebSocketOptions::new()).await?;
//!     let json = ws
//!         .stack(TextLayer::new())?
//!         .stack(JsonLayer::<serde_json::Value>::new())?;
//!
//!     json.on(EventKind::Message, |event| println!("{:?}", event.message()));
//!     ws.start();
//!
//!     json.send(serde_json::json!({ "hello": "world" }))?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cascade`] | [`CascadeConnection`], [`Layer`], [`Inherit`] |
//! | [`connection`] | [`Connection`] trait, [`Lifecycle`], states and events |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Connection and listener IDs |
//! | [`layers`] | Stock text, line and JSON layers |
//! | [`transport`] | WebSocket and loopback root transports |

// ============================================================================
// Modules
// ============================================================================

/// Protocol layers stacked on a parent connection.
pub mod cascade;

/// Base connection abstraction.
///
/// Implement [`Connection`] and drive a [`Lifecycle`] to add a transport.
pub mod connection;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Stock protocol layers.
pub mod layers;

/// Root transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Cascade types
pub use cascade::{CascadeConnection, CascadeExt, FnLayer, Inherit, Layer, Passthrough};

// Connection types
pub use connection::{
    Connection, ConnectionEvent, ConnectionOptions, ConnectionState, EventKind, Lifecycle,
    Listener, RawClose,
};

// Error types
pub use error::{Error, ErrorCause, Result};

// Identifier types
pub use identifiers::{ConnectionId, ListenerId};
