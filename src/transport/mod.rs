//! Root transports.
//!
//! A root transport is a [`Connection`](crate::Connection) with no parent:
//! it drives its own lifecycle from a real (or simulated) channel and is
//! the bottom of every cascade stack.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                    ┌─────────────────┐
//! │ WebSocketConnection  │     WebSocket      │                 │
//! │  (event loop task)   │◄──────────────────►│      Peer       │
//! │                      │                    │                 │
//! └──────────────────────┘                    └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `WebSocketConnection::connect` or `WebSocketListener::accept`
//! 2. Stack layers on the returned connection
//! 3. `WebSocketConnection::start` - event loop raises `open`
//! 4. Send and receive through the top layer
//! 5. `close()` on any layer closes the socket
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `listener` | WebSocket server binding and acceptance |
//! | `loopback` | In-memory transport driven by its owner |
//! | `websocket` | WebSocket connection and event loop |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket server binding and acceptance.
pub mod listener;

/// In-memory transport.
pub mod loopback;

/// WebSocket connection and event loop.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use listener::WebSocketListener;
pub use loopback::LoopbackConnection;
pub use websocket::{
    DEFAULT_CLOSE_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, Payload, WebSocketConnection,
    WebSocketOptions, parse_ws_url,
};
