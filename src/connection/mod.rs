//! Base connection abstraction.
//!
//! A connection is a finite-state wrapper around any bidirectional message
//! channel. It exposes the same surface regardless of what sits underneath:
//!
//! - Events: `open`, `close`, `error`, `message`
//! - Commands: `send(data)`, `close()`
//!
//! # Lifecycle
//!
//! ```text
//! opening ──► opened ──► closing ──► closed
//!    │           │                     ▲
//!    └───────────┴─────────────────────┘
//! ```
//!
//! Concrete implementations drive the lifecycle through four internal
//! signals on [`Lifecycle`] and supply two hooks on [`Connection`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `emitter` | Fan-out listener registry |
//! | `event` | Event kinds and payloads |
//! | `lifecycle` | State machine plus listeners |
//! | `options` | Per-connection configuration |
//! | `state` | States and the transition table |
//! | `traits` | [`Connection`] and [`RawClose`] |

// ============================================================================
// Submodules
// ============================================================================

/// Fan-out listener registry.
pub mod emitter;

/// Event kinds and payloads.
pub mod event;

/// State machine plus listeners.
pub mod lifecycle;

/// Per-connection configuration.
pub mod options;

/// States and the transition table.
pub mod state;

/// The connection capability contract.
pub mod traits;

// ============================================================================
// Re-exports
// ============================================================================

pub use emitter::{EventEmitter, Listener};
pub use event::{ConnectionEvent, EventKind};
pub use lifecycle::Lifecycle;
pub use options::ConnectionOptions;
pub use state::ConnectionState;
pub use traits::{Connection, RawClose};
