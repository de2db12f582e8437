//! Cascade connections: protocol layers stacked on a parent connection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐  send ──► transform ──► parent.send
//! │  CascadeConnection   │
//! │  (Layer + Inherit)   │  parent event ──► signal ──► own event
//! └──────────┬───────────┘  parent message ──► detransform ──► message
//!            │ Arc<P>
//! ┌──────────▼───────────┐
//! │  parent Connection   │
//! └──────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | [`CascadeConnection`] and [`CascadeExt`] |
//! | `inherit` | Per-event inheritance switches |
//! | `layer` | [`Layer`] hooks, [`Passthrough`], [`FnLayer`] |

// ============================================================================
// Submodules
// ============================================================================

/// The cascade connection itself.
pub mod connection;

/// Per-event inheritance switches.
pub mod inherit;

/// Layer hooks and stock layers.
pub mod layer;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{CascadeConnection, CascadeExt};
pub use inherit::Inherit;
pub use layer::{FnLayer, Layer, Passthrough};
