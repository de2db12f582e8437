//! Stock protocol layers.
//!
//! | Layer | Parent message | Message |
//! |-------|----------------|---------|
//! | [`TextLayer`] | [`Payload`](crate::transport::Payload) | `String` |
//! | [`LineLayer`] | `String` | `Vec<String>` |
//! | [`JsonLayer`] | `String` | `T: Serialize + DeserializeOwned` |

// ============================================================================
// Submodules
// ============================================================================

/// Typed JSON documents.
pub mod json;

/// Newline-delimited framing.
pub mod lines;

/// Text frames over WebSocket payloads.
pub mod text;

// ============================================================================
// Re-exports
// ============================================================================

pub use json::JsonLayer;
pub use lines::{DEFAULT_MAX_LINE_LENGTH, LineLayer};
pub use text::TextLayer;
