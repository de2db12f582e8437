//! Per-connection configuration.
//!
//! # Example
//!
//! ```ignore
//! use layered_connection::ConnectionOptions;
//!
//! let options = ConnectionOptions::new()
//!     .with_label("json")
//!     .with_max_dispatch_depth(8);
//! options.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default label for connections that were not given one.
pub const DEFAULT_LABEL: &str = "connection";

/// Default limit on synchronously nested `message` dispatches.
pub const DEFAULT_MAX_DISPATCH_DEPTH: usize = 32;

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Options shared by every connection kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Human-readable name attached to every log line.
    pub label: String,

    /// Maximum nesting of `message` dispatches on one connection.
    ///
    /// A listener that synchronously causes another `message` on the same
    /// connection (for example an in-memory echo) nests one level deeper.
    /// Deeper messages are dropped with a warning instead of recursing.
    pub max_dispatch_depth: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
            max_dispatch_depth: DEFAULT_MAX_DISPATCH_DEPTH,
        }
    }

    /// Creates default options with the given label.
    #[inline]
    #[must_use]
    pub fn labeled(label: impl Into<String>) -> Self {
        Self::new().with_label(label)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Sets the log label.
    #[inline]
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the maximum nested `message` dispatch depth.
    #[inline]
    #[must_use]
    pub fn with_max_dispatch_depth(mut self, depth: usize) -> Self {
        self.max_dispatch_depth = depth;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionOptions {
    /// Checks that the options are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the label is empty or the dispatch depth
    /// is zero.
    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(Error::config("Connection label must not be empty"));
        }

        if self.max_dispatch_depth == 0 {
            return Err(Error::config(
                "max_dispatch_depth must be at least 1, otherwise no message is ever delivered",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
