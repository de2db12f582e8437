//! Which parent events a cascade inherits.
//!
//! # Example
//!
//! ```ignore
//! use layered_connection::Inherit;
//!
//! // A handshake layer that decides for itself when it is open.
//! let inherit = Inherit::all().without_open();
//! assert!(inherit.close && inherit.error && inherit.message);
//! ```

// ============================================================================
// Imports
// ============================================================================

use crate::connection::EventKind;

// ============================================================================
// Inherit
// ============================================================================

/// Per-event inheritance switches. All `true` by default.
///
/// A disabled event is no longer driven by the parent; the layer must raise
/// the corresponding signal itself through the cascade's lifecycle, or the
/// cascade silently drifts out of sync with its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Inherit {
    /// Parent `open` drives this connection's open signal.
    pub open: bool,
    /// Parent `close` drives this connection's close signal.
    pub close: bool,
    /// Parent `error` drives this connection's error signal.
    pub error: bool,
    /// Parent `message` is detransformed and drives the message signal.
    pub message: bool,
}

impl Default for Inherit {
    fn default() -> Self {
        Self::all()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl Inherit {
    /// Inherits every event.
    #[inline]
    #[must_use]
    pub const fn all() -> Self {
        Self {
            open: true,
            close: true,
            error: true,
            message: true,
        }
    }

    /// Inherits nothing.
    #[inline]
    #[must_use]
    pub const fn none() -> Self {
        Self {
            open: false,
            close: false,
            error: false,
            message: false,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl Inherit {
    /// Stops inheriting `open`.
    #[inline]
    #[must_use]
    pub const fn without_open(mut self) -> Self {
        self.open = false;
        self
    }

    /// Stops inheriting `close`.
    #[inline]
    #[must_use]
    pub const fn without_close(mut self) -> Self {
        self.close = false;
        self
    }

    /// Stops inheriting `error`.
    #[inline]
    #[must_use]
    pub const fn without_error(mut self) -> Self {
        self.error = false;
        self
    }

    /// Stops inheriting `message`.
    #[inline]
    #[must_use]
    pub const fn without_message(mut self) -> Self {
        self.message = false;
        self
    }
}

// ============================================================================
// Queries
// ============================================================================

impl Inherit {
    /// Returns whether `kind` is inherited.
    #[inline]
    #[must_use]
    pub const fn inherits(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Open => self.open,
            EventKind::Close => self.close,
            EventKind::Error => self.error,
            EventKind::Message => self.message,
        }
    }

    /// Returns `true` if every event is inherited.
    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.open && self.close && self.error && self.message
    }

    /// Event kinds that are not inherited, in declaration order.
    #[must_use]
    pub fn disabled(&self) -> Vec<EventKind> {
        EventKind::ALL
            .into_iter()
            .filter(|kind| !self.inherits(*kind))
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
