//! Type-safe identifiers for connections and listeners.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`ConnectionId`] | Tags every log line emitted for one connection |
//! | [`ListenerId`] | Handle returned by a subscription, used to unsubscribe |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Counters
// ============================================================================

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates the next value from `counter`, skipping zero on wrap-around.
fn allocate(counter: &AtomicU64) -> NonZeroU64 {
    loop {
        let raw = counter.fetch_add(1, Ordering::Relaxed);
        if let Some(id) = NonZeroU64::new(raw) {
            return id;
        }
    }
}

// ============================================================================
// ConnectionId
// ============================================================================

/// Process-unique identifier of a connection (root transport or layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(NonZeroU64);

impl ConnectionId {
    /// Allocates a fresh connection ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(allocate(&NEXT_CONNECTION_ID))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// ListenerId
// ============================================================================

/// Handle to a registered event listener.
///
/// Returned by `on`/`on_all`; pass it to `off` to remove that listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(NonZeroU64);

impl ListenerId {
    /// Allocates a fresh listener ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(allocate(&NEXT_LISTENER_ID))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
