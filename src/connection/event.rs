//! Events observable on a connection.
//!
//! | Kind | Payload | Emitted when |
//! |------|---------|--------------|
//! | `open` | - | `opening` → `opened` |
//! | `close` | - | any state → `closed` |
//! | `error` | [`ErrorCause`] | `opening`/`opened` failed, right before `close` |
//! | `message` | `M` | data arrived while `opened` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::error::ErrorCause;

// ============================================================================
// EventKind
// ============================================================================

/// The four event kinds every connection exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// Connection opened.
    Open,
    /// Connection closed.
    Close,
    /// Connection failed.
    Error,
    /// Message received.
    Message,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 4] = [Self::Open, Self::Close, Self::Error, Self::Message];

    /// Lowercase event name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Error => "error",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ConnectionEvent
// ============================================================================

/// An event delivered to listeners.
///
/// Listeners receive it by reference, so a payload is never cloned for
/// fan-out.
#[derive(Debug, Clone)]
pub enum ConnectionEvent<M> {
    /// The connection opened.
    Open,
    /// The connection closed. Always the last event.
    Close,
    /// The connection failed with the given cause.
    Error(ErrorCause),
    /// A message arrived.
    Message(M),
}

impl<M> ConnectionEvent<M> {
    /// Returns the kind of this event.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Open => EventKind::Open,
            Self::Close => EventKind::Close,
            Self::Error(_) => EventKind::Error,
            Self::Message(_) => EventKind::Message,
        }
    }

    /// Returns the message payload, if this is a `message` event.
    #[inline]
    #[must_use]
    pub fn message(&self) -> Option<&M> {
        match self {
            Self::Message(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the cause, if this is an `error` event.
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<&ErrorCause> {
        match self {
            Self::Error(cause) => Some(cause),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::error::Error;

    #[test]
    fn test_event_kind() {
        assert_eq!(ConnectionEvent::<()>::Open.kind(), EventKind::Open);
        assert_eq!(ConnectionEvent::<()>::Close.kind(), EventKind::Close);
        assert_eq!(ConnectionEvent::Message(1).kind(), EventKind::Message);

        let cause = Arc::new(Error::ConnectionClosed);
        assert_eq!(ConnectionEvent::<()>::Error(cause).kind(), EventKind::Error);
    }

    #[test]
    fn test_accessors() {
        let event = ConnectionEvent::Message("hi");
        assert_eq!(event.message(), Some(&"hi"));
        assert!(event.error().is_none());

        let event = ConnectionEvent::<&str>::Error(Arc::new(Error::connection("boom")));
        assert!(event.message().is_none());
        assert_eq!(
            event.error().map(ToString::to_string).as_deref(),
            Some("Connection failed: boom")
        );
    }

    #[test]
    fn test_kind_names() {
        let names: Vec<_> = EventKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, ["open", "close", "error", "message"]);
    }
}
