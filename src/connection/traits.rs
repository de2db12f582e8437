//! The connection capability contract.
//!
//! Every connection, from a root transport up to the top-most layer,
//! implements [`Connection`]. Implementations supply the two hooks
//! (`request_send`, `request_close`) and a [`Lifecycle`]; the final API
//! (`send`, `close`, `on`, `off`, `state`) is provided and gated by the
//! lifecycle.
//!
//! # Example
//!
//! ```ignore
//! struct Stdout {
//!     lifecycle: Lifecycle<String>,
//! }
//!
//! impl Connection for Stdout {
//!     type Message = String;
//!
//!     fn lifecycle(&self) -> &Lifecycle<String> {
//!         &self.lifecycle
//!     }
//!
//!     fn request_send(&self, data: String) -> Result<()> {
//!         println!("{data}");
//!         Ok(())
//!     }
//!
//!     fn request_close(&self) {
//!         self.lifecycle.signal_close();
//!     }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use crate::error::Result;
use crate::identifiers::{ConnectionId, ListenerId};

use super::event::{ConnectionEvent, EventKind};
use super::lifecycle::Lifecycle;
use super::state::ConnectionState;

// ============================================================================
// RawClose
// ============================================================================

/// Optional capability to tear down the underlying channel directly.
///
/// A layer closing its parent prefers this over the parent's `close()`. The
/// parent does not pass through `closing`; it reaches `closed` when the
/// channel reports the close.
pub trait RawClose: Send + Sync {
    /// Closes the underlying channel immediately.
    fn raw_close(&self);
}

// ============================================================================
// Connection
// ============================================================================

/// A bidirectional message channel with a uniform lifecycle.
pub trait Connection: Send + Sync + 'static {
    /// Message type carried in both directions at this level.
    type Message: Send + Sync + 'static;

    /// Returns the lifecycle backing this connection.
    fn lifecycle(&self) -> &Lifecycle<Self::Message>;

    /// Send hook. Only invoked in `opened`.
    ///
    /// # Errors
    ///
    /// Implementation-defined; returned unchanged from [`Connection::send`].
    fn request_send(&self, data: Self::Message) -> Result<()>;

    /// Close hook. Invoked once, on entering `closing`.
    ///
    /// Must tear down the channel and eventually raise the close (or error)
    /// signal on the lifecycle.
    fn request_close(&self);

    /// Returns the raw-close capability, if this connection has one.
    fn as_raw_close(&self) -> Option<&dyn RawClose> {
        None
    }

    // ========================================================================
    // Final API
    // ========================================================================

    /// Returns the connection ID.
    fn id(&self) -> ConnectionId {
        self.lifecycle().id()
    }

    /// Returns the current state.
    fn state(&self) -> ConnectionState {
        self.lifecycle().state()
    }

    /// Sends `data`.
    ///
    /// Dropped silently unless `opened`.
    ///
    /// # Errors
    ///
    /// Whatever the send hook returns.
    fn send(&self, data: Self::Message) -> Result<()> {
        if self.lifecycle().begin_send() {
            self.request_send(data)
        } else {
            Ok(())
        }
    }

    /// Requests the connection to close.
    ///
    /// Only effective in `opening` and `opened`; the `close` event marks the
    /// actual end of the connection.
    fn close(&self) {
        if self.lifecycle().begin_close() {
            self.request_close();
        }
    }

    /// Registers `listener` for events of `kind`.
    fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        Self: Sized,
        F: Fn(&ConnectionEvent<Self::Message>) + Send + Sync + 'static,
    {
        self.lifecycle().on(kind, listener)
    }

    /// Registers `listener` for every event kind.
    fn on_all<F>(&self, listener: F) -> ListenerId
    where
        Self: Sized,
        F: Fn(&ConnectionEvent<Self::Message>) + Send + Sync + 'static,
    {
        self.lifecycle().on_all(listener)
    }

    /// Removes a listener. Returns `false` if it was not registered.
    fn off(&self, id: ListenerId) -> bool {
        self.lifecycle().off(id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use crate::error::Error;

    /// Minimal connection counting hook invocations.
    #[derive(Default)]
    struct Counting {
        lifecycle: Lifecycle<String>,
        sent: Mutex<Vec<String>>,
        close_requests: AtomicUsize,
    }

    impl Connection for Counting {
        type Message = String;

        fn lifecycle(&self) -> &Lifecycle<String> {
            &self.lifecycle
        }

        fn request_send(&self, data: String) -> Result<()> {
            if data.is_empty() {
                return Err(Error::transform("counting", "empty payload"));
            }
            self.sent.lock().push(data);
            Ok(())
        }

        fn request_close(&self) {
            self.close_requests.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_send_before_open_is_silent() {
        let conn = Counting::default();
        assert!(conn.send("early".to_string()).is_ok());
        assert!(conn.sent.lock().is_empty());
    }

    #[test]
    fn test_send_when_opened_reaches_hook() {
        let conn = Counting::default();
        conn.lifecycle().signal_open();
        conn.send("hello".to_string()).unwrap();
        assert_eq!(*conn.sent.lock(), ["hello"]);
    }

    #[test]
    fn test_send_hook_error_propagates() {
        let conn = Counting::default();
        conn.lifecycle().signal_open();
        let err = conn.send(String::new()).unwrap_err();
        assert!(err.is_protocol_error());
        assert_eq!(conn.state(), ConnectionState::Opened);
    }

    #[test]
    fn test_close_twice_invokes_hook_once() {
        let conn = Counting::default();
        conn.close();
        conn.close();
        assert_eq!(conn.close_requests.load(Ordering::SeqCst), 1);
        assert_eq!(conn.state(), ConnectionState::Closing);
    }

    #[test]
    fn test_send_while_closing_is_dropped() {
        let conn = Counting::default();
        conn.lifecycle().signal_open();
        conn.close();
        conn.send("late".to_string()).unwrap();
        assert!(conn.sent.lock().is_empty());
    }

    #[test]
    fn test_on_and_off() {
        let conn = Counting::default();
        let opens = Arc::new(AtomicUsize::new(0));
        let opens_clone = Arc::clone(&opens);

        let id = conn.on(EventKind::Open, move |_| {
            opens_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert!(conn.off(id));

        conn.lifecycle().signal_open();
        assert_eq!(opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_raw_close_by_default() {
        let conn = Counting::default();
        assert!(conn.as_raw_close().is_none());
    }
}
