//! In-memory root transport.
//!
//! The owner of a [`LoopbackConnection`] plays the remote side: it raises
//! the internal signals with the `deliver_*` methods and inspects what the
//! layers above sent with [`LoopbackConnection::take_sent`].
//!
//! # Example
//!
//! ```ignore
//! let transport = Arc::new(LoopbackConnection::<String>::new().with_auto_close());
//! let app = transport.stack(Passthrough)?;
//!
//! transport.deliver_open();
//! app.send("ping".to_string())?;
//! assert_eq!(transport.take_sent(), ["ping"]);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::connection::{Connection, ConnectionOptions, Lifecycle, RawClose};
use crate::error::{ErrorCause, Result};

// ============================================================================
// LoopbackConnection
// ============================================================================

/// Root transport driven entirely by its owner.
pub struct LoopbackConnection<M> {
    lifecycle: Lifecycle<M>,
    /// Data accepted by the send hook, oldest first.
    sent: Mutex<Vec<M>>,
    /// Invocations of the close hook.
    close_requests: AtomicUsize,
    /// Invocations of raw close.
    raw_closes: AtomicUsize,
    /// Raise the close signal as soon as a close is requested.
    auto_close: bool,
    /// Offer the raw-close capability to layers above.
    raw_close: bool,
}

impl<M: Send + Sync + 'static> Default for LoopbackConnection<M> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// LoopbackConnection - Constructors
// ============================================================================

impl<M: Send + Sync + 'static> LoopbackConnection<M> {
    /// Creates a loopback transport in the `opening` state.
    #[must_use]
    pub fn new() -> Self {
        Self::from_lifecycle(Lifecycle::new(&ConnectionOptions::labeled("loopback")).unwrap_or_default())
    }

    /// Creates a loopback transport with custom options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if `options` fail
    /// validation.
    pub fn with_options(options: &ConnectionOptions) -> Result<Self> {
        Ok(Self::from_lifecycle(Lifecycle::new(options)?))
    }

    fn from_lifecycle(lifecycle: Lifecycle<M>) -> Self {
        Self {
            lifecycle,
            sent: Mutex::new(Vec::new()),
            close_requests: AtomicUsize::new(0),
            raw_closes: AtomicUsize::new(0),
            auto_close: false,
            raw_close: false,
        }
    }

    /// Closes immediately when a close is requested (normal or raw).
    #[inline]
    #[must_use]
    pub fn with_auto_close(mut self) -> Self {
        self.auto_close = true;
        self
    }

    /// Offers the raw-close capability to layers above.
    #[inline]
    #[must_use]
    pub fn with_raw_close(mut self) -> Self {
        self.raw_close = true;
        self
    }
}

// ============================================================================
// LoopbackConnection - Remote Side
// ============================================================================

impl<M: Send + Sync + 'static> LoopbackConnection<M> {
    /// Raises the open signal.
    pub fn deliver_open(&self) -> bool {
        self.lifecycle.signal_open()
    }

    /// Raises the message signal.
    pub fn deliver_message(&self, data: M) -> bool {
        self.lifecycle.signal_message(data)
    }

    /// Raises the error signal.
    pub fn deliver_error(&self, cause: impl Into<ErrorCause>) -> bool {
        self.lifecycle.signal_error(cause)
    }

    /// Raises the close signal.
    pub fn deliver_close(&self) -> bool {
        self.lifecycle.signal_close()
    }

    /// Drains everything sent so far.
    pub fn take_sent(&self) -> Vec<M> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Returns how many times the close hook ran.
    #[must_use]
    pub fn close_request_count(&self) -> usize {
        self.close_requests.load(Ordering::SeqCst)
    }

    /// Returns how many times raw close ran.
    #[must_use]
    pub fn raw_close_count(&self) -> usize {
        self.raw_closes.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Connection Implementation
// ============================================================================

impl<M: Send + Sync + 'static> Connection for LoopbackConnection<M> {
    type Message = M;

    fn lifecycle(&self) -> &Lifecycle<M> {
        &self.lifecycle
    }

    fn request_send(&self, data: M) -> Result<()> {
        self.sent.lock().push(data);
        Ok(())
    }

    fn request_close(&self) {
        self.close_requests.fetch_add(1, Ordering::SeqCst);
        if self.auto_close {
            self.lifecycle.signal_close();
        }
    }

    fn as_raw_close(&self) -> Option<&dyn RawClose> {
        self.raw_close.then_some(self as &dyn RawClose)
    }
}

impl<M: Send + Sync + 'static> RawClose for LoopbackConnection<M> {
    fn raw_close(&self) {
        self.raw_closes.fetch_add(1, Ordering::SeqCst);
        trace!(connection = %self.lifecycle.id(), "Loopback raw close");
        if self.auto_close {
            self.lifecycle.signal_close();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
