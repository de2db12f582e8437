//! Cascade connection: a connection layered on top of another.
//!
//! A [`CascadeConnection`] subscribes to its parent's events and re-raises
//! them as its own signals, subject to [`Inherit`]. Inbound messages pass
//! through [`Layer::detransform`], outbound ones through
//! [`Layer::request_send`]. Since a cascade is itself a [`Connection`],
//! cascades stack to any depth:
//!
//! ```text
//! transport ──► layer 1 ──► layer 2 ──► … ──► application
//! ```
//!
//! # Ownership
//!
//! The cascade holds an `Arc` to its parent; the listeners it registers on
//! the parent only hold a `Weak` back to the cascade. Dropping the cascade
//! removes those listeners. Closing propagates from parent to child only:
//! a cascade that closes itself (for example on a protocol violation)
//! leaves the parent running unless the layer closes it explicitly.

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::connection::{
    Connection, ConnectionEvent, ConnectionOptions, EventKind, Lifecycle,
};
use crate::error::{ErrorCause, Result};
use crate::identifiers::ListenerId;

use super::inherit::Inherit;
use super::layer::Layer;

// ============================================================================
// CascadeConnection
// ============================================================================

/// A connection built on a parent connection through a [`Layer`].
pub struct CascadeConnection<P, L>
where
    P: Connection,
    L: Layer<P>,
{
    /// The connection this one is built on.
    parent: Arc<P>,
    /// Message shaping hooks.
    layer: L,
    /// Which parent events drive this connection.
    inherit: Inherit,
    /// This connection's own state and listeners.
    lifecycle: Lifecycle<L::Message>,
    /// Listeners registered on the parent, removed on drop.
    subscriptions: Mutex<Vec<ListenerId>>,
}

// ============================================================================
// CascadeConnection - Constructors
// ============================================================================

impl<P, L> CascadeConnection<P, L>
where
    P: Connection,
    L: Layer<P>,
{
    /// Builds a cascade inheriting every parent event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the layer name is
    /// not a valid label.
    pub fn new(parent: Arc<P>, layer: L) -> Result<Arc<Self>> {
        Self::with_inherit(parent, layer, Inherit::all())
    }

    /// Builds a cascade with explicit inheritance switches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the layer name is
    /// not a valid label.
    pub fn with_inherit(parent: Arc<P>, layer: L, inherit: Inherit) -> Result<Arc<Self>> {
        let options = ConnectionOptions::labeled(layer.name());
        Self::with_options(parent, layer, inherit, &options)
    }

    /// Builds a cascade with explicit inheritance switches and options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if `options` fail
    /// validation.
    pub fn with_options(
        parent: Arc<P>,
        layer: L,
        inherit: Inherit,
        options: &ConnectionOptions,
    ) -> Result<Arc<Self>> {
        let lifecycle = Lifecycle::new(options)?;

        for kind in inherit.disabled() {
            debug!(
                connection = %lifecycle.id(),
                label = lifecycle.label(),
                %kind,
                "Event not inherited; layer must raise it itself"
            );
        }

        let cascade = Arc::new_cyclic(|weak: &Weak<Self>| {
            let subscriptions = Self::subscribe(&parent, weak, inherit);
            Self {
                parent,
                layer,
                inherit,
                lifecycle,
                subscriptions: Mutex::new(subscriptions),
            }
        });

        debug!(
            connection = %cascade.lifecycle.id(),
            label = cascade.lifecycle.label(),
            parent = %cascade.parent.id(),
            "Cascade attached"
        );

        Ok(cascade)
    }

    /// Registers the inherited listeners on `parent`.
    fn subscribe(parent: &Arc<P>, weak: &Weak<Self>, inherit: Inherit) -> Vec<ListenerId> {
        let mut ids = Vec::with_capacity(4);

        if inherit.error {
            let weak = weak.clone();
            ids.push(parent.on(EventKind::Error, move |event| {
                if let (Some(this), ConnectionEvent::Error(cause)) = (weak.upgrade(), event) {
                    this.lifecycle.signal_error(Arc::clone(cause));
                }
            }));
        }

        if inherit.close {
            let weak = weak.clone();
            ids.push(parent.on(EventKind::Close, move |_event| {
                if let Some(this) = weak.upgrade() {
                    this.lifecycle.signal_close();
                }
            }));
        }

        if inherit.open {
            let weak = weak.clone();
            ids.push(parent.on(EventKind::Open, move |_event| {
                if let Some(this) = weak.upgrade() {
                    this.lifecycle.signal_open();
                }
            }));
        }

        if inherit.message {
            let weak = weak.clone();
            ids.push(parent.on(EventKind::Message, move |event| {
                if let (Some(this), ConnectionEvent::Message(data)) = (weak.upgrade(), event) {
                    this.handle_parent_message(data);
                }
            }));
        }

        ids
    }
}

// ============================================================================
// CascadeConnection - Accessors
// ============================================================================

impl<P, L> CascadeConnection<P, L>
where
    P: Connection,
    L: Layer<P>,
{
    /// Returns the parent connection.
    #[inline]
    #[must_use]
    pub fn parent(&self) -> &Arc<P> {
        &self.parent
    }

    /// Returns the layer.
    #[inline]
    #[must_use]
    pub fn layer(&self) -> &L {
        &self.layer
    }

    /// Returns the inheritance switches.
    #[inline]
    #[must_use]
    pub fn inherit(&self) -> Inherit {
        self.inherit
    }

    /// Closes this layer because of a protocol violation.
    ///
    /// Emits `error` with `cause` then `close` (or only `close` if a close
    /// was already pending). The parent is left untouched.
    pub fn fail(&self, cause: impl Into<ErrorCause>) -> bool {
        self.lifecycle.signal_error(cause)
    }
}

// ============================================================================
// CascadeConnection - Inbound
// ============================================================================

impl<P, L> CascadeConnection<P, L>
where
    P: Connection,
    L: Layer<P>,
{
    /// Detransforms a parent message and raises it on this connection.
    fn handle_parent_message(&self, data: &P::Message) {
        match self.layer.detransform(data) {
            Ok(Some(message)) => {
                self.lifecycle.signal_message(message);
            }
            Ok(None) => {
                trace!(
                    connection = %self.lifecycle.id(),
                    label = self.lifecycle.label(),
                    "Parent message absorbed by layer"
                );
            }
            Err(e) => {
                warn!(
                    connection = %self.lifecycle.id(),
                    label = self.lifecycle.label(),
                    error = %e,
                    "Protocol violation"
                );
                self.lifecycle.signal_error(e);
            }
        }
    }
}

// ============================================================================
// Connection Implementation
// ============================================================================

impl<P, L> Connection for CascadeConnection<P, L>
where
    P: Connection,
    L: Layer<P>,
{
    type Message = L::Message;

    fn lifecycle(&self) -> &Lifecycle<L::Message> {
        &self.lifecycle
    }

    fn request_send(&self, data: L::Message) -> Result<()> {
        self.layer.request_send(&self.parent, data)
    }

    fn request_close(&self) {
        self.layer.request_close(&self.parent);
    }
}

impl<P, L> Drop for CascadeConnection<P, L>
where
    P: Connection,
    L: Layer<P>,
{
    fn drop(&mut self) {
        for id in self.subscriptions.get_mut().drain(..) {
            self.parent.off(id);
        }
        trace!(connection = %self.lifecycle.id(), "Cascade detached");
    }
}

// ============================================================================
// CascadeExt
// ============================================================================

/// Fluent stacking of layers.
///
/// ```ignore
/// let app = transport.stack(TextLayer::new())?.stack(JsonLayer::<Msg>::new())?;
/// ```
pub trait CascadeExt: Connection + Sized {
    /// Builds a cascade on `self` inheriting every event.
    ///
    /// # Errors
    ///
    /// See [`CascadeConnection::new`].
    fn stack<L: Layer<Self>>(self: &Arc<Self>, layer: L) -> Result<Arc<CascadeConnection<Self, L>>> {
        CascadeConnection::new(Arc::clone(self), layer)
    }

    /// Builds a cascade on `self` with explicit inheritance switches.
    ///
    /// # Errors
    ///
    /// See [`CascadeConnection::with_inherit`].
    fn stack_with<L: Layer<Self>>(
        self: &Arc<Self>,
        layer: L,
        inherit: Inherit,
    ) -> Result<Arc<CascadeConnection<Self, L>>> {
        CascadeConnection::with_inherit(Arc::clone(self), layer, inherit)
    }
}

impl<C: Connection> CascadeExt for C {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::cascade::layer::{FnLayer, Passthrough};
    use crate::connection::ConnectionState;
    use crate::error::Error;
    use crate::transport::LoopbackConnection;

    type Parent = LoopbackConnection<String>;

    /// Records every event of a connection as a string.
    fn record<C>(conn: &C) -> Arc<Mutex<Vec<String>>>
    where
        C: Connection<Message = String>,
    {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        conn.on_all(move |event| {
            let entry = match event {
                ConnectionEvent::Open => "open".to_string(),
                ConnectionEvent::Close => "close".to_string(),
                ConnectionEvent::Error(cause) => format!("error:{cause}"),
                ConnectionEvent::Message(data) => format!("message:{data}"),
            };
            log_clone.lock().push(entry);
        });
        log
    }

    /// Upper-cases outbound data, lower-cases inbound data.
    fn case_layer() -> impl Layer<Parent, Message = String> {
        let layer: FnLayer<String, _, _> = FnLayer::new(
            |s: String| s.to_uppercase(),
            |s: &String| Some(s.to_lowercase()),
        );
        layer.named("case")
    }

    /// Drops inbound messages starting with `#`, rejects ones starting with `!`.
    struct Filter;

    impl Layer<Parent> for Filter {
        type Message = String;

        fn name(&self) -> &str {
            "filter"
        }

        fn transform(&self, data: String) -> Result<String> {
            Ok(data)
        }

        fn detransform(&self, data: &String) -> Result<Option<String>> {
            if data.starts_with('!') {
                return Err(Error::protocol("filter", format!("bad frame {data:?}")));
            }
            Ok((!data.starts_with('#')).then(|| data.clone()))
        }
    }

    #[test]
    fn test_transform_and_detransform_scenario() {
        let parent = Arc::new(Parent::new());
        let cascade = CascadeConnection::new(Arc::clone(&parent), case_layer()).unwrap();
        let log = record(&*cascade);

        parent.deliver_open();
        parent.deliver_message("X".to_string());
        assert_eq!(*log.lock(), ["open", "message:x"]);

        cascade.send("y".to_string()).unwrap();
        assert_eq!(parent.take_sent(), ["Y"]);
    }

    #[test]
    fn test_inherited_error_closes_cascade() {
        let parent = Arc::new(Parent::new());
        let cascade = CascadeConnection::new(Arc::clone(&parent), Passthrough).unwrap();
        let log = record(&*cascade);

        parent.deliver_open();
        parent.deliver_error(Error::connection("E"));

        assert_eq!(cascade.state(), ConnectionState::Closed);
        assert_eq!(*log.lock(), ["open", "error:Connection failed: E", "close"]);
    }

    #[test]
    fn test_error_cause_is_shared_not_copied() {
        let parent = Arc::new(Parent::new());
        let cascade = CascadeConnection::new(Arc::clone(&parent), Passthrough).unwrap();

        let parent_cause = Arc::new(Mutex::new(None));
        let child_cause = Arc::new(Mutex::new(None));
        {
            let slot = Arc::clone(&parent_cause);
            parent.on(EventKind::Error, move |e| *slot.lock() = e.error().cloned());
            let slot = Arc::clone(&child_cause);
            cascade.on(EventKind::Error, move |e| *slot.lock() = e.error().cloned());
        }

        parent.deliver_open();
        parent.deliver_error(Error::ConnectionClosed);

        let parent_cause = parent_cause.lock().clone().unwrap();
        let child_cause = child_cause.lock().clone().unwrap();
        assert!(Arc::ptr_eq(&parent_cause, &child_cause));
    }

    #[test]
    fn test_message_not_inherited() {
        let parent = Arc::new(Parent::new());
        let cascade = CascadeConnection::with_inherit(
            Arc::clone(&parent),
            Passthrough,
            Inherit::all().without_message(),
        )
        .unwrap();
        let log = record(&*cascade);

        parent.deliver_open();
        parent.deliver_message("ignored".to_string());

        assert_eq!(*log.lock(), ["open"]);
    }

    #[test]
    fn test_open_not_inherited_is_driven_manually() {
        let parent = Arc::new(Parent::new());
        let cascade = CascadeConnection::with_inherit(
            Arc::clone(&parent),
            Passthrough,
            Inherit::all().without_open(),
        )
        .unwrap();

        parent.deliver_open();
        assert_eq!(cascade.state(), ConnectionState::Opening);

        // Messages from the parent are ignored until the layer opens itself.
        parent.deliver_message("too early".to_string());
        let log = record(&*cascade);
        cascade.lifecycle().signal_open();
        parent.deliver_message("hello".to_string());

        assert_eq!(*log.lock(), ["open", "message:hello"]);
    }

    #[test]
    fn test_absent_detransform_emits_nothing() {
        let parent = Arc::new(Parent::new());
        let cascade = CascadeConnection::new(Arc::clone(&parent), Filter).unwrap();
        let log = record(&*cascade);

        parent.deliver_open();
        parent.deliver_message("#comment".to_string());
        parent.deliver_message("kept".to_string());

        assert_eq!(*log.lock(), ["open", "message:kept"]);
        assert_eq!(cascade.state(), ConnectionState::Opened);
    }

    #[test]
    fn test_protocol_violation_closes_only_the_layer() {
        let parent = Arc::new(Parent::new());
        let cascade = CascadeConnection::new(Arc::clone(&parent), Filter).unwrap();
        let log = record(&*cascade);

        parent.deliver_open();
        parent.deliver_message("!oops".to_string());

        assert_eq!(cascade.state(), ConnectionState::Closed);
        assert_eq!(parent.state(), ConnectionState::Opened);
        assert_eq!(log.lock().len(), 3);
        assert!(log.lock()[1].starts_with("error:Protocol error in filter"));
        assert_eq!(parent.close_request_count(), 0);
    }

    #[test]
    fn test_close_forwards_to_parent_close() {
        let parent = Arc::new(Parent::new().with_auto_close());
        let cascade = CascadeConnection::new(Arc::clone(&parent), Passthrough).unwrap();
        let log = record(&*cascade);

        parent.deliver_open();
        cascade.close();

        assert_eq!(parent.close_request_count(), 1);
        assert_eq!(parent.state(), ConnectionState::Closed);
        assert_eq!(cascade.state(), ConnectionState::Closed);
        assert_eq!(*log.lock(), ["open", "close"]);
    }

    #[test]
    fn test_close_prefers_parent_raw_close() {
        let parent = Arc::new(Parent::new().with_raw_close());
        let cascade = CascadeConnection::new(Arc::clone(&parent), Passthrough).unwrap();

        parent.deliver_open();
        cascade.close();

        assert_eq!(parent.raw_close_count(), 1);
        assert_eq!(parent.close_request_count(), 0);
        assert_eq!(cascade.state(), ConnectionState::Closing);

        parent.deliver_close();
        assert_eq!(cascade.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_send_dropped_unless_opened() {
        let parent = Arc::new(Parent::new());
        let cascade = CascadeConnection::new(Arc::clone(&parent), case_layer()).unwrap();

        cascade.send("before".to_string()).unwrap();
        parent.deliver_open();
        cascade.close();
        cascade.send("after".to_string()).unwrap();

        assert!(parent.take_sent().is_empty());
    }

    #[test]
    fn test_error_while_closing_suppresses_error_event() {
        // Raw close leaves the parent opened, so its error reaches the
        // cascade while the cascade is already closing.
        let parent = Arc::new(Parent::new().with_raw_close());
        let cascade = CascadeConnection::new(Arc::clone(&parent), Passthrough).unwrap();
        let parent_log = record(&*parent);
        let log = record(&*cascade);

        parent.deliver_open();
        cascade.close();
        parent.deliver_error(Error::connection("late"));

        assert_eq!(
            *parent_log.lock(),
            ["open", "error:Connection failed: late", "close"]
        );
        assert_eq!(*log.lock(), ["open", "close"]);
        assert_eq!(cascade.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_stacked_layers() {
        let parent = Arc::new(Parent::new());
        let first = parent.stack(case_layer()).unwrap();
        let brackets: FnLayer<String, _, _> = FnLayer::new(
            |s: String| format!("<{s}>"),
            |s: &String| Some(format!("[{s}]")),
        );
        let second = first.stack(brackets).unwrap();
        let log = record(&*second);

        parent.deliver_open();
        parent.deliver_message("ABC".to_string());
        second.send("z".to_string()).unwrap();

        assert_eq!(*log.lock(), ["open", "message:[abc]"]);
        assert_eq!(parent.take_sent(), ["<Z>"]);
        assert_eq!(first.state(), ConnectionState::Opened);
    }

    #[test]
    fn test_many_cascades_share_one_parent() {
        let parent = Arc::new(Parent::new());
        let a = CascadeConnection::new(Arc::clone(&parent), Passthrough).unwrap();
        let b = CascadeConnection::new(Arc::clone(&parent), case_layer()).unwrap();
        let log_a = record(&*a);
        let log_b = record(&*b);

        parent.deliver_open();
        parent.deliver_message("Hi".to_string());

        assert_eq!(*log_a.lock(), ["open", "message:Hi"]);
        assert_eq!(*log_b.lock(), ["open", "message:hi"]);
    }

    #[test]
    fn test_drop_unsubscribes_from_parent() {
        let parent = Arc::new(Parent::new());
        let cascade = CascadeConnection::new(Arc::clone(&parent), Passthrough).unwrap();
        assert_eq!(parent.lifecycle().emitter().listener_count(EventKind::Message), 1);

        drop(cascade);

        for kind in EventKind::ALL {
            assert_eq!(parent.lifecycle().emitter().listener_count(kind), 0);
        }
        parent.deliver_open();
        parent.deliver_message("nobody listens".to_string());
    }

    #[test]
    fn test_close_from_message_listener_does_not_recurse() {
        let parent = Arc::new(Parent::new().with_auto_close());
        let cascade = CascadeConnection::new(Arc::clone(&parent), Passthrough).unwrap();
        let closes = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&cascade);
        cascade.on(EventKind::Message, move |_event| {
            if let Some(cascade) = weak.upgrade() {
                cascade.close();
            }
        });
        let closes_clone = Arc::clone(&closes);
        cascade.on(EventKind::Close, move |_event| {
            closes_clone.fetch_add(1, Ordering::SeqCst);
        });

        parent.deliver_open();
        parent.deliver_message("bye".to_string());
        parent.deliver_message("again".to_string());

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(parent.close_request_count(), 1);
        assert_eq!(cascade.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_echo_listener_holding_weak_lets_cascade_drop() {
        let parent = Arc::new(Parent::new());
        let cascade = CascadeConnection::new(Arc::clone(&parent), Passthrough).unwrap();

        let echo = Arc::downgrade(&cascade);
        cascade.on(EventKind::Message, move |event| {
            if let (Some(data), Some(echo)) = (event.message(), echo.upgrade()) {
                echo.send(format!("re:{data}")).unwrap();
            }
        });

        parent.deliver_open();
        parent.deliver_message("ping".to_string());
        assert_eq!(parent.take_sent(), ["re:ping"]);

        let weak = Arc::downgrade(&cascade);
        drop(cascade);
        assert!(weak.upgrade().is_none());
        assert_eq!(parent.lifecycle().emitter().listener_count(EventKind::Message), 0);
    }

    #[test]
    fn test_fail_leaves_parent_open() {
        let parent = Arc::new(Parent::new());
        let cascade = CascadeConnection::new(Arc::clone(&parent), Passthrough).unwrap();
        parent.deliver_open();

        assert!(cascade.fail(Error::protocol("test", "bad")));
        assert_eq!(cascade.state(), ConnectionState::Closed);
        assert_eq!(parent.state(), ConnectionState::Opened);
    }
}
