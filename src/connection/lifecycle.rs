//! Lifecycle state machine shared by every connection.
//!
//! A [`Lifecycle`] owns the current [`ConnectionState`] and the listener
//! registry. Implementations raise the four internal signals on it and gate
//! the two public commands through it; the transition table in
//! [`state`](super::state) decides what happens.
//!
//! State is always committed before any event is emitted, so a listener
//! observing an event sees the state that event produced.

// ============================================================================
// Imports
// ============================================================================

use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::error::{ErrorCause, Result};
use crate::identifiers::{ConnectionId, ListenerId};

use super::emitter::{EventEmitter, Listener};
use super::event::{ConnectionEvent, EventKind};
use super::options::ConnectionOptions;
use super::state::{ConnectionState, Effect, Input, Transition, transition};

// ============================================================================
// DepthGuard
// ============================================================================

thread_local! {
    /// Dispatch nesting of each connection on the current thread.
    static DISPATCH_DEPTH: RefCell<FxHashMap<ConnectionId, usize>> =
        RefCell::new(FxHashMap::default());
}

/// Tracks one level of synchronous dispatch nesting on this thread.
struct DepthGuard {
    id: ConnectionId,
}

impl DepthGuard {
    fn enter(id: ConnectionId) -> Self {
        DISPATCH_DEPTH.with(|depths| *depths.borrow_mut().entry(id).or_insert(0) += 1);
        Self { id }
    }

    /// Returns the nesting of `id` on this thread.
    fn current(id: ConnectionId) -> usize {
        DISPATCH_DEPTH.with(|depths| depths.borrow().get(&id).copied().unwrap_or(0))
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DISPATCH_DEPTH.with(|depths| {
            let mut depths = depths.borrow_mut();
            if let Some(depth) = depths.get_mut(&self.id) {
                *depth -= 1;
                if *depth == 0 {
                    depths.remove(&self.id);
                }
            }
        });
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// State machine and event registry of a single connection.
pub struct Lifecycle<M> {
    /// Unique ID used in logs.
    id: ConnectionId,
    /// Label used in logs.
    label: Arc<str>,
    /// Current state.
    state: Mutex<ConnectionState>,
    /// Registered listeners.
    emitter: EventEmitter<M>,
    /// Nesting limit for `message` dispatch.
    max_dispatch_depth: usize,
}

impl<M> Default for Lifecycle<M> {
    fn default() -> Self {
        Self::build(&ConnectionOptions::default())
    }
}

impl<M> Lifecycle<M> {
    /// Creates a lifecycle in the `opening` state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if `options` fail
    /// validation.
    pub fn new(options: &ConnectionOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::build(options))
    }

    fn build(options: &ConnectionOptions) -> Self {
        let lifecycle = Self {
            id: ConnectionId::next(),
            label: Arc::from(options.label.as_str()),
            state: Mutex::new(ConnectionState::Opening),
            emitter: EventEmitter::new(),
            max_dispatch_depth: options.max_dispatch_depth,
        };

        trace!(connection = %lifecycle.id, label = %lifecycle.label, "Connection created");
        lifecycle
    }

    /// Returns the connection ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the log label.
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Returns the listener registry.
    #[inline]
    #[must_use]
    pub fn emitter(&self) -> &EventEmitter<M> {
        &self.emitter
    }
}

// ============================================================================
// Lifecycle - Subscriptions
// ============================================================================

impl<M> Lifecycle<M> {
    /// Registers `listener` for events of `kind`.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent<M>) + Send + Sync + 'static,
    {
        self.emitter.on(kind, Arc::new(listener))
    }

    /// Registers `listener` for every event kind.
    pub fn on_all<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent<M>) + Send + Sync + 'static,
    {
        self.emitter.on_all(Arc::new(listener))
    }

    /// Registers an already shared listener for events of `kind`.
    pub fn on_shared(&self, kind: EventKind, listener: Listener<M>) -> ListenerId {
        self.emitter.on(kind, listener)
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        self.emitter.off(id)
    }
}

// ============================================================================
// Lifecycle - Command Gates
// ============================================================================

impl<M> Lifecycle<M> {
    /// Applies `close()`.
    ///
    /// Returns `true` if the connection moved to `closing` and the caller
    /// must now invoke its close-request hook. Returns `false` (and changes
    /// nothing) in `closing` or `closed`.
    pub fn begin_close(&self) -> bool {
        match self.apply(Input::CloseRequested) {
            Some(step) => {
                debug_assert_eq!(step.effect, Effect::RequestClose);
                true
            }
            None => {
                trace!(connection = %self.id, label = %self.label, "close() ignored");
                false
            }
        }
    }

    /// Applies `send()`.
    ///
    /// Returns `true` if the caller must now invoke its send-request hook.
    /// Outside `opened` the data is dropped silently.
    pub fn begin_send(&self) -> bool {
        let allowed = self.apply(Input::SendRequested).is_some();
        if !allowed {
            trace!(connection = %self.id, label = %self.label, "send() dropped");
        }
        allowed
    }
}

// ============================================================================
// Lifecycle - Internal Signals
// ============================================================================

impl<M> Lifecycle<M> {
    /// The underlying channel opened.
    ///
    /// Returns `true` if the signal was applied.
    pub fn signal_open(&self) -> bool {
        self.apply_and_emit(Input::OpenSignal, None)
    }

    /// The underlying channel failed with `cause`.
    ///
    /// Emits `error` then `close` from `opening`/`opened`; only `close`
    /// from `closing`. Returns `true` if the signal was applied.
    pub fn signal_error(&self, cause: impl Into<ErrorCause>) -> bool {
        self.apply_and_emit(Input::ErrorSignal, Some(cause.into()))
    }

    /// The underlying channel closed.
    ///
    /// Returns `true` if the signal was applied.
    pub fn signal_close(&self) -> bool {
        self.apply_and_emit(Input::CloseSignal, None)
    }

    /// The underlying channel delivered `data`.
    ///
    /// Ignored unless `opened`. Also ignored, with a warning, when it would
    /// nest deeper than the configured dispatch depth on the calling thread. Returns `true` if a
    /// `message` event was emitted.
    pub fn signal_message(&self, data: M) -> bool {
        if DepthGuard::current(self.id) >= self.max_dispatch_depth {
            warn!(
                connection = %self.id,
                label = %self.label,
                max = self.max_dispatch_depth,
                "Message dropped: dispatch nested too deeply"
            );
            return false;
        }

        if self.apply(Input::MessageSignal).is_none() {
            trace!(
                connection = %self.id,
                label = %self.label,
                state = %self.state(),
                "Message ignored"
            );
            return false;
        }

        self.dispatch(&ConnectionEvent::Message(data));
        true
    }
}

// ============================================================================
// Lifecycle - Internals
// ============================================================================

impl<M> Lifecycle<M> {
    /// Applies `input` under the state lock. Returns the committed step.
    fn apply(&self, input: Input) -> Option<Transition> {
        let mut state = self.state.lock();
        let from = *state;
        let step = transition(from, input)?;

        if step.to != from {
            debug!(
                connection = %self.id,
                label = %self.label,
                %from,
                to = %step.to,
                ?input,
                "State transition"
            );
        }

        *state = step.to;
        Some(step)
    }

    /// Applies a lifecycle signal and emits the events it produced.
    fn apply_and_emit(&self, input: Input, cause: Option<ErrorCause>) -> bool {
        let Some(step) = self.apply(input) else {
            trace!(connection = %self.id, label = %self.label, ?input, "Signal ignored");
            return false;
        };

        match step.effect {
            Effect::EmitOpen => self.dispatch(&ConnectionEvent::Open),
            Effect::EmitErrorThenClose => {
                if let Some(cause) = cause {
                    debug!(connection = %self.id, label = %self.label, error = %cause, "Connection failed");
                    self.dispatch(&ConnectionEvent::Error(cause));
                }
                self.dispatch(&ConnectionEvent::Close);
            }
            Effect::EmitClose => {
                if let Some(cause) = cause {
                    debug!(
                        connection = %self.id,
                        label = %self.label,
                        error = %cause,
                        "Error swallowed by pending close"
                    );
                }
                self.dispatch(&ConnectionEvent::Close);
            }
            Effect::EmitMessage | Effect::RequestClose | Effect::RequestSend => {}
        }

        true
    }

    /// Emits `event` while tracking dispatch depth.
    fn dispatch(&self, event: &ConnectionEvent<M>) {
        let _guard = DepthGuard::enter(self.id);
        let delivered = self.emitter.emit(event);
        trace!(
            connection = %self.id,
            label = %self.label,
            kind = %event.kind(),
            delivered,
            "Event emitted"
        );
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use proptest::prelude::*;

    use crate::error::Error;

    fn record(lifecycle: &Lifecycle<String>) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        lifecycle.on_all(move |event| {
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

    #[test]
    fn test_starts_opening() {
        let lifecycle = Lifecycle::<String>::default();
        assert_eq!(lifecycle.state(), ConnectionState::Opening);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let options = ConnectionOptions::new().with_max_dispatch_depth(0);
        assert!(Lifecycle::<String>::new(&options).is_err());
    }

    #[test]
    fn test_open_message_close() {
        let lifecycle = Lifecycle::default();
        let log = record(&lifecycle);

        assert!(lifecycle.signal_open());
        assert!(lifecycle.signal_message("hi".to_string()));
        assert!(lifecycle.signal_close());

        assert_eq!(lifecycle.state(), ConnectionState::Closed);
        assert_eq!(*log.lock(), ["open", "message:hi", "close"]);
    }

    #[test]
    fn test_message_before_open_is_ignored() {
        let lifecycle = Lifecycle::default();
        let log = record(&lifecycle);

        assert!(!lifecycle.signal_message("early".to_string()));
        assert!(log.lock().is_empty());
        assert_eq!(lifecycle.state(), ConnectionState::Opening);
    }

    #[test]
    fn test_error_emits_error_then_close() {
        let lifecycle = Lifecycle::default();
        let log = record(&lifecycle);

        lifecycle.signal_open();
        assert!(lifecycle.signal_error(Error::connection("reset")));

        assert_eq!(lifecycle.state(), ConnectionState::Closed);
        assert_eq!(
            *log.lock(),
            ["open", "error:Connection failed: reset", "close"]
        );
    }

    #[test]
    fn test_error_while_closing_only_closes() {
        let lifecycle = Lifecycle::default();
        let log = record(&lifecycle);

        lifecycle.signal_open();
        assert!(lifecycle.begin_close());
        assert_eq!(lifecycle.state(), ConnectionState::Closing);

        assert!(lifecycle.signal_error(Error::connection("late")));
        assert_eq!(*log.lock(), ["open", "close"]);
    }

    #[test]
    fn test_begin_close_only_once() {
        let lifecycle = Lifecycle::<String>::default();
        assert!(lifecycle.begin_close());
        assert!(!lifecycle.begin_close());
    }

    #[test]
    fn test_begin_send_requires_opened() {
        let lifecycle = Lifecycle::<String>::default();
        assert!(!lifecycle.begin_send());
        lifecycle.signal_open();
        assert!(lifecycle.begin_send());
        lifecycle.begin_close();
        assert!(!lifecycle.begin_send());
    }

    #[test]
    fn test_closed_ignores_everything() {
        let lifecycle = Lifecycle::default();
        lifecycle.signal_close();
        let log = record(&lifecycle);

        assert!(!lifecycle.signal_open());
        assert!(!lifecycle.signal_error(Error::ConnectionClosed));
        assert!(!lifecycle.signal_close());
        assert!(!lifecycle.signal_message("x".to_string()));
        assert!(!lifecycle.begin_close());
        assert!(!lifecycle.begin_send());
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_listener_sees_committed_state() {
        let lifecycle = Arc::new(Lifecycle::<String>::default());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let observer = Arc::clone(&lifecycle);
        let seen_clone = Arc::clone(&seen);
        lifecycle.on_all(move |_event| {
            seen_clone.lock().push(observer.state());
        });

        lifecycle.signal_open();
        lifecycle.signal_close();
        assert_eq!(
            *seen.lock(),
            [ConnectionState::Opened, ConnectionState::Closed]
        );
    }

    #[test]
    fn test_reentrant_close_from_listener() {
        let lifecycle = Arc::new(Lifecycle::<String>::default());
        let inner = Arc::clone(&lifecycle);
        lifecycle.on(EventKind::Message, move |_event| {
            if inner.begin_close() {
                inner.signal_close();
            }
        });
        let log = record(&lifecycle);

        lifecycle.signal_open();
        lifecycle.signal_message("bye".to_string());

        assert_eq!(lifecycle.state(), ConnectionState::Closed);
        assert_eq!(*log.lock(), ["open", "close", "message:bye"]);
    }

    #[test]
    fn test_nested_messages_are_bounded() {
        let options = ConnectionOptions::new().with_max_dispatch_depth(3);
        let lifecycle = Arc::new(Lifecycle::<u32>::new(&options).unwrap());
        let count = Arc::new(AtomicUsize::new(0));

        let inner = Arc::clone(&lifecycle);
        let count_clone = Arc::clone(&count);
        lifecycle.on(EventKind::Message, move |event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            if let Some(n) = event.message() {
                // Echo forever; the depth limit stops the recursion.
                inner.signal_message(n + 1);
            }
        });

        lifecycle.signal_open();
        assert!(lifecycle.signal_message(0));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_dispatch_depth_is_per_thread() {
        let options = ConnectionOptions::new().with_max_dispatch_depth(1);
        let lifecycle = Arc::new(Lifecycle::<String>::new(&options).unwrap());
        let barrier = Arc::new(Barrier::new(2));

        let barrier_clone = Arc::clone(&barrier);
        lifecycle.on(EventKind::Message, move |event| {
            if event.message().map(String::as_str) == Some("hold") {
                barrier_clone.wait();
                barrier_clone.wait();
            }
        });
        lifecycle.signal_open();

        let holder = {
            let lifecycle = Arc::clone(&lifecycle);
            thread::spawn(move || lifecycle.signal_message("hold".to_string()))
        };

        // The other thread is now inside a message dispatch at the limit.
        barrier.wait();
        assert!(lifecycle.signal_message("other".to_string()));
        barrier.wait();

        assert!(holder.join().unwrap());
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Open,
        Error,
        Close,
        Message,
        BeginClose,
        BeginSend,
    }

    const ALL_OPS: [Op; 6] = [
        Op::Open,
        Op::Error,
        Op::Close,
        Op::Message,
        Op::BeginClose,
        Op::BeginSend,
    ];

    fn any_op() -> impl Strategy<Value = Op> {
        prop::sample::select(ALL_OPS.to_vec())
    }

    proptest! {
        #[test]
        fn prop_close_emitted_once_and_last(ops in prop::collection::vec(any_op(), 0..64)) {
            let lifecycle = Lifecycle::<String>::default();
            let log = record(&lifecycle);
            // Log length when a close() was first accepted.
            let mut closing_from = None;

            for op in ops {
                match op {
                    Op::Open => {
                        lifecycle.signal_open();
                    }
                    Op::Error => {
                        lifecycle.signal_error(Error::connection("reset"));
                    }
                    Op::Close => {
                        lifecycle.signal_close();
                    }
                    Op::Message => {
                        lifecycle.signal_message("m".to_string());
                    }
                    Op::BeginClose => {
                        if lifecycle.begin_close() && closing_from.is_none() {
                            closing_from = Some(log.lock().len());
                        }
                    }
                    Op::BeginSend => {
                        lifecycle.begin_send();
                    }
                }
            }

            let log = log.lock();
            let closes = log.iter().filter(|entry| *entry == "close").count();
            prop_assert!(closes <= 1);
            prop_assert_eq!(closes == 1, lifecycle.state() == ConnectionState::Closed);
            if closes == 1 {
                prop_assert_eq!(log.last().map(String::as_str), Some("close"));
            }

            for (i, entry) in log.iter().enumerate() {
                if entry.starts_with("error:") {
                    prop_assert_eq!(log.get(i + 1).map(String::as_str), Some("close"));
                }
            }

            if let Some(from) = closing_from {
                prop_assert!(!log[from..].iter().any(|entry| entry.starts_with("error:")));
            }
        }
    }
}
