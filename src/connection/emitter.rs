//! Fan-out event emitter.
//!
//! Listeners are stored per [`EventKind`] in registration order. Emission
//! takes a snapshot of the listener list and releases the lock before any
//! listener runs, so a listener may subscribe, unsubscribe, send or close
//! from inside its own callback.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::identifiers::ListenerId;

use super::event::{ConnectionEvent, EventKind};

// ============================================================================
// Types
// ============================================================================

/// Listener callback type.
///
/// Called synchronously for every event of the kinds it was registered for.
pub type Listener<M> = Arc<dyn Fn(&ConnectionEvent<M>) + Send + Sync>;

/// Registered listeners for one event kind, in registration order.
type Slot<M> = Vec<(ListenerId, Listener<M>)>;

// ============================================================================
// EventEmitter
// ============================================================================

/// Registry of listeners for the four connection events.
pub struct EventEmitter<M> {
    listeners: RwLock<FxHashMap<EventKind, Slot<M>>>,
}

impl<M> Default for EventEmitter<M> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(FxHashMap::default()),
        }
    }
}

impl<M> EventEmitter<M> {
    /// Creates an emitter with no listeners.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for events of `kind`.
    pub fn on(&self, kind: EventKind, listener: Listener<M>) -> ListenerId {
        let id = ListenerId::next();
        self.listeners
            .write()
            .entry(kind)
            .or_default()
            .push((id, listener));
        id
    }

    /// Registers `listener` for every event kind under a single ID.
    pub fn on_all(&self, listener: Listener<M>) -> ListenerId {
        let id = ListenerId::next();
        let mut listeners = self.listeners.write();
        for kind in EventKind::ALL {
            listeners
                .entry(kind)
                .or_default()
                .push((id, Arc::clone(&listener)));
        }
        id
    }

    /// Removes the listener registered under `id`.
    ///
    /// Returns `false` if no such listener exists.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut removed = false;
        for slot in self.listeners.write().values_mut() {
            let before = slot.len();
            slot.retain(|(listener_id, _)| *listener_id != id);
            removed |= slot.len() != before;
        }
        removed
    }

    /// Returns the number of listeners registered for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }

    /// Removes every listener.
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// Delivers `event` to every listener of its kind.
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&self, event: &ConnectionEvent<M>) -> usize {
        let snapshot: Vec<Listener<M>> = {
            let listeners = self.listeners.read();
            match listeners.get(&event.kind()) {
                Some(slot) => slot.iter().map(|(_, l)| Arc::clone(l)).collect(),
                None => return 0,
            }
        };

        for listener in &snapshot {
            listener(event);
        }

        snapshot.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
