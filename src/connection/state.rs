//! Connection lifecycle states and the transition table.
//!
//! ```text
//!            open signal              close()
//! Opening ─────────────────► Opened ──────────► Closing
//!    │ close()                 │                   │
//!    ├─────────────────────────┼──────────────────►│
//!    │ error / close signal    │ error / close     │ close / error signal
//!    └─────────────────────────┴──────────────────►└────────► Closed
//! ```
//!
//! `Closed` is absorbing. The table is pure so it can be tested without any
//! listeners attached; [`Lifecycle`](super::Lifecycle) applies it and runs
//! the resulting [`Effect`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Initial state; the underlying channel is being established.
    #[default]
    Opening,
    /// The channel is usable; `send` is accepted.
    Opened,
    /// `close()` was requested and the channel is being torn down.
    Closing,
    /// Terminal state.
    Closed,
}

impl ConnectionState {
    /// Position along the lifecycle. Never decreases for one connection.
    #[inline]
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Opening => 0,
            Self::Opened => 1,
            Self::Closing => 2,
            Self::Closed => 3,
        }
    }

    /// Returns `true` for [`ConnectionState::Closed`].
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` if `send` reaches the send hook in this state.
    #[inline]
    #[must_use]
    pub const fn can_send(self) -> bool {
        matches!(self, Self::Opened)
    }

    /// Returns `true` if `close` reaches the close hook in this state.
    #[inline]
    #[must_use]
    pub const fn can_close(self) -> bool {
        matches!(self, Self::Opening | Self::Opened)
    }

    /// Lowercase name used in logs.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Opening => "opening",
            Self::Opened => "opened",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Input / Effect
// ============================================================================

/// Everything that can be applied to the state machine.
///
/// The first four are internal signals raised by the implementation; the
/// last two are the public commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Input {
    /// The channel finished opening.
    OpenSignal,
    /// The channel failed.
    ErrorSignal,
    /// The channel closed.
    CloseSignal,
    /// The channel delivered a message.
    MessageSignal,
    /// `close()` was called.
    CloseRequested,
    /// `send()` was called.
    SendRequested,
}

/// What must happen after a transition has been committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    /// Emit `open`.
    EmitOpen,
    /// Emit `error` with the cause, then `close`.
    EmitErrorThenClose,
    /// Emit `close` only.
    EmitClose,
    /// Emit `message` with the payload.
    EmitMessage,
    /// Invoke the close-request hook.
    RequestClose,
    /// Invoke the send-request hook.
    RequestSend,
}

/// Result of applying an [`Input`] in some state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transition {
    /// State after the input.
    pub to: ConnectionState,
    /// Action to run once the new state is visible.
    pub effect: Effect,
}

impl Transition {
    const fn new(to: ConnectionState, effect: Effect) -> Self {
        Self { to, effect }
    }
}

/// Applies `input` in `state`.
///
/// Returns `None` when the input is not permitted in `state`; callers must
/// then ignore it without side effects.
#[must_use]
pub const fn transition(state: ConnectionState, input: Input) -> Option<Transition> {
    use ConnectionState::{Closed, Closing, Opened, Opening};

    match (state, input) {
        (Opening, Input::OpenSignal) => Some(Transition::new(Opened, Effect::EmitOpen)),

        (Opening | Opened, Input::CloseRequested) => {
            Some(Transition::new(Closing, Effect::RequestClose))
        }

        (Opening | Opened, Input::ErrorSignal) => {
            Some(Transition::new(Closed, Effect::EmitErrorThenClose))
        }
        // A pending close swallows the error.
        (Closing, Input::ErrorSignal) => Some(Transition::new(Closed, Effect::EmitClose)),

        (Opening | Opened | Closing, Input::CloseSignal) => {
            Some(Transition::new(Closed, Effect::EmitClose))
        }

        (Opened, Input::MessageSignal) => Some(Transition::new(Opened, Effect::EmitMessage)),
        (Opened, Input::SendRequested) => Some(Transition::new(Opened, Effect::RequestSend)),

        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
