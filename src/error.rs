//! Error types for layered connections.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use layered_connection::{Connection, Result};
//!
//! fn greet(conn: &impl Connection<Message = String>) -> Result<()> {
//!     conn.send("hello".to_string())?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`], [`Error::Transform`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |
//!
//! Errors that surface as `error` events are shared between listeners through
//! [`ErrorCause`].

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;
use std::sync::Arc;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

/// Cause carried by an `error` event.
///
/// Reference counted so a single cause can be fanned out to every listener
/// and re-emitted by every cascade layer above the one that failed.
pub type ErrorCause = Arc<Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when connection or transport options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Underlying channel failed.
    ///
    /// Reported by a root transport through its error signal.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Timed out while establishing the underlying channel.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The underlying channel is gone.
    ///
    /// Returned when a command cannot reach a transport whose event loop
    /// has already terminated.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation detected by a layer.
    ///
    /// Raised from `detransform` when inbound data is malformed rather than
    /// merely incomplete. The owning layer closes with this cause.
    #[error("Protocol error in {layer}: {message}")]
    Protocol {
        /// Name of the layer that rejected the data.
        layer: String,
        /// Description of the violation.
        message: String,
        /// Underlying decoder error, if any.
        #[source]
        source: Option<Box<Error>>,
    },

    /// Outbound data could not be shaped for the parent layer.
    #[error("Transform failed in {layer}: {message}")]
    Transform {
        /// Name of the layer that rejected the data.
        layer: String,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error attributed to `layer`.
    #[inline]
    pub fn protocol(layer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            layer: layer.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a protocol error attributed to `layer` that keeps the
    /// decoder error as its source.
    #[inline]
    pub fn protocol_caused_by(layer: impl Into<String>, source: impl Into<Error>) -> Self {
        let source = source.into();
        Self::Protocol {
            layer: layer.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a transform error attributed to `layer`.
    #[inline]
    pub fn transform(layer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transform {
            layer: layer.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::Io(_)
                | Self::WebSocket(_)
        )
    }

    /// Returns the error a protocol violation was raised from.
    #[inline]
    #[must_use]
    pub fn protocol_source(&self) -> Option<&Error> {
        match self {
            Self::Protocol { source, .. } => source.as_deref(),
            _ => None,
        }
    }

    /// Returns `true` if a layer rejected the data it was given.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol { .. } | Self::Transform { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
