//! Protocol layer hooks.
//!
//! A [`Layer`] tells a [`CascadeConnection`](super::CascadeConnection) how to
//! shape messages between itself and its parent:
//!
//! | Hook | Direction | Default |
//! |------|-----------|---------|
//! | `transform` | outbound, layer → parent | required |
//! | `detransform` | inbound, parent → layer | required |
//! | `request_send` | outbound | `parent.send(transform(data)?)` |
//! | `request_close` | - | parent raw close, else `parent.close()` |
//!
//! `detransform` returns `Ok(None)` to drop a parent message without
//! emitting anything, which is how a layer filters or buffers partial data.
//! An `Err` is a protocol violation and closes the layer with that cause.

// ============================================================================
// Imports
// ============================================================================

use std::marker::PhantomData;

use crate::connection::Connection;
use crate::error::Result;

// ============================================================================
// Layer
// ============================================================================

/// Message shaping between a cascade and its parent `P`.
pub trait Layer<P: Connection>: Send + Sync + 'static {
    /// Message type of the cascade built from this layer.
    type Message: Send + Sync + 'static;

    /// Name used in logs and error attribution.
    fn name(&self) -> &str {
        "cascade"
    }

    /// Shapes outbound data into what the parent expects.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` cannot be represented at the parent level.
    fn transform(&self, data: Self::Message) -> Result<P::Message>;

    /// Shapes inbound parent data into this layer's messages.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` violates the layer's protocol. The
    /// cascade then closes with that error as the cause.
    fn detransform(&self, data: &P::Message) -> Result<Option<Self::Message>>;

    /// Send hook of the cascade. Only invoked in `opened`.
    ///
    /// # Errors
    ///
    /// Propagates `transform` and parent send failures.
    fn request_send(&self, parent: &P, data: Self::Message) -> Result<()> {
        parent.send(self.transform(data)?)
    }

    /// Close hook of the cascade.
    ///
    /// Closes the parent's underlying channel directly if it offers raw
    /// close, otherwise calls the parent's `close()`.
    fn request_close(&self, parent: &P) {
        match parent.as_raw_close() {
            Some(raw) => raw.raw_close(),
            None => parent.close(),
        }
    }
}

// ============================================================================
// Passthrough
// ============================================================================

/// Identity layer: forwards messages unchanged in both directions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Passthrough;

impl<P> Layer<P> for Passthrough
where
    P: Connection,
    P::Message: Clone,
{
    type Message = P::Message;

    fn name(&self) -> &str {
        "passthrough"
    }

    fn transform(&self, data: P::Message) -> Result<P::Message> {
        Ok(data)
    }

    fn detransform(&self, data: &P::Message) -> Result<Option<P::Message>> {
        Ok(Some(data.clone()))
    }
}

// ============================================================================
// FnLayer
// ============================================================================

/// Layer built from two closures.
///
/// # Example
///
/// ```ignore
/// let shout = FnLayer::new(
///     |s: String| s.to_uppercase(),
///     |s: &String| Some(s.to_lowercase()),
/// );
/// ```
pub struct FnLayer<M, T, D> {
    name: String,
    transform: T,
    detransform: D,
    _message: PhantomData<fn(M) -> M>,
}

impl<M, T, D> FnLayer<M, T, D> {
    /// Creates a layer from an outbound and an inbound mapping.
    ///
    /// The inbound mapping returns `None` to drop a message.
    #[inline]
    #[must_use]
    pub fn new(transform: T, detransform: D) -> Self {
        Self {
            name: "fn".to_string(),
            transform,
            detransform,
            _message: PhantomData,
        }
    }

    /// Sets the layer name used in logs.
    #[inline]
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<P, M, T, D> Layer<P> for FnLayer<M, T, D>
where
    P: Connection,
    M: Send + Sync + 'static,
    T: Fn(M) -> P::Message + Send + Sync + 'static,
    D: Fn(&P::Message) -> Option<M> + Send + Sync + 'static,
{
    type Message = M;

    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, data: M) -> Result<P::Message> {
        Ok((self.transform)(data))
    }

    fn detransform(&self, data: &P::Message) -> Result<Option<M>> {
        Ok((self.detransform)(data))
    }
}

// ============================================================================
// Tests
// ============================================================================
