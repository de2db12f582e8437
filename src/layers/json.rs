//! JSON documents over a text connection.
//!
//! Each parent message carries exactly one JSON document. Whitespace-only
//! messages (keep-alives) are absorbed; anything else that fails to parse
//! is a protocol violation.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::cascade::Layer;
use crate::connection::Connection;
use crate::error::{Error, Result};

// ============================================================================
// JsonLayer
// ============================================================================

/// Maps `String` messages to typed JSON documents `T`.
pub struct JsonLayer<T> {
    _document: PhantomData<fn() -> T>,
}

impl<T> JsonLayer<T> {
    /// Creates a JSON layer.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _document: PhantomData,
        }
    }
}

impl<T> Default for JsonLayer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonLayer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLayer")
            .field("document", &std::any::type_name::<T>())
            .finish()
    }
}

impl<P, T> Layer<P> for JsonLayer<T>
where
    P: Connection<Message = String>,
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Message = T;

    fn name(&self) -> &str {
        "json"
    }

    fn transform(&self, data: T) -> Result<String> {
        serde_json::to_string(&data).map_err(|e| Error::transform("json", e.to_string()))
    }

    fn detransform(&self, data: &String) -> Result<Option<T>> {
        if data.trim().is_empty() {
            trace!("Keep-alive absorbed");
            return Ok(None);
        }

        serde_json::from_str(data)
            .map(Some)
            .map_err(|e| Error::protocol_caused_by("json", e))
    }
}

// ============================================================================
// Tests
// ============================================================================
