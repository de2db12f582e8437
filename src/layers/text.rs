//! Text frames over a [`Payload`] transport.

// ============================================================================
// Imports
// ============================================================================

use crate::cascade::Layer;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::transport::Payload;

// ============================================================================
// TextLayer
// ============================================================================

/// Maps [`Payload`] frames to `String` messages.
///
/// Outbound strings become text frames. Inbound binary frames are decoded as
/// UTF-8 by default; invalid UTF-8 is a protocol violation. With
/// [`text_only`](Self::text_only) binary frames are dropped instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextLayer {
    drop_binary: bool,
}

impl TextLayer {
    /// Creates a layer that decodes binary frames as UTF-8.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { drop_binary: false }
    }

    /// Creates a layer that ignores binary frames.
    #[inline]
    #[must_use]
    pub const fn text_only() -> Self {
        Self { drop_binary: true }
    }
}

impl<P> Layer<P> for TextLayer
where
    P: Connection<Message = Payload>,
{
    type Message = String;

    fn name(&self) -> &str {
        "text"
    }

    fn transform(&self, data: String) -> Result<Payload> {
        Ok(Payload::Text(data))
    }

    fn detransform(&self, data: &Payload) -> Result<Option<String>> {
        match data {
            Payload::Text(text) => Ok(Some(text.clone())),
            Payload::Binary(_) if self.drop_binary => Ok(None),
            Payload::Binary(bytes) => String::from_utf8(bytes.clone())
                .map(Some)
                .map_err(|e| Error::protocol("text", format!("binary frame is not UTF-8: {e}"))),
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

    use parking_lot::Mutex;

    use crate::cascade::CascadeExt;
    use crate::connection::{ConnectionEvent, ConnectionState};
    use crate::transport::LoopbackConnection;

    type Parent = LoopbackConnection<Payload>;

    #[test]
    fn test_transform_makes_text_frames() {
        let out = Layer::<Parent>::transform(&TextLayer::new(), "hi".to_string()).unwrap();
        assert_eq!(out, Payload::Text("hi".to_string()));
    }

    #[test]
    fn test_detransform_decodes_utf8_binary() {
        let layer = TextLayer::new();
        let data = Payload::Binary("héllo".as_bytes().to_vec());
        assert_eq!(
            Layer::<Parent>::detransform(&layer, &data).unwrap().as_deref(),
            Some("héllo")
        );
    }

    #[test]
    fn test_text_only_drops_binary() {
        let layer = TextLayer::text_only();
        let data = Payload::Binary(vec![0xff]);
        assert_eq!(Layer::<Parent>::detransform(&layer, &data).unwrap(), None);
    }

    #[test]
    fn test_invalid_utf8_closes_layer_only() {
        let parent = Arc::new(Parent::new());
        let text = parent.stack(TextLayer::new()).unwrap();

        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_clone = Arc::clone(&errors);
        text.on_all(move |event| {
            if let ConnectionEvent::Error(cause) = event {
                errors_clone.lock().push(cause.is_protocol_error());
            }
        });

        parent.deliver_open();
        parent.deliver_message(Payload::Binary(vec![0xc3, 0x28]));

        assert_eq!(*errors.lock(), [true]);
        assert_eq!(text.state(), ConnectionState::Closed);
        assert_eq!(parent.state(), ConnectionState::Opened);
    }
}
