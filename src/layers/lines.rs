//! Newline-delimited framing over a text stream.
//!
//! Parent messages are arbitrary chunks of a stream. The layer buffers the
//! tail of each chunk and emits one message per chunk holding the lines it
//! completed, so a chunk that ends mid-line produces nothing yet.
//!
//! ```text
//! "a\nb"  ──► ["a"]
//! "c\n"   ──► ["bc"]
//! "d"     ──► (absorbed)
//! ```

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;

use crate::cascade::Layer;
use crate::connection::Connection;
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default cap on a buffered partial line, in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

// ============================================================================
// LineLayer
// ============================================================================

/// Reassembles `\n`-terminated lines from text chunks.
///
/// A trailing `\r` is stripped from each line. Outbound, every line gets a
/// `\n` appended and the batch is sent as one chunk.
#[derive(Debug)]
pub struct LineLayer {
    buffer: Mutex<String>,
    max_line_length: usize,
}

impl Default for LineLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineLayer {
    /// Creates a layer with [`DEFAULT_MAX_LINE_LENGTH`].
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(String::new()),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Sets the cap on a buffered partial line.
    #[inline]
    #[must_use]
    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    /// Returns the length of the partial line held so far.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.lock().len()
    }
}

impl<P> Layer<P> for LineLayer
where
    P: Connection<Message = String>,
{
    type Message = Vec<String>;

    fn name(&self) -> &str {
        "lines"
    }

    fn transform(&self, lines: Vec<String>) -> Result<String> {
        let mut chunk = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines {
            if line.contains('\n') {
                return Err(Error::transform("lines", "line contains a newline"));
            }
            chunk.push_str(&line);
            chunk.push('\n');
        }
        Ok(chunk)
    }

    fn detransform(&self, chunk: &String) -> Result<Option<Vec<String>>> {
        let mut buffer = self.buffer.lock();
        buffer.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(end) = buffer.find('\n') {
            let mut line: String = buffer.drain(..=end).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }

        if buffer.len() > self.max_line_length {
            let len = buffer.len();
            buffer.clear();
            return Err(Error::protocol(
                "lines",
                format!("partial line of {len} bytes exceeds {}", self.max_line_length),
            ));
        }

        Ok((!lines.is_empty()).then_some(lines))
    }
}

// ============================================================================
// Tests
// ============================================================================
