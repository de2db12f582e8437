//! WebSocket root transport and its event loop.
//!
//! # Event Loop
//!
//! Each [`WebSocketConnection`] owns one tokio task that:
//!
//! - Raises the open signal once [`WebSocketConnection::start`] is called
//! - Turns text and binary frames into message signals
//! - Executes send and close commands from the connection
//! - Raises the close signal when the socket ends, or the error signal if
//!   it fails
//!
//! The task only holds a `Weak` reference to the connection, so dropping
//! the last `Arc` shuts the socket down.

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::connection::{Connection, ConnectionOptions, ConnectionState, Lifecycle, RawClose};
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for the opening handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time to wait for the peer to acknowledge a close frame.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Payload
// ============================================================================

/// Data frame carried by a [`WebSocketConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl Payload {
    /// Returns the text of a text frame.
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Returns the frame length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    /// Returns `true` if the frame carries no data.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data)
    }
}

impl From<Payload> for Message {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Text(text) => Message::Text(text.into()),
            Payload::Binary(data) => Message::Binary(data.into()),
        }
    }
}

// ============================================================================
// WebSocketOptions
// ============================================================================

/// Options for a [`WebSocketConnection`].
#[derive(Debug, Clone)]
pub struct WebSocketOptions {
    /// Timeout for the opening handshake (and for `accept`).
    pub connect_timeout: Duration,
    /// Time to wait for the peer's close frame after sending ours.
    pub close_timeout: Duration,
    /// Lifecycle options.
    pub connection: ConnectionOptions,
}

impl Default for WebSocketOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            connection: ConnectionOptions::labeled("websocket"),
        }
    }
}

impl WebSocketOptions {
    /// Creates options with default values.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the close acknowledgement timeout.
    #[inline]
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Sets the lifecycle options.
    #[inline]
    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionOptions) -> Self {
        self.connection = connection;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a timeout is zero or the lifecycle
    /// options are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect_timeout must be greater than zero"));
        }
        if self.close_timeout.is_zero() {
            return Err(Error::config("close_timeout must be greater than zero"));
        }
        self.connection.validate()
    }
}

/// Parses `url` and checks it is a WebSocket URL.
///
/// # Errors
///
/// - [`Error::Url`] if `url` does not parse
/// - [`Error::Config`] if the scheme is not `ws` or `wss`
pub fn parse_ws_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        other => Err(Error::config(format!(
            "Unsupported scheme '{other}' (expected ws or wss)"
        ))),
    }
}

// ============================================================================
// Command
// ============================================================================

/// Internal commands for the event loop.
enum Command {
    /// Write a frame.
    Send(Message),
    /// Send a close frame and wait for the peer to acknowledge it.
    Close,
}

// ============================================================================
// WebSocketConnection
// ============================================================================

/// Root transport over a WebSocket.
///
/// Created in the `opening` state. Attach listeners and layers, then call
/// [`start`](Self::start) to launch the event loop, which raises `open`
/// first thing.
///
/// # Example
///
/// ```ignore
/// let ws = WebSocketConnection::connect("ws://127.0.0.1:9000", WebSocketOptions::new()).await?;
/// let text = ws.stack(TextLayer::new())?;
/// text.on(EventKind::Message, |event| println!("{:?}", event.message()));
/// ws.start();
/// ```
pub struct WebSocketConnection {
    lifecycle: Lifecycle<Payload>,
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<Command>,
    /// Releases the event loop; taken by `start`.
    start_tx: Mutex<Option<oneshot::Sender<()>>>,
    /// Remote address or URL, for logs.
    peer: String,
}

// ============================================================================
// WebSocketConnection - Constructors
// ============================================================================

impl WebSocketConnection {
    /// Connects to a WebSocket server.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `options` or the URL scheme are invalid
    /// - [`Error::Url`] if `url` does not parse
    /// - [`Error::ConnectionTimeout`] if the handshake exceeds `connect_timeout`
    /// - [`Error::WebSocket`] if the handshake fails
    pub async fn connect(url: &str, options: WebSocketOptions) -> Result<Arc<Self>> {
        options.validate()?;
        let url = parse_ws_url(url)?;

        let (stream, _response) = timeout(
            options.connect_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        .map_err(|_| Error::connection_timeout(options.connect_timeout.as_millis() as u64))??;

        info!(%url, "WebSocket connection established");

        Self::from_stream(stream, url.to_string(), &options)
    }

    /// Wraps an established WebSocket stream and spawns its event loop.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `options` are invalid.
    pub fn from_stream<S>(
        stream: WebSocketStream<S>,
        peer: String,
        options: &WebSocketOptions,
    ) -> Result<Arc<Self>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        options.validate()?;

        let lifecycle = Lifecycle::new(&options.connection)?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (start_tx, start_rx) = oneshot::channel();

        let connection = Arc::new(Self {
            lifecycle,
            command_tx,
            start_tx: Mutex::new(Some(start_tx)),
            peer,
        });

        tokio::spawn(Self::run_event_loop(
            Arc::downgrade(&connection),
            stream,
            command_rx,
            start_rx,
            options.close_timeout,
        ));

        Ok(connection)
    }
}

// ============================================================================
// WebSocketConnection - Public API
// ============================================================================

impl WebSocketConnection {
    /// Releases the event loop. Returns `false` if already started or if
    /// the connection was closed while still opening.
    pub fn start(&self) -> bool {
        let mut start_tx = self.start_tx.lock();
        if self.lifecycle.state() != ConnectionState::Opening {
            start_tx.take();
            return false;
        }
        match start_tx.take() {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Returns the remote address or URL.
    #[inline]
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    fn command(&self, command: Command) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| Error::ConnectionClosed)
    }
}

// ============================================================================
// WebSocketConnection - Event Loop
// ============================================================================

impl WebSocketConnection {
    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        weak: Weak<Self>,
        stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<Command>,
        start_rx: oneshot::Receiver<()>,
        close_timeout: Duration,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        // A close requested while still opening is honored without starting.
        let started = tokio::select! {
            started = start_rx => started.is_ok(),
            command = command_rx.recv() => match command {
                Some(Command::Close) => {
                    debug!("Close requested before start");
                    let (mut ws_write, mut ws_read) = stream.split();
                    let outcome = match ws_write.close().await {
                        Ok(()) => {
                            Self::drain(&mut ws_read, close_timeout).await;
                            Ok(())
                        }
                        Err(e) => Err(Error::from(e)),
                    };
                    Self::finish(&weak, outcome);
                    return;
                }
                // Sends are gated on `opened`, which needs `start`.
                Some(Command::Send(_)) | None => false,
            },
        };

        if !started {
            debug!("Connection dropped before start");
            return;
        }

        match weak.upgrade() {
            Some(this) => {
                this.lifecycle.signal_open();
            }
            None => return,
        }

        let (mut ws_write, mut ws_read) = stream.split();

        let outcome: Result<()> = loop {
            tokio::select! {
                // Incoming frames from the peer
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::deliver(&weak, Payload::Text(text.as_str().to_owned()));
                        }

                        Some(Ok(Message::Binary(data))) => {
                            Self::deliver(&weak, Payload::Binary(data.to_vec()));
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "WebSocket closed by remote");
                            // Reading on flushes tungstenite's queued close reply.
                            Self::drain(&mut ws_read, close_timeout).await;
                            break Ok(());
                        }

                        Some(Err(e)) => break Err(Error::from(e)),

                        None => {
                            debug!("WebSocket stream ended");
                            break Ok(());
                        }

                        // Ping and Pong are answered by tungstenite
                        Some(Ok(_)) => {}
                    }
                }

                // Commands from the connection
                command = command_rx.recv() => {
                    match command {
                        Some(Command::Send(message)) => {
                            if let Err(e) = ws_write.send(message).await {
                                break Err(Error::from(e));
                            }
                            trace!("Frame sent");
                        }

                        Some(Command::Close) => {
                            debug!("Close requested");
                            if let Err(e) = ws_write.close().await {
                                break Err(Error::from(e));
                            }
                            Self::drain(&mut ws_read, close_timeout).await;
                            break Ok(());
                        }

                        None => {
                            debug!("Command channel closed");
                            break Ok(());
                        }
                    }
                }
            }
        };

        Self::finish(&weak, outcome);
    }

    /// Raises the close or error signal for the loop's outcome.
    fn finish(weak: &Weak<Self>, outcome: Result<()>) {
        if let Some(this) = weak.upgrade() {
            match outcome {
                Ok(()) => {
                    this.lifecycle.signal_close();
                }
                Err(e) => {
                    warn!(connection = %this.lifecycle.id(), error = %e, "WebSocket error");
                    this.lifecycle.signal_error(e);
                }
            }
        }

        debug!("Event loop terminated");
    }

    /// Raises a message signal if the connection is still alive.
    fn deliver(weak: &Weak<Self>, payload: Payload) {
        if let Some(this) = weak.upgrade() {
            trace!(connection = %this.lifecycle.id(), len = payload.len(), "Frame received");
            this.lifecycle.signal_message(payload);
        }
    }

    /// Reads until the closing handshake completes and the stream ends, or
    /// `close_timeout` expires.
    async fn drain<S>(ws_read: &mut SplitStream<WebSocketStream<S>>, close_timeout: Duration)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let drain = async {
            while let Some(Ok(message)) = ws_read.next().await {
                trace!(close = message.is_close(), "Frame drained while closing");
            }
        };

        if timeout(close_timeout, drain).await.is_err() {
            warn!(
                timeout_ms = close_timeout.as_millis() as u64,
                "Closing handshake did not complete"
            );
        }
    }
}

// ============================================================================
// Connection Implementation
// ============================================================================

impl Connection for WebSocketConnection {
    type Message = Payload;

    fn lifecycle(&self) -> &Lifecycle<Payload> {
        &self.lifecycle
    }

    fn request_send(&self, data: Payload) -> Result<()> {
        self.command(Command::Send(data.into()))
    }

    fn request_close(&self) {
        if self.command(Command::Close).is_err() {
            trace!(connection = %self.lifecycle.id(), "Event loop already gone");
        }
    }

    fn as_raw_close(&self) -> Option<&dyn RawClose> {
        Some(self)
    }
}

/// Closes the socket with a close frame, leaving the lifecycle in its
/// current state until the socket is gone.
impl RawClose for WebSocketConnection {
    fn raw_close(&self) {
        if self.command(Command::Close).is_err() {
            trace!(connection = %self.lifecycle.id(), "Event loop already gone");
        }
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        trace!(connection = %self.lifecycle.id(), peer = %self.peer, "WebSocket connection dropped");
    }
}

// ============================================================================
// Tests
// ============================================================================
