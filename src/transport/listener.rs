//! WebSocket listener for inbound connections.
//!
//! # Connection Flow
//!
//! 1. Bind to `ip:port` (port 0 picks a random free port)
//! 2. Hand [`WebSocketListener::ws_url`] to the peer
//! 3. [`WebSocketListener::accept`] waits for the peer and upgrades to WebSocket
//! 4. Attach layers to the returned connection, then call `start`

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::websocket::{WebSocketConnection, WebSocketOptions};

// ============================================================================
// WebSocketListener
// ============================================================================

/// A bound WebSocket server socket.
///
/// # Example
///
/// ```ignore
/// use std::net::{IpAddr, Ipv4Addr};
/// use layered_connection::transport::WebSocketListener;
///
/// let listener = WebSocketListener::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await?;
/// let url = listener.ws_url();
///
/// // Give url to the peer...
///
/// let connection = listener.accept().await?;
/// ```
pub struct WebSocketListener {
    /// TCP listener for incoming connections.
    listener: TcpListener,
    /// Address the listener is bound to.
    local_addr: SocketAddr,
    /// Options for accepted connections.
    options: WebSocketOptions,
}

impl WebSocketListener {
    /// Binds to the specified address and port with default options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        Self::bind_with(ip, port, WebSocketOptions::new()).await
    }

    /// Binds to the specified address and port.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `options` are invalid
    /// - [`Error::Io`] if binding fails
    pub async fn bind_with(ip: IpAddr, port: u16, options: WebSocketOptions) -> Result<Self> {
        options.validate()?;

        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, "WebSocket listener bound");

        Ok(Self {
            listener,
            local_addr,
            options,
        })
    }

    /// Returns the port the listener is bound to.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the local socket address.
    #[inline]
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the WebSocket URL for this listener.
    ///
    /// Format: `ws://{ip}:{port}`
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Accepts one connection and completes the WebSocket upgrade.
    ///
    /// The connection is returned in the `opening` state; call
    /// [`WebSocketConnection::start`] once layers are attached.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if no peer connects within `connect_timeout`
    /// - [`Error::Connection`] if the WebSocket upgrade fails
    pub async fn accept(&self) -> Result<Arc<WebSocketConnection>> {
        let connect_timeout = self.options.connect_timeout;

        let (stream, addr) = timeout(connect_timeout, self.listener.accept())
            .await
            .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))??;

        debug!(%addr, "TCP connection accepted");

        let ws_stream = timeout(connect_timeout, tokio_tungstenite::accept_async(stream))
            .await
            .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))?
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        info!(%addr, port = self.port(), "WebSocket connection accepted");

        WebSocketConnection::from_stream(ws_stream, addr.to_string(), &self.options)
    }
}

// ============================================================================
// Tests
// ============================================================================
