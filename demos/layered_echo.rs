//! Layered echo over a local WebSocket.
//!
//! Demonstrates:
//! - Binding a WebSocket listener and connecting a client to it
//! - Stacking TextLayer and JsonLayer on both ends
//! - Event propagation from the socket through every layer
//! - Closing the top layer closes the socket underneath
//!
//! Usage:
//!   cargo run --example layered_echo
//!   cargo run --example layered_echo -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use layered_connection::layers::{JsonLayer, TextLayer};
use layered_connection::transport::{WebSocketConnection, WebSocketListener, WebSocketOptions};
use layered_connection::{CascadeExt, Connection, ConnectionEvent, EventKind, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Types
// ============================================================================

/// Application message exchanged by both ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Chat {
    seq: u32,
    text: String,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let debug = std::env::args().any(|a| a == "--debug");
    init_logging(debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    println!("=== Layered Echo ===\n");

    // ========================================================================
    // Connect
    // ========================================================================

    println!("[1] Binding listener...");
    let listener = WebSocketListener::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await?;
    let url = listener.ws_url();
    println!("    ✓ Listening on {url}\n");

    println!("[2] Connecting client...");
    let (server, client) = tokio::join!(
        listener.accept(),
        WebSocketConnection::connect(&url, WebSocketOptions::new())
    );
    let (server, client) = (server?, client?);
    println!("    ✓ Socket established\n");

    // ========================================================================
    // Stack Layers
    // ========================================================================

    println!("[3] Stacking text and json layers...");
    let server_chat = server
        .stack(TextLayer::new())?
        .stack(JsonLayer::<Chat>::new())?;
    let client_chat = client
        .stack(TextLayer::new())?
        .stack(JsonLayer::<Chat>::new())?;

    let echo = Arc::downgrade(&server_chat);
    server_chat.on(EventKind::Message, move |event| {
        if let (Some(chat), Some(echo)) = (event.message(), echo.upgrade()) {
            let reply = Chat {
                seq: chat.seq,
                text: chat.text.chars().rev().collect(),
            };
            if let Err(e) = echo.send(reply) {
                eprintln!("    echo failed: {e}");
            }
        }
    });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    client_chat.on_all(move |event| {
        let _ = event_tx.send(match event {
            ConnectionEvent::Open => "open".to_string(),
            ConnectionEvent::Close => "close".to_string(),
            ConnectionEvent::Error(cause) => format!("error: {cause}"),
            ConnectionEvent::Message(chat) => format!("#{} {}", chat.seq, chat.text),
        });
    });
    println!("    ✓ Layers attached\n");

    // ========================================================================
    // Exchange
    // ========================================================================

    println!("[4] Starting event loops...");
    server.start();
    client.start();

    while let Some(line) = event_rx.recv().await {
        println!("    client ← {line}");
        if line == "open" {
            break;
        }
    }

    for (seq, text) in ["hello", "layered", "world"].into_iter().enumerate() {
        client_chat.send(Chat {
            seq: seq as u32,
            text: text.to_string(),
        })?;
        if let Some(line) = event_rx.recv().await {
            println!("    client ← {line}");
        }
    }
    println!();

    // ========================================================================
    // Close
    // ========================================================================

    println!("[5] Closing client stack...");
    client_chat.close();
    while let Some(line) = event_rx.recv().await {
        println!("    client ← {line}");
        if line == "close" {
            break;
        }
    }
    println!("    ✓ client: {}, socket: {}\n", client_chat.state(), client.state());

    println!("=== Done ===");
    Ok(())
}

// ============================================================================
// Logging
// ============================================================================

fn init_logging(debug: bool) {
    let filter = if debug {
        "layered_connection=debug"
    } else {
        "layered_connection=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
