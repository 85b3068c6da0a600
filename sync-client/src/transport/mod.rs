//! Transport abstraction for the Threadline live channel.
//!
//! This module provides a pluggable transport layer that abstracts the
//! underlying connection mechanism (WebSocket, mock for testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `connect()` establishes a connection
//! - `send()` transmits one JSON event frame
//! - `recv()` waits for the next incoming frame
//! - `close()` terminates the connection
//!
//! `send()` and `recv()` may be called concurrently: the connection manager
//! runs a reader task while sends happen on the caller's task.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.connect("ws://localhost:8080").await?;
//! transport.send(&event.to_bytes()?).await?;
//! let frame = transport.recv().await?;
//! ```

mod mock;
mod websocket;

pub use mock::MockTransport;
pub use websocket::{WebSocketTransport, WebSocketTransportConfig};

use async_trait::async_trait;
use thiserror::Error;

/// Maximum size of a single live channel frame.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Frame exceeds [`MAX_MESSAGE_SIZE`].
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Size of the rejected frame.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Connection timeout.
    #[error("connection timeout")]
    Timeout,
}

/// Transport trait for the live event channel.
///
/// Implementations handle the underlying connection mechanism
/// (WebSocket, mock, etc).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the live channel endpoint at the given address.
    async fn connect(&self, address: &str) -> Result<(), TransportError>;

    /// Send one frame over the connection.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Receive the next frame.
    ///
    /// Waits until a frame is available or the connection closes.
    async fn recv(&self) -> Result<Vec<u8>, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection. Safe to call when not connected.
    async fn close(&self) -> Result<(), TransportError>;
}
