//! WebSocketTransport - the live channel over tokio-tungstenite.
//!
//! Each live event travels as one text frame holding its JSON encoding.
//! The socket is split so the reader task can wait in `recv()` while
//! sends go out on other tasks.

use super::{Transport, TransportError, MAX_MESSAGE_SIZE};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for WebSocketTransport.
#[derive(Clone, Debug)]
pub struct WebSocketTransportConfig {
    /// Connection (TCP + upgrade) timeout.
    pub connect_timeout: Duration,
    /// Largest frame accepted in either direction.
    pub max_message_size: usize,
}

impl Default for WebSocketTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

/// WebSocketTransport implements the Transport trait over a `ws://` or
/// `wss://` connection.
///
/// # Example
///
/// ```ignore
/// let transport = WebSocketTransport::new();
/// transport.connect("ws://localhost:8080").await?;
/// transport.send(br#"{"type":"addUser","userId":"u1"}"#).await?;
/// let frame = transport.recv().await?;
/// ```
pub struct WebSocketTransport {
    config: WebSocketTransportConfig,
    sink: Mutex<Option<SplitSink<Socket, Frame>>>,
    stream: Mutex<Option<SplitStream<Socket>>>,
    connected: AtomicBool,
}

impl WebSocketTransport {
    /// Create a transport with default configuration.
    pub fn new() -> Self {
        Self::with_config(WebSocketTransportConfig::default())
    }

    /// Create a transport with custom configuration.
    pub fn with_config(config: WebSocketTransportConfig) -> Self {
        Self {
            config,
            sink: Mutex::new(None),
            stream: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    fn check_size(&self, size: usize) -> Result<(), TransportError> {
        if size > self.config.max_message_size {
            return Err(TransportError::FrameTooLarge {
                size,
                max: self.config.max_message_size,
            });
        }
        Ok(())
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("config", &self.config)
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        // Drop any previous socket
        self.close().await.ok();

        let (socket, _response) = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(address),
        )
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|e| TransportError::ConnectionFailed(format!("{address}: {e}")))?;

        let (sink, stream) = socket.split();
        *self.sink.lock().await = Some(sink);
        *self.stream.lock().await = Some(stream);
        self.connected.store(true, Ordering::SeqCst);

        tracing::debug!("Live channel opened to {}", address);
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        self.check_size(data.len())?;
        let text = String::from_utf8(data.to_vec())
            .map_err(|e| TransportError::SendFailed(format!("frame is not UTF-8: {e}")))?;

        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;

        if let Err(e) = sink.send(Frame::Text(text.into())).await {
            self.connected.store(false, Ordering::SeqCst);
            return Err(TransportError::SendFailed(e.to_string()));
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(TransportError::ConnectionClosed)?;

        loop {
            match stream.next().await {
                Some(Ok(Frame::Text(text))) => {
                    self.check_size(text.len())?;
                    return Ok(text.as_bytes().to_vec());
                }
                Some(Ok(Frame::Binary(bytes))) => {
                    self.check_size(bytes.len())?;
                    return Ok(bytes.to_vec());
                }
                // Pings are answered by tungstenite on the next write
                Some(Ok(Frame::Ping(_) | Frame::Pong(_) | Frame::Frame(_))) => continue,
                Some(Ok(Frame::Close(_))) | None => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(TransportError::ConnectionClosed);
                }
                Some(Err(e)) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);

        // The stream half may be held by a reader waiting in recv(); it ends
        // once the close handshake completes.
        if let Some(mut sink) = self.sink.lock().await.take() {
            sink.close().await.ok();
        }
        if let Ok(mut stream) = self.stream.try_lock() {
            stream.take();
        }
        Ok(())
    }
}
