//! Mock transport for testing.
//!
//! Allows pushing incoming frames, capturing sent frames, injecting
//! failures, and holding `connect()` open to exercise concurrent callers.

use super::{Transport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use threadline_types::LiveEvent;
use tokio::sync::{watch, Notify};

/// Mock transport for testing.
///
/// Clones share state, so a test can keep one handle while the client owns
/// another.
#[derive(Debug)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    incoming: Arc<Notify>,
    hold: Arc<watch::Sender<bool>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connected: bool,
    connected_address: Option<String>,
    connect_attempts: usize,
    close_count: usize,
    sent_messages: Vec<Vec<u8>>,
    receive_queue: VecDeque<Vec<u8>>,
    fail_next_connect: Option<String>,
    fail_next_send: Option<String>,
    fail_next_recv: Option<String>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        let (hold, _) = watch::channel(false);
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner::default())),
            incoming: Arc::new(Notify::new()),
            hold: Arc::new(hold),
        }
    }

    /// Queue a frame to be returned by `recv()`.
    pub fn push_incoming(&self, data: Vec<u8>) {
        self.inner.lock().unwrap().receive_queue.push_back(data);
        self.incoming.notify_one();
    }

    /// Queue an event to be returned by `recv()`.
    pub fn push_event(&self, event: &LiveEvent) {
        self.push_incoming(event.to_bytes().unwrap());
    }

    /// Get all frames that were sent.
    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().sent_messages.clone()
    }

    /// Get all sent frames decoded as events (undecodable frames skipped).
    pub fn sent_events(&self) -> Vec<LiveEvent> {
        self.sent_messages()
            .iter()
            .filter_map(|bytes| LiveEvent::from_bytes(bytes).ok())
            .collect()
    }

    /// Get the address that was connected to.
    pub fn connected_address(&self) -> Option<String> {
        self.inner.lock().unwrap().connected_address.clone()
    }

    /// Number of `connect()` calls made so far.
    pub fn connect_attempts(&self) -> usize {
        self.inner.lock().unwrap().connect_attempts
    }

    /// Number of `close()` calls made so far.
    pub fn close_count(&self) -> usize {
        self.inner.lock().unwrap().close_count
    }

    /// Make `connect()` wait until [`release_connect`](Self::release_connect).
    pub fn hold_connect(&self) {
        self.hold.send_replace(true);
    }

    /// Let held and future `connect()` calls proceed.
    pub fn release_connect(&self) {
        self.hold.send_replace(false);
    }

    /// Simulate the server dropping the connection.
    pub fn drop_connection(&self) {
        self.inner.lock().unwrap().connected = false;
        self.incoming.notify_one();
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_connect = Some(error.to_string());
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_send = Some(error.to_string());
    }

    /// Cause the next recv() to fail with the given error.
    pub fn fail_next_recv(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_recv = Some(error.to_string());
        self.incoming.notify_one();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            incoming: Arc::clone(&self.incoming),
            hold: Arc::clone(&self.hold),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        self.inner.lock().unwrap().connect_attempts += 1;

        let mut held = self.hold.subscribe();
        let _ = held.wait_for(|hold| !*hold).await;

        let mut inner = self.inner.lock().unwrap();

        // Check for forced failure
        if let Some(error) = inner.fail_next_connect.take() {
            return Err(TransportError::ConnectionFailed(error));
        }

        inner.connected = true;
        inner.connected_address = Some(address.to_string());
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner.sent_messages.push(data.to_vec());
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();

                if !inner.connected {
                    return Err(TransportError::ConnectionClosed);
                }

                if let Some(error) = inner.fail_next_recv.take() {
                    return Err(TransportError::ReceiveFailed(error));
                }

                if let Some(frame) = inner.receive_queue.pop_front() {
                    return Ok(frame);
                }
            }
            self.incoming.notified().await;
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.connected = false;
            inner.close_count += 1;
        }
        self.incoming.notify_one();
        Ok(())
    }
}
