//! Outgoing message tracking for Threadline.
//!
//! Every send is published on the live channel and written to the message
//! store. Between those two steps the message sits in the outbox:
//! - `enqueue()` - the send has been issued, waiting for the store write
//! - `ack()` - the store write succeeded, entry removed
//! - `nack()` - the store write failed, entry kept as failed for resend
//! - `rearm()` - a failed entry is being resent with the same content
//!
//! The outbox is bounded so a stuck store cannot grow it without limit.

use std::collections::HashMap;
use thiserror::Error;
use threadline_types::{ConversationId, Nonce, UserId};

/// Error type for outbox operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutboxError {
    /// Outbox is at capacity.
    #[error("outbox full (capacity: {capacity})")]
    Full {
        /// Current outbox capacity.
        capacity: usize,
    },
}

/// A send waiting for its durable write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    /// Correlation id of the send.
    pub nonce: Nonce,
    /// Conversation the send targeted (may be the sentinel).
    pub conversation_id: ConversationId,
    /// Recipient peer.
    pub receiver_id: UserId,
    /// Message text.
    pub body: String,
    /// Whether the durable write failed.
    pub failed: bool,
}

impl PendingSend {
    /// Create a new in-flight send.
    pub fn new(nonce: Nonce, conversation_id: ConversationId, receiver_id: UserId, body: &str) -> Self {
        Self {
            nonce,
            conversation_id,
            receiver_id,
            body: body.to_string(),
            failed: false,
        }
    }
}

/// Outgoing sends keyed by nonce.
#[derive(Debug)]
pub struct Outbox {
    /// Maximum number of entries (in flight + failed).
    max_size: usize,
    entries: HashMap<Nonce, PendingSend>,
}

impl Outbox {
    /// Create a new outbox with the given maximum size.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            entries: HashMap::new(),
        }
    }

    /// Track a new in-flight send.
    ///
    /// Returns an error if the outbox is full.
    pub fn enqueue(&mut self, send: PendingSend) -> Result<(), OutboxError> {
        if self.entries.len() >= self.max_size {
            return Err(OutboxError::Full {
                capacity: self.max_size,
            });
        }
        self.entries.insert(send.nonce, send);
        Ok(())
    }

    /// Acknowledge the durable write. Returns the completed entry.
    pub fn ack(&mut self, nonce: &Nonce) -> Option<PendingSend> {
        self.entries.remove(nonce)
    }

    /// Record a failed durable write. The entry stays for resend.
    pub fn nack(&mut self, nonce: &Nonce) {
        if let Some(entry) = self.entries.get_mut(nonce) {
            entry.failed = true;
        }
    }

    /// Put a failed entry back in flight, returning it for resending.
    ///
    /// Returns `None` if the nonce is unknown or the entry has not failed.
    pub fn rearm(&mut self, nonce: &Nonce) -> Option<PendingSend> {
        let entry = self.entries.get_mut(nonce)?;
        if !entry.failed {
            return None;
        }
        entry.failed = false;
        Some(entry.clone())
    }

    /// Point a peer's sentinel entries at the conversation the store assigned.
    pub fn retarget(&mut self, receiver_id: &UserId, to: &ConversationId) {
        for entry in self.entries.values_mut() {
            if entry.conversation_id.is_sentinel() && &entry.receiver_id == receiver_id {
                entry.conversation_id = to.clone();
            }
        }
    }

    /// Check if a send is waiting for its durable write.
    pub fn is_pending(&self, nonce: &Nonce) -> bool {
        self.entries.get(nonce).is_some_and(|e| !e.failed)
    }

    /// Check if a send failed and awaits resend.
    pub fn is_failed(&self, nonce: &Nonce) -> bool {
        self.entries.get(nonce).is_some_and(|e| e.failed)
    }

    /// Number of in-flight sends.
    pub fn pending_count(&self) -> usize {
        self.entries.values().filter(|e| !e.failed).count()
    }

    /// Number of failed sends.
    pub fn failed_count(&self) -> usize {
        self.entries.values().filter(|e| e.failed).count()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the outbox is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
