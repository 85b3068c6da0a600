//! The active thread: the one conversation currently on screen.

use serde::Serialize;
use threadline_types::{ConversationId, Identity, Message, Nonce};

/// What the user selected: a conversation id (or the sentinel) and its peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadTarget {
    /// Conversation to show; the sentinel for a peer with no conversation.
    pub conversation_id: ConversationId,
    /// The other participant.
    pub peer: Identity,
}

impl ThreadTarget {
    /// Create a target.
    pub fn new(conversation_id: ConversationId, peer: Identity) -> Self {
        Self {
            conversation_id,
            peer,
        }
    }

    /// Two targets denote the same thread when their real ids match, or when
    /// both are unsent threads with the same peer.
    pub fn same_thread(&self, other: &ThreadTarget) -> bool {
        if self.conversation_id.is_sentinel() || other.conversation_id.is_sentinel() {
            self.conversation_id == other.conversation_id && self.peer.id == other.peer.id
        } else {
            self.conversation_id == other.conversation_id
        }
    }
}

/// Selection lifecycle of the active thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadPhase {
    /// Nothing selected.
    NoneSelected,
    /// History fetch in flight.
    LoadingHistory,
    /// History seeded; live events append and sends are allowed.
    Ready,
}

/// Delivery state of a message in the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Stored (history or live) or confirmed by the store.
    Delivered,
    /// Our own send, durable write not yet confirmed.
    Pending,
    /// Our own send, durable write failed.
    Failed,
}

/// A message as displayed in the thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadMessage {
    /// The message.
    pub message: Message,
    /// Delivery state.
    pub status: DeliveryStatus,
}

/// The ordered message list of the active thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveThreadView {
    /// Conversation shown (the sentinel until the first send is stored).
    pub conversation_id: ConversationId,
    /// The other participant.
    pub peer: Identity,
    /// Messages: history first, then live/local in receipt order.
    pub messages: Vec<ThreadMessage>,
}

impl ActiveThreadView {
    /// Seed a view from a target and its historical messages.
    pub fn seeded(target: ThreadTarget, history: Vec<Message>) -> Self {
        Self {
            conversation_id: target.conversation_id,
            peer: target.peer,
            messages: history
                .into_iter()
                .map(|message| ThreadMessage {
                    message,
                    status: DeliveryStatus::Delivered,
                })
                .collect(),
        }
    }

    /// The target this view shows.
    pub fn target(&self) -> ThreadTarget {
        ThreadTarget::new(self.conversation_id.clone(), self.peer.clone())
    }

    /// Message bodies in display order.
    pub fn bodies(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.message.body.as_str()).collect()
    }

    pub(crate) fn push(&mut self, message: Message, status: DeliveryStatus) {
        self.messages.push(ThreadMessage { message, status });
    }

    pub(crate) fn set_status(&mut self, nonce: &Nonce, status: DeliveryStatus) -> bool {
        match self
            .messages
            .iter_mut()
            .find(|m| m.message.nonce.as_ref() == Some(nonce))
        {
            Some(entry) => {
                entry.status = status;
                true
            }
            None => false,
        }
    }

    /// Replace the sentinel id on the view and its messages.
    pub(crate) fn assign_conversation(&mut self, id: &ConversationId) {
        for entry in &mut self.messages {
            if entry.message.conversation_id.is_sentinel() {
                entry.message.conversation_id = id.clone();
            }
        }
        self.conversation_id = id.clone();
    }
}
