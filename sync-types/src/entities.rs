//! Session entities: who we are, who we talk to, and what was said.

use serde::{Deserialize, Serialize};

use crate::{ConversationId, Nonce, UserId};

/// A user as known to the message store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Store-assigned user id
    pub id: UserId,
    /// Human-readable name
    #[serde(rename = "fullName")]
    pub display_name: String,
    /// Contact email
    pub email: String,
}

impl Identity {
    /// Create a new identity.
    pub fn new(id: impl Into<UserId>, display_name: &str, email: &str) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.to_string(),
            email: email.to_string(),
        }
    }
}

/// An existing conversation between the session user and one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Store-assigned conversation id (never the sentinel)
    pub conversation_id: ConversationId,
    /// The other participant
    pub peer: Identity,
}

/// Where a message entered the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrigin {
    /// Returned by a historical fetch
    History,
    /// Pushed over the live channel
    Live,
    /// Appended locally by our own send
    Local,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Conversation this message belongs to
    pub conversation_id: ConversationId,
    /// Author of the message
    pub sender_id: UserId,
    /// Message text
    pub body: String,
    /// Client correlation id, when the sender attached one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Nonce>,
    /// How the message reached us
    pub origin: MessageOrigin,
}

impl Message {
    /// Create a message that came from a historical fetch.
    pub fn from_history(conversation_id: ConversationId, sender_id: UserId, body: &str) -> Self {
        Self {
            conversation_id,
            sender_id,
            body: body.to_string(),
            nonce: None,
            origin: MessageOrigin::History,
        }
    }

    /// Whether this message was authored by the given user.
    pub fn is_from(&self, user_id: &UserId) -> bool {
        &self.sender_id == user_id
    }
}
