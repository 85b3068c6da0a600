//! Live channel events for Threadline.
//!
//! Every frame on the live channel is one JSON object tagged by `type`.
//! Outgoing: [`RegisterPresence`] (`addUser`) and [`SendMessage`]
//! (`sendMessage`). Incoming: [`DeliverMessage`] (`getMessage`) and
//! [`ActiveUsers`] (`getUsers`). No acknowledgement event exists.

use serde::{Deserialize, Serialize};

use crate::{ConversationId, Message, MessageOrigin, Nonce, UserId, WireError};

/// All possible live channel events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LiveEvent {
    /// Register this user so the server can route messages to us
    #[serde(rename = "addUser")]
    RegisterPresence(RegisterPresence),
    /// Publish a message to a peer
    #[serde(rename = "sendMessage")]
    SendMessage(SendMessage),
    /// A message pushed to us
    #[serde(rename = "getMessage")]
    DeliverMessage(DeliverMessage),
    /// Roster of users currently registered on the channel
    #[serde(rename = "getUsers")]
    ActiveUsers(ActiveUsers),
}

impl LiveEvent {
    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Serialization)
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(bytes).map_err(WireError::Deserialization)
    }
}

/// Presence announcement, sent once per established channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPresence {
    /// The user announcing presence
    pub user_id: UserId,
}

/// Outgoing message publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    /// Target conversation (may be the sentinel for a first message)
    pub conversation_id: ConversationId,
    /// Author (the session user)
    pub sender_id: UserId,
    /// Recipient peer
    pub receiver_id: UserId,
    /// Message text
    #[serde(rename = "message")]
    pub body: String,
    /// Correlation id for echo suppression
    pub nonce: Nonce,
}

/// Incoming message push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverMessage {
    /// Conversation the message belongs to
    pub conversation_id: ConversationId,
    /// Author of the message
    pub sender_id: UserId,
    /// Message text
    #[serde(rename = "message")]
    pub body: String,
    /// Correlation id, present when the author's client attached one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Nonce>,
}

impl DeliverMessage {
    /// Convert into a live [`Message`].
    pub fn into_message(self) -> Message {
        Message {
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            body: self.body,
            nonce: self.nonce,
            origin: MessageOrigin::Live,
        }
    }
}

impl From<SendMessage> for DeliverMessage {
    fn from(sent: SendMessage) -> Self {
        Self {
            conversation_id: sent.conversation_id,
            sender_id: sent.sender_id,
            body: sent.body,
            nonce: Some(sent.nonce),
        }
    }
}

/// Roster of users present on the live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveUsers {
    /// Users currently registered
    pub users: Vec<RegisterPresence>,
}
