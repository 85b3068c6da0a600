//! JSON records exchanged with the message store API.
//!
//! These mirror the store's response shapes and are converted into the
//! session entities ([`Conversation`], [`Identity`], [`Message`]) at the
//! client boundary.

use serde::{Deserialize, Serialize};

use crate::{Conversation, ConversationId, Identity, Message, UserId, WireError};

/// A peer as embedded in conversation and user listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    /// The peer's user id
    pub receiver_id: UserId,
    /// Contact email
    pub email: String,
    /// Display name
    pub full_name: String,
}

impl PeerRecord {
    /// Convert into an [`Identity`].
    pub fn into_identity(self) -> Identity {
        Identity {
            id: self.receiver_id,
            display_name: self.full_name,
            email: self.email,
        }
    }
}

/// One entry of `GET /api/conversations/{userId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    /// Conversation id
    pub conversation_id: ConversationId,
    /// The other participant
    pub user: PeerRecord,
}

impl ConversationRecord {
    /// Convert into a [`Conversation`], rejecting ids that cannot be real.
    pub fn into_conversation(self) -> Result<Conversation, WireError> {
        if self.conversation_id.as_str().is_empty() || self.conversation_id.is_sentinel() {
            return Err(WireError::InvalidData(format!(
                "store returned unusable conversation id {:?}",
                self.conversation_id.as_str()
            )));
        }
        Ok(Conversation {
            conversation_id: self.conversation_id,
            peer: self.user.into_identity(),
        })
    }
}

/// One entry of `GET /api/users/{userId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// The listed user's id
    pub user_id: UserId,
    /// Profile of the listed user
    pub user: PeerRecord,
}

impl UserRecord {
    /// Convert into an [`Identity`].
    pub fn into_identity(self) -> Identity {
        self.user.into_identity()
    }
}

/// Author profile embedded in message listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorRecord {
    /// Author's user id
    pub id: UserId,
    /// Contact email
    #[serde(default)]
    pub email: String,
    /// Display name
    #[serde(default)]
    pub full_name: String,
}

/// One entry of `GET /api/message/{conversationId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Who wrote the message
    pub user: AuthorRecord,
    /// Message text
    pub message: String,
}

impl MessageRecord {
    /// Convert into a historical [`Message`] of the given conversation.
    pub fn into_message(self, conversation_id: ConversationId) -> Message {
        Message::from_history(conversation_id, self.user.id, &self.message)
    }
}

/// Body of `POST /api/message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequest {
    /// Target conversation (the sentinel creates a new one)
    pub conversation_id: ConversationId,
    /// Author (the session user)
    pub sender_id: UserId,
    /// Message text
    pub message: String,
    /// Recipient peer
    pub receiver_id: UserId,
}

/// Response of `POST /api/message`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageResponse {
    /// The conversation the message was stored in
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
}

/// Error body returned by the store on non-2xx responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Human-readable failure reason
    #[serde(default)]
    pub message: Option<String>,
}
