//! Message store abstraction: the persistent request/response data source.
//!
//! The store owns durable state: the conversation list, the user list, and
//! stored message history. Writes made here are what later fetches return.
//!
//! # Example
//!
//! ```ignore
//! let store = HttpStore::new(&config)?;
//! let conversations = store.list_conversations(&user_id).await?;
//! ```

mod http;
mod mock;

pub use http::HttpStore;
pub use mock::MockStore;

use async_trait::async_trait;
use thiserror::Error;
use threadline_core::AuthToken;
use threadline_types::records::CreateMessageRequest;
use threadline_types::{Conversation, ConversationId, Identity, Message, UserId, WireError};

/// Message store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request could not be sent or no response arrived.
    #[error("request failed: {0}")]
    Request(String),

    /// The store answered with a non-success status.
    #[error("store returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Reason given by the store, or the status text.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),

    /// A decoded record was not usable.
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Persistent data source for conversations, users, and message history.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Conversations of `user_id`, in the order the store returns them.
    async fn list_conversations(&self, user_id: &UserId) -> Result<Vec<Conversation>, StoreError>;

    /// Users `user_id` may talk to, in the order the store returns them.
    async fn list_peers(&self, user_id: &UserId) -> Result<Vec<Identity>, StoreError>;

    /// Stored messages of a conversation in stored order.
    ///
    /// For the sentinel conversation the store resolves the thread from the
    /// sender and receiver.
    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        receiver_id: &UserId,
    ) -> Result<Vec<Message>, StoreError>;

    /// Store a message. Returns the conversation it was stored in, when the
    /// store reports one.
    async fn create_message(
        &self,
        request: &CreateMessageRequest,
    ) -> Result<Option<ConversationId>, StoreError>;

    /// End the server-side session for `token`.
    async fn logout(&self, token: &AuthToken) -> Result<(), StoreError>;
}
