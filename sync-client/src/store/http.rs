//! HttpStore - the message store over its JSON HTTP API.

use super::{MessageStore, StoreError};
use async_trait::async_trait;
use std::time::Duration;
use threadline_core::AuthToken;
use threadline_types::records::{
    ApiErrorBody, ConversationRecord, CreateMessageRequest, CreateMessageResponse, MessageRecord,
    UserRecord,
};
use threadline_types::{Conversation, ConversationId, Identity, Message, UserId};

/// Message store reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    /// Create a store client for `base_url` (e.g. `http://localhost:8000`).
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .ok()
            .and_then(|body| body.message)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
        Err(StoreError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<R: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<R, StoreError> {
        self.send(request)
            .await?
            .json::<R>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MessageStore for HttpStore {
    async fn list_conversations(&self, user_id: &UserId) -> Result<Vec<Conversation>, StoreError> {
        let request = self
            .client
            .get(self.url(&format!("/api/conversations/{}", user_id)));
        let records: Vec<ConversationRecord> = self.get_json(request).await?;

        let mut conversations = Vec::with_capacity(records.len());
        for record in records {
            match record.into_conversation() {
                Ok(conversation) => conversations.push(conversation),
                Err(e) => tracing::warn!("Skipping conversation record: {}", e),
            }
        }
        Ok(conversations)
    }

    async fn list_peers(&self, user_id: &UserId) -> Result<Vec<Identity>, StoreError> {
        let request = self.client.get(self.url(&format!("/api/users/{}", user_id)));
        let records: Vec<UserRecord> = self.get_json(request).await?;
        Ok(records.into_iter().map(UserRecord::into_identity).collect())
    }

    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        receiver_id: &UserId,
    ) -> Result<Vec<Message>, StoreError> {
        let request = self
            .client
            .get(self.url(&format!("/api/message/{}", conversation_id)))
            .query(&[
                ("senderId", sender_id.as_str()),
                ("receiverId", receiver_id.as_str()),
            ]);
        let records: Vec<MessageRecord> = self.get_json(request).await?;
        Ok(records
            .into_iter()
            .map(|record| record.into_message(conversation_id.clone()))
            .collect())
    }

    async fn create_message(
        &self,
        request: &CreateMessageRequest,
    ) -> Result<Option<ConversationId>, StoreError> {
        let response = self
            .send(self.client.post(self.url("/api/message")).json(request))
            .await?;

        let text = response
            .text()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(assigned_conversation(&text))
    }

    async fn logout(&self, token: &AuthToken) -> Result<(), StoreError> {
        self.send(
            self.client
                .post(self.url("/api/logout"))
                .bearer_auth(token.expose()),
        )
        .await?;
        Ok(())
    }
}

/// The conversation id named by a create-message reply.
///
/// The store may answer with plain text; only a JSON body names the
/// conversation.
fn assigned_conversation(text: &str) -> Option<ConversationId> {
    match serde_json::from_str::<CreateMessageResponse>(text) {
        Ok(body) => body.conversation_id,
        Err(e) => {
            if !text.trim().is_empty() {
                tracing::debug!(
                    "Create reply is not JSON ({}); no conversation assigned: {:?}",
                    e,
                    text
                );
            }
            None
        }
    }
}
