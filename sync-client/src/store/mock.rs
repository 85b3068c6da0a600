//! Mock message store for testing and offline demos.
//!
//! Behaves like the real store: conversations are created on the first
//! message between two users and history is returned in stored order.

use super::{MessageStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use threadline_core::AuthToken;
use threadline_types::records::CreateMessageRequest;
use threadline_types::{Conversation, ConversationId, Identity, Message, UserId};
use tokio::sync::watch;

/// In-memory message store.
///
/// Clones share state.
#[derive(Debug, Clone)]
pub struct MockStore {
    inner: Arc<Mutex<MockStoreInner>>,
    history_hold: Arc<watch::Sender<bool>>,
}

#[derive(Debug, Default)]
struct MockStoreInner {
    users: Vec<Identity>,
    conversations: Vec<(ConversationId, UserId, UserId)>,
    messages: HashMap<ConversationId, Vec<(UserId, String)>>,
    next_conversation: u64,
    created: Vec<CreateMessageRequest>,
    history_fetches: usize,
    logout_count: usize,
    fail_next_list: Option<String>,
    fail_next_history: Option<String>,
    fail_next_create: Option<String>,
    fail_next_logout: Option<String>,
}

impl MockStoreInner {
    fn find_between(&self, a: &UserId, b: &UserId) -> Option<ConversationId> {
        self.conversations
            .iter()
            .find(|(_, x, y)| (x == a && y == b) || (x == b && y == a))
            .map(|(id, _, _)| id.clone())
    }

    fn identity_of(&self, id: &UserId) -> Identity {
        self.users
            .iter()
            .find(|u| &u.id == id)
            .cloned()
            .unwrap_or_else(|| Identity::new(id.clone(), "", ""))
    }

    fn fresh_conversation_id(&mut self) -> ConversationId {
        loop {
            self.next_conversation += 1;
            let id = ConversationId::new(format!("c{}", self.next_conversation));
            if !self.conversations.iter().any(|(existing, _, _)| existing == &id) {
                return id;
            }
        }
    }

    fn failure(slot: &mut Option<String>) -> Result<(), StoreError> {
        match slot.take() {
            Some(message) => Err(StoreError::Status {
                status: 500,
                message,
            }),
            None => Ok(()),
        }
    }
}

impl MockStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (history_hold, _) = watch::channel(false);
        Self {
            inner: Arc::new(Mutex::new(MockStoreInner::default())),
            history_hold: Arc::new(history_hold),
        }
    }

    /// Register a user.
    pub fn add_user(&self, identity: Identity) {
        self.inner.lock().unwrap().users.push(identity);
    }

    /// Create a conversation between two users.
    pub fn add_conversation(&self, id: &str, a: &str, b: &str) {
        self.inner
            .lock()
            .unwrap()
            .conversations
            .push((id.into(), a.into(), b.into()));
    }

    /// Store a message in an existing conversation.
    pub fn add_message(&self, conversation_id: &str, sender_id: &str, body: &str) {
        self.inner
            .lock()
            .unwrap()
            .messages
            .entry(conversation_id.into())
            .or_default()
            .push((sender_id.into(), body.to_string()));
    }

    /// Every message written through `create_message`.
    pub fn created(&self) -> Vec<CreateMessageRequest> {
        self.inner.lock().unwrap().created.clone()
    }

    /// Number of `list_messages` calls made so far.
    pub fn history_fetches(&self) -> usize {
        self.inner.lock().unwrap().history_fetches
    }

    /// Number of `logout` calls made so far.
    pub fn logout_count(&self) -> usize {
        self.inner.lock().unwrap().logout_count
    }

    /// Make `list_messages` wait until [`release_history`](Self::release_history).
    pub fn hold_history(&self) {
        self.history_hold.send_replace(true);
    }

    /// Let held and future `list_messages` calls proceed.
    pub fn release_history(&self) {
        self.history_hold.send_replace(false);
    }

    /// Cause the next conversation or peer listing to fail.
    pub fn fail_next_list(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_list = Some(error.to_string());
    }

    /// Cause the next `list_messages` to fail.
    pub fn fail_next_history(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_history = Some(error.to_string());
    }

    /// Cause the next `create_message` to fail.
    pub fn fail_next_create(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_create = Some(error.to_string());
    }

    /// Cause the next `logout` to fail.
    pub fn fail_next_logout(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_logout = Some(error.to_string());
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MockStore {
    async fn list_conversations(&self, user_id: &UserId) -> Result<Vec<Conversation>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        MockStoreInner::failure(&mut inner.fail_next_list)?;

        Ok(inner
            .conversations
            .iter()
            .filter_map(|(id, a, b)| {
                let peer = if a == user_id {
                    b
                } else if b == user_id {
                    a
                } else {
                    return None;
                };
                Some(Conversation {
                    conversation_id: id.clone(),
                    peer: inner.identity_of(peer),
                })
            })
            .collect())
    }

    async fn list_peers(&self, user_id: &UserId) -> Result<Vec<Identity>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        MockStoreInner::failure(&mut inner.fail_next_list)?;

        Ok(inner
            .users
            .iter()
            .filter(|u| &u.id != user_id)
            .cloned()
            .collect())
    }

    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        receiver_id: &UserId,
    ) -> Result<Vec<Message>, StoreError> {
        self.inner.lock().unwrap().history_fetches += 1;

        let mut held = self.history_hold.subscribe();
        let _ = held.wait_for(|hold| !*hold).await;

        let mut inner = self.inner.lock().unwrap();
        MockStoreInner::failure(&mut inner.fail_next_history)?;

        let stored_id = if conversation_id.is_sentinel() {
            match inner.find_between(sender_id, receiver_id) {
                Some(id) => id,
                None => return Ok(Vec::new()),
            }
        } else {
            conversation_id.clone()
        };

        Ok(inner
            .messages
            .get(&stored_id)
            .map(|messages| {
                messages
                    .iter()
                    .map(|(author, body)| {
                        Message::from_history(stored_id.clone(), author.clone(), body)
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_message(
        &self,
        request: &CreateMessageRequest,
    ) -> Result<Option<ConversationId>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        MockStoreInner::failure(&mut inner.fail_next_create)?;

        let id = if request.conversation_id.is_sentinel() {
            match inner.find_between(&request.sender_id, &request.receiver_id) {
                Some(existing) => existing,
                None => {
                    let id = inner.fresh_conversation_id();
                    inner.conversations.push((
                        id.clone(),
                        request.sender_id.clone(),
                        request.receiver_id.clone(),
                    ));
                    id
                }
            }
        } else {
            request.conversation_id.clone()
        };

        inner
            .messages
            .entry(id.clone())
            .or_default()
            .push((request.sender_id.clone(), request.message.clone()));
        inner.created.push(request.clone());
        Ok(Some(id))
    }

    async fn logout(&self, _token: &AuthToken) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.logout_count += 1;
        MockStoreInner::failure(&mut inner.fail_next_logout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MockStore {
        let store = MockStore::new();
        store.add_user(Identity::new("u1", "Ada", "ada@example.com"));
        store.add_user(Identity::new("u2", "Bob", "bob@example.com"));
        store.add_user(Identity::new("u3", "Cleo", "cleo@example.com"));
        store
    }

    fn request(conversation: &str, body: &str) -> CreateMessageRequest {
        CreateMessageRequest {
            conversation_id: conversation.into(),
            sender_id: "u1".into(),
            message: body.into(),
            receiver_id: "u2".into(),
        }
    }

    #[tokio::test]
    async fn peers_exclude_self() {
        let peers = store().list_peers(&"u1".into()).await.unwrap();
        let names: Vec<&str> = peers.iter().map(|p| p.display_name.as_str()).collect();
        assert_eq!(names, vec!["Bob", "Cleo"]);
    }

    #[tokio::test]
    async fn conversations_resolve_the_other_side() {
        let store = store();
        store.add_conversation("c1", "u1", "u2");
        store.add_conversation("c2", "u3", "u1");
        store.add_conversation("c3", "u2", "u3");

        let conversations = store.list_conversations(&"u1".into()).await.unwrap();

        assert_eq!(conversations.len(), 2);
        assert_eq!(conversations[0].peer.display_name, "Bob");
        assert_eq!(conversations[1].peer.display_name, "Cleo");
    }

    #[tokio::test]
    async fn first_message_creates_conversation() {
        let store = store();

        let id = store.create_message(&request("new", "hi")).await.unwrap();

        assert_eq!(id, Some(ConversationId::from("c1")));
        let history = store
            .list_messages(&"c1".into(), &"u1".into(), &"u2".into())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].body, "hi");
    }

    #[tokio::test]
    async fn sentinel_reuses_existing_conversation() {
        let store = store();
        store.add_conversation("c7", "u2", "u1");
        store.add_message("c7", "u2", "old");

        let id = store.create_message(&request("new", "hi")).await.unwrap();
        assert_eq!(id, Some(ConversationId::from("c7")));

        let history = store
            .list_messages(&ConversationId::new_sentinel(), &"u1".into(), &"u2".into())
            .await
            .unwrap();
        let bodies: Vec<&str> = history.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["old", "hi"]);
        assert!(history
            .iter()
            .all(|m| m.conversation_id == ConversationId::from("c7")));
    }

    #[tokio::test]
    async fn generated_ids_skip_seeded_ones() {
        let store = store();
        store.add_conversation("c1", "u1", "u3");

        let id = store.create_message(&request("new", "hi")).await.unwrap();

        assert_eq!(id, Some(ConversationId::from("c2")));
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let store = store();
        store.fail_next_create("disk full");

        assert!(matches!(
            store.create_message(&request("c1", "hi")).await,
            Err(StoreError::Status { status: 500, .. })
        ));
        assert!(store.create_message(&request("c1", "hi")).await.is_ok());
        assert_eq!(store.created().len(), 1);
    }

    #[tokio::test]
    async fn held_history_waits_for_release() {
        let store = store();
        store.add_message("c1", "u2", "x");
        store.hold_history();

        let fetching = store.clone();
        let pending = tokio::spawn(async move {
            fetching
                .list_messages(&"c1".into(), &"u1".into(), &"u2".into())
                .await
        });
        while store.history_fetches() < 1 {
            tokio::task::yield_now().await;
        }
        assert!(!pending.is_finished());

        store.release_history();
        assert_eq!(pending.await.unwrap().unwrap().len(), 1);
    }
}
