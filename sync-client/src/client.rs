//! ChatClient - the main interface for Threadline.
//!
//! This module provides [`ChatClient`], the API an application uses to show
//! conversations, keep the active thread in sync and send messages.
//!
//! # Architecture
//!
//! ChatClient keeps the merge logic in the pure
//! [`MessageSynchronizer`](threadline_core::MessageSynchronizer) and performs
//! the I/O it asks for: history fetches and message writes go to the
//! [`MessageStore`], live events flow through the [`ConnectionManager`].
//!
//! ```text
//! Application → ChatClient → MessageStore (history, durable writes)
//!                   │      → ConnectionManager → Transport (live events)
//!                   ↓
//!              sync-core (synchronizer, directories, connection machine)
//! ```
//!
//! No lock on the synchronizer is held across store or channel I/O.
//!
//! # Example
//!
//! ```ignore
//! use threadline_client::{ChatClient, ClientConfig, HttpStore, WebSocketTransport};
//!
//! let client = ChatClient::new(session, transport, store, &ClientConfig::default());
//! client.connect().await?;
//! client.select_peer(&"u2".into()).await?;
//! client.send("hi").await?;
//! ```

use std::time::Instant;
use thiserror::Error;
use threadline_core::{
    ActiveThreadView, ConnectionState, ConversationDirectory, LiveOutcome, MessageSynchronizer,
    PeerDirectory, SeedOutcome, Selection, SendOutcome, SessionContext, SyncError, SyncSettings,
    ThreadPhase, ThreadTarget,
};
use threadline_types::records::CreateMessageRequest;
use threadline_types::{
    Conversation, ConversationId, Identity, Message, Nonce, SendMessage, UserId,
};
use tokio::sync::{watch, Mutex};

use crate::config::ClientConfig;
use crate::connection::{ChannelEvent, ConnectionError, ConnectionManager, Subscription};
use crate::store::{MessageStore, StoreError};
use crate::transport::Transport;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No one is logged in.
    #[error("no active session")]
    NoSession,

    /// A session is already active; log out first.
    #[error("a session is already active")]
    SessionActive,

    /// Live channel error.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Loading a directory or history failed.
    #[error("fetch failed: {0}")]
    Fetch(#[source] StoreError),

    /// The durable write of a message failed. The message is marked failed
    /// and can be resent with this nonce.
    #[error("send {nonce} failed: {source}")]
    Send {
        /// Nonce of the failed message.
        nonce: Nonce,
        /// Store error.
        source: StoreError,
    },

    /// The server-side logout failed. The local session was still ended.
    #[error("logout failed: {0}")]
    Logout(#[source] StoreError),

    /// Synchronizer rejected the operation.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// No conversation with this id in the directory.
    #[error("unknown conversation: {0}")]
    UnknownConversation(ConversationId),

    /// No peer with this id in the directory.
    #[error("unknown peer: {0}")]
    UnknownPeer(UserId),
}

/// Result of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Nonce of the sent message.
    pub nonce: Nonce,
    /// Whether the message was also published on the live channel.
    pub published: bool,
    /// What the store write changed.
    pub outcome: SendOutcome,
}

/// A live event after it was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveUpdate {
    /// A message arrived.
    Message {
        /// What happened to it.
        outcome: LiveOutcome,
        /// The message.
        message: Message,
    },
    /// The online roster changed.
    Presence {
        /// Users currently online.
        online: Vec<UserId>,
    },
}

/// Messaging sync client for one user session at a time.
pub struct ChatClient<T: Transport + 'static, S: MessageStore> {
    connection: ConnectionManager<T>,
    store: S,
    settings: SyncSettings,
    session: Mutex<Option<SessionContext>>,
    sync: Mutex<MessageSynchronizer>,
    conversations: Mutex<ConversationDirectory>,
    peers: Mutex<PeerDirectory>,
    inbox: Mutex<LiveInbox>,
    started: Instant,
}

/// The live subscription plus the event taken from it but not yet applied.
struct LiveInbox {
    subscription: Subscription,
    held: Option<ChannelEvent>,
}

impl<T: Transport + 'static, S: MessageStore> ChatClient<T, S> {
    /// Create a client for `session`.
    ///
    /// Nothing is fetched or connected until asked.
    pub fn new(session: SessionContext, transport: T, store: S, config: &ClientConfig) -> Self {
        let connection = ConnectionManager::new(transport, &config.live_channel_url);
        let subscription = connection.subscribe();
        let settings = config.sync_settings();
        let sync = MessageSynchronizer::new(session.user_id().clone(), settings);

        Self {
            connection,
            store,
            settings,
            session: Mutex::new(Some(session)),
            sync: Mutex::new(sync),
            conversations: Mutex::new(ConversationDirectory::new()),
            peers: Mutex::new(PeerDirectory::new()),
            inbox: Mutex::new(LiveInbox {
                subscription,
                held: None,
            }),
            started: Instant::now(),
        }
    }

    /// Start a new session after [`logout`](Self::logout).
    pub async fn login(&self, session: SessionContext) -> Result<(), ClientError> {
        let mut current = self.session.lock().await;
        if current.is_some() {
            return Err(ClientError::SessionActive);
        }
        *self.sync.lock().await = MessageSynchronizer::new(session.user_id().clone(), self.settings);
        tracing::info!("Session started for {}", session.user_id());
        *current = Some(session);
        Ok(())
    }

    /// The session user.
    pub async fn identity(&self) -> Result<Identity, ClientError> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.identity().clone())
            .ok_or(ClientError::NoSession)
    }

    /// Open the live channel and announce presence.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let identity = self.identity().await?;
        self.connection.connect(&identity).await?;
        Ok(())
    }

    /// Close the live channel. The session stays active.
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// Load the conversation and peer directories.
    ///
    /// Each directory is fetched once per session; later calls return
    /// immediately.
    pub async fn mount(&self) -> Result<(), ClientError> {
        let user_id = self.identity().await?.id;

        if !self.conversations.lock().await.is_loaded() {
            let listed = self
                .store
                .list_conversations(&user_id)
                .await
                .map_err(ClientError::Fetch)?;
            let count = listed.len();
            if self.conversations.lock().await.load(listed) {
                tracing::debug!("Loaded {} conversations", count);
            }
        }

        if !self.peers.lock().await.is_loaded() {
            let listed: Vec<Identity> = self
                .store
                .list_peers(&user_id)
                .await
                .map_err(ClientError::Fetch)?
                .into_iter()
                .filter(|peer| peer.id != user_id)
                .collect();
            let count = listed.len();
            if self.peers.lock().await.load(listed) {
                tracing::debug!("Loaded {} peers", count);
            }
        }
        Ok(())
    }

    /// Conversations in server order, plus any created this session.
    pub async fn conversations(&self) -> Vec<Conversation> {
        self.conversations.lock().await.list().to_vec()
    }

    /// Peers in server order.
    pub async fn peers(&self) -> Vec<Identity> {
        self.peers.lock().await.list().to_vec()
    }

    /// Whether a user was in the last presence roster.
    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.peers.lock().await.is_online(user_id)
    }

    /// Select an existing conversation and load its history.
    pub async fn select_conversation(&self, id: &ConversationId) -> Result<(), ClientError> {
        self.mount().await?;
        let target = self
            .conversations
            .lock()
            .await
            .find(id)
            .map(|c| ThreadTarget::new(c.conversation_id.clone(), c.peer.clone()))
            .ok_or_else(|| ClientError::UnknownConversation(id.clone()))?;
        self.select(target).await
    }

    /// Select a peer: their conversation if one exists, otherwise a new
    /// thread that gets its id on the first send.
    pub async fn select_peer(&self, peer_id: &UserId) -> Result<(), ClientError> {
        self.mount().await?;
        let peer = self
            .peers
            .lock()
            .await
            .find(peer_id)
            .cloned()
            .ok_or_else(|| ClientError::UnknownPeer(peer_id.clone()))?;
        let target = self.conversations.lock().await.target_for_peer(&peer);
        self.select(target).await
    }

    /// Make `target` the active thread and seed it with its history.
    ///
    /// Selecting the thread already shown or loading does nothing. If
    /// another selection happens while the history is in flight, this
    /// result is dropped and `Ok` is returned.
    pub async fn select(&self, target: ThreadTarget) -> Result<(), ClientError> {
        let user_id = self.identity().await?.id;

        // Events received under the previous selection are judged against it
        self.drain_live().await;

        let request = match self.sync.lock().await.select(target) {
            Selection::Unchanged => return Ok(()),
            Selection::Fetch(request) => request,
        };
        tracing::debug!(
            "Loading history of {} with {} (ticket {})",
            request.conversation_id,
            request.peer_id,
            request.ticket
        );

        let fetched = self
            .store
            .list_messages(&request.conversation_id, &user_id, &request.peer_id)
            .await;

        // Anything that arrived during the fetch is buffered before the seed
        self.drain_live().await;

        let mut sync = self.sync.lock().await;
        match fetched {
            Ok(history) => {
                match sync.complete_history(request.ticket, history) {
                    SeedOutcome::Seeded { replayed } => {
                        tracing::debug!("Thread {} ready ({} live replayed)", request.conversation_id, replayed)
                    }
                    SeedOutcome::Stale => {
                        tracing::debug!("Ignoring stale history for ticket {}", request.ticket)
                    }
                }
                Ok(())
            }
            Err(e) => {
                if sync.fail_history(request.ticket) {
                    tracing::warn!("History fetch for {} failed: {}", request.conversation_id, e);
                    Err(ClientError::Fetch(e))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Send a message to the active thread.
    ///
    /// The message appears immediately as pending, is published on the live
    /// channel when connected, and is written to the store. A store failure
    /// leaves it marked failed; see [`resend`](Self::resend).
    pub async fn send(&self, body: &str) -> Result<SendReceipt, ClientError> {
        self.identity().await?;
        let outgoing = self.sync.lock().await.begin_send(body, self.now_ms())?;
        self.deliver(outgoing).await
    }

    /// Retry a failed send with the same content and nonce.
    pub async fn resend(&self, nonce: &Nonce) -> Result<SendReceipt, ClientError> {
        self.identity().await?;
        let outgoing = self.sync.lock().await.retry_send(nonce)?;
        self.deliver(outgoing).await
    }

    async fn deliver(&self, outgoing: SendMessage) -> Result<SendReceipt, ClientError> {
        let nonce = outgoing.nonce;
        let published = self.connection.send(&outgoing).await;

        let request = CreateMessageRequest {
            conversation_id: outgoing.conversation_id,
            sender_id: outgoing.sender_id,
            message: outgoing.body,
            receiver_id: outgoing.receiver_id,
        };

        match self.store.create_message(&request).await {
            Ok(assigned) => {
                let outcome = self.sync.lock().await.confirm_send(&nonce, assigned);
                if let SendOutcome::ConversationAssigned {
                    conversation_id,
                    peer_id,
                } = &outcome
                {
                    self.record_conversation(conversation_id, peer_id).await;
                }
                Ok(SendReceipt {
                    nonce,
                    published,
                    outcome,
                })
            }
            Err(e) => {
                tracing::warn!("Storing message {} failed: {}", nonce, e);
                self.sync.lock().await.fail_send(&nonce);
                Err(ClientError::Send { nonce, source: e })
            }
        }
    }

    async fn record_conversation(&self, conversation_id: &ConversationId, peer_id: &UserId) {
        let peer = self
            .peers
            .lock()
            .await
            .find(peer_id)
            .cloned()
            .unwrap_or_else(|| Identity::new(peer_id.clone(), "", ""));
        tracing::info!("Conversation {} created with {}", conversation_id, peer_id);
        self.conversations.lock().await.record_created(Conversation {
            conversation_id: conversation_id.clone(),
            peer,
        });
    }

    /// Wait for the next live event and apply it.
    ///
    /// Returns `None` if the subscription ended. Cancel safe: an event
    /// received by a dropped call is applied by the next `pump_live` or
    /// [`drain_live`](Self::drain_live), ahead of anything received later.
    pub async fn pump_live(&self) -> Option<LiveUpdate> {
        let mut inbox = self.inbox.lock().await;
        let event = match inbox.held.clone() {
            Some(event) => event,
            None => {
                let event = inbox.subscription.next().await?;
                inbox.held = Some(event.clone());
                event
            }
        };
        let update = self.apply_channel_event(event).await;
        inbox.held = None;
        Some(update)
    }

    /// Apply every live event already received. Returns how many were
    /// applied; 0 if another task is pumping.
    pub async fn drain_live(&self) -> usize {
        let Ok(mut inbox) = self.inbox.try_lock() else {
            return 0;
        };
        let mut applied = 0;
        loop {
            let event = match inbox.held.clone() {
                Some(event) => event,
                None => match inbox.subscription.try_next() {
                    Some(event) => {
                        inbox.held = Some(event.clone());
                        event
                    }
                    None => break,
                },
            };
            self.apply_channel_event(event).await;
            inbox.held = None;
            applied += 1;
        }
        applied
    }

    // State changes happen after the last await, so a cancelled call never
    // leaves an event half applied.
    async fn apply_channel_event(&self, event: ChannelEvent) -> LiveUpdate {
        match event {
            ChannelEvent::Message(delivered) => {
                let message = delivered.into_message();
                let outcome = self
                    .sync
                    .lock()
                    .await
                    .apply_message(message.clone(), self.now_ms());
                if outcome == LiveOutcome::Discarded {
                    tracing::debug!("Dropped live message for {}", message.conversation_id);
                }
                LiveUpdate::Message { outcome, message }
            }
            ChannelEvent::Presence(roster) => {
                let online: Vec<UserId> = roster.users.into_iter().map(|p| p.user_id).collect();
                self.peers.lock().await.set_online(online.clone());
                LiveUpdate::Presence { online }
            }
        }
    }

    /// Snapshot of the active thread, once its history is loaded.
    pub async fn view(&self) -> Option<ActiveThreadView> {
        self.sync.lock().await.view().cloned()
    }

    /// Selection phase of the active thread.
    pub async fn phase(&self) -> ThreadPhase {
        self.sync.lock().await.phase()
    }

    /// Current live channel state.
    pub async fn connection_state(&self) -> ConnectionState {
        self.connection.state().await
    }

    /// Observe live channel state, e.g. to enable or disable sending.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    /// End the session.
    ///
    /// Logs out on the server, closes the live channel and forgets the
    /// thread and directories. The local teardown happens even if the
    /// server call fails; that failure is returned afterwards.
    pub async fn logout(&self) -> Result<Identity, ClientError> {
        let session = self
            .session
            .lock()
            .await
            .take()
            .ok_or(ClientError::NoSession)?;

        let server = self.store.logout(session.token()).await;
        if let Err(e) = &server {
            tracing::warn!("Server logout failed: {}", e);
        }

        self.connection.disconnect().await;
        self.sync.lock().await.clear();
        self.conversations.lock().await.clear();
        self.peers.lock().await.clear();

        let identity = session.end();
        tracing::info!("Session ended for {}", identity.id);
        server.map_err(ClientError::Logout)?;
        Ok(identity)
    }

    /// Get a reference to the underlying transport (for testing).
    pub fn transport(&self) -> &T {
        self.connection.transport()
    }

    /// Get a reference to the message store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
