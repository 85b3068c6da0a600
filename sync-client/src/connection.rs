//! Connection manager: drives the live channel.
//!
//! The lifecycle decisions come from the pure
//! [`ConnectionState`](threadline_core::ConnectionState) machine; this module
//! performs the I/O its actions ask for.
//!
//! ```text
//! connect() ──► state machine ──► OpenChannel ──► Transport::connect
//!                    │                              │
//!                    ◄──────── ConnectSucceeded ◄───┘
//!                    │
//!                    └──► AnnouncePresence ──► addUser frame
//!                                                  │
//! reader task ◄── getMessage / getUsers frames ◄───┘ ──► Subscription
//! ```
//!
//! Every channel-opening transition starts a new attempt epoch. Results of
//! an attempt (success, failure, loss) are applied only while its epoch is
//! still current, so a superseded attempt cannot resurrect state.

use std::sync::{Arc, Mutex as StdMutex, Weak};
use thiserror::Error;
use threadline_core::{Action, ConnectionEvent, ConnectionState, Event};
use threadline_types::{
    ActiveUsers, DeliverMessage, Identity, LiveEvent, RegisterPresence, SendMessage, UserId,
};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::transport::{Transport, TransportError};

/// Connection errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The transport could not open the channel.
    #[error("live channel failed: {0}")]
    Transport(#[from] TransportError),

    /// A later connect or disconnect replaced this attempt.
    #[error("connection attempt superseded")]
    Superseded,

    /// The channel closed before the connection completed.
    #[error("live channel lost: {0}")]
    Lost(String),
}

/// An incoming live channel event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A message pushed to us.
    Message(DeliverMessage),
    /// The roster of users currently on the channel.
    Presence(ActiveUsers),
}

/// Receiving end of the live channel.
///
/// Only one subscription is active at a time. Subscribing again ends this
/// one: [`next`](Self::next) then returns `None`.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl Subscription {
    /// Wait for the next event. `None` once the subscription was replaced
    /// or the manager dropped.
    pub async fn next(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_next(&mut self) -> Option<ChannelEvent> {
        self.rx.try_recv().ok()
    }
}

struct Tracked {
    state: ConnectionState,
    epoch: u64,
}

struct Shared<T: Transport + 'static> {
    transport: Arc<T>,
    address: String,
    tracked: Mutex<Tracked>,
    status: watch::Sender<ConnectionState>,
    consumer: StdMutex<Option<mpsc::UnboundedSender<ChannelEvent>>>,
    reader: StdMutex<Option<JoinHandle<()>>>,
}

/// Owns the live channel for one client.
///
/// Clones share the same channel.
pub struct ConnectionManager<T: Transport + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport + 'static> Clone for ConnectionManager<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport + 'static> std::fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("address", &self.shared.address)
            .field("state", &*self.shared.status.borrow())
            .finish()
    }
}

impl<T: Transport + 'static> ConnectionManager<T> {
    /// Create a manager for the live channel at `address`.
    pub fn new(transport: T, address: &str) -> Self {
        let (status, _) = watch::channel(ConnectionState::new());
        Self {
            shared: Arc::new(Shared {
                transport: Arc::new(transport),
                address: address.to_string(),
                tracked: Mutex::new(Tracked {
                    state: ConnectionState::new(),
                    epoch: 0,
                }),
                status,
                consumer: StdMutex::new(None),
                reader: StdMutex::new(None),
            }),
        }
    }

    /// Open the channel for `identity` and announce its presence.
    ///
    /// Idempotent: while connecting or connected as the same identity this
    /// waits for the ongoing attempt instead of opening a second channel.
    /// Connecting as a different identity closes the previous channel first.
    pub async fn connect(&self, identity: &Identity) -> Result<(), ConnectionError> {
        let user_id = identity.id.clone();
        let (actions, epoch) = self
            .shared
            .apply(Event::ConnectRequested {
                user_id: user_id.clone(),
            })
            .await;

        if !actions.contains(&Action::OpenChannel) {
            return self.wait_settled(&user_id).await;
        }

        // Close the previous identity's channel before opening ours
        let preliminary = actions
            .into_iter()
            .filter(|action| *action != Action::OpenChannel)
            .collect();
        self.shared.execute(preliminary, false).await;

        tracing::debug!("Opening live channel to {} for {}", self.shared.address, user_id);
        if let Err(e) = self.shared.transport.connect(&self.shared.address).await {
            let failed = Event::ConnectFailed {
                error: e.to_string(),
            };
            if let Some(actions) = self.shared.apply_if_current(epoch, failed).await {
                self.shared.execute(actions, false).await;
            }
            return Err(e.into());
        }

        let actions = match self
            .shared
            .apply_if_current(epoch, Event::ConnectSucceeded)
            .await
        {
            Some(actions) => actions,
            None => {
                self.shared.discard_stale_channel().await;
                return Err(ConnectionError::Superseded);
            }
        };

        self.shared.start_reader(epoch);

        for action in actions {
            match action {
                Action::AnnouncePresence { user_id } => {
                    let frame = LiveEvent::RegisterPresence(RegisterPresence { user_id });
                    if let Err(e) = self.shared.publish(&frame).await {
                        let reason = format!("presence announcement failed: {}", e);
                        self.shared.lose(epoch, reason.clone(), false).await;
                        return Err(ConnectionError::Lost(reason));
                    }
                }
                other => self.shared.execute(vec![other], false).await,
            }
        }
        Ok(())
    }

    /// Close the channel. Safe to call in any state.
    pub async fn disconnect(&self) {
        let (actions, _) = self.shared.apply(Event::DisconnectRequested).await;
        self.shared.execute(actions, false).await;
    }

    /// Publish a message on the live channel.
    ///
    /// Best-effort: returns whether the frame was handed to the transport.
    /// A transport failure moves the connection to `Disconnected`.
    pub async fn send(&self, message: &SendMessage) -> bool {
        let epoch = {
            let tracked = self.shared.tracked.lock().await;
            if !tracked.state.is_connected() {
                tracing::debug!("Live channel not connected; message {} not published", message.nonce);
                return false;
            }
            tracked.epoch
        };

        match self
            .shared
            .publish(&LiveEvent::SendMessage(message.clone()))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Live publish failed: {}", e);
                self.shared.lose(epoch, e.to_string(), false).await;
                false
            }
        }
    }

    /// Register the consumer of incoming events, replacing any previous one.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slot = self
            .shared
            .consumer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.replace(tx).is_some() {
            tracing::debug!("Replaced previous live subscription");
        }
        Subscription { rx }
    }

    /// Observe connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.status.subscribe()
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.shared.tracked.lock().await.state.clone()
    }

    /// Check if connected.
    pub async fn is_connected(&self) -> bool {
        self.shared.tracked.lock().await.state.is_connected()
    }

    /// Get a reference to the underlying transport (for testing).
    pub fn transport(&self) -> &T {
        &self.shared.transport
    }

    async fn wait_settled(&self, user_id: &UserId) -> Result<(), ConnectionError> {
        let mut status = self.shared.status.subscribe();
        let settled = status
            .wait_for(|state| !state.is_connecting())
            .await
            .map(|state| state.clone())
            .map_err(|_| ConnectionError::Superseded)?;

        match settled {
            ConnectionState::Connected { user_id: connected } if &connected == user_id => Ok(()),
            ConnectionState::Disconnected => {
                Err(ConnectionError::Lost("connection attempt failed".into()))
            }
            _ => Err(ConnectionError::Superseded),
        }
    }
}

impl<T: Transport + 'static> Shared<T> {
    fn transition(&self, tracked: &mut Tracked, event: Event) -> Vec<Action> {
        let (next, actions) = tracked.state.clone().on_event(event);
        if actions
            .iter()
            .any(|a| matches!(a, Action::OpenChannel | Action::CloseChannel))
        {
            tracked.epoch += 1;
        }
        tracked.state = next.clone();
        self.status.send_replace(next);
        actions
    }

    /// Apply an event unconditionally. Returns the actions and the epoch
    /// after the transition.
    async fn apply(&self, event: Event) -> (Vec<Action>, u64) {
        let mut tracked = self.tracked.lock().await;
        let actions = self.transition(&mut tracked, event);
        (actions, tracked.epoch)
    }

    /// Apply an event only if `epoch` is still the current attempt.
    async fn apply_if_current(&self, epoch: u64, event: Event) -> Option<Vec<Action>> {
        let mut tracked = self.tracked.lock().await;
        if tracked.epoch != epoch {
            return None;
        }
        Some(self.transition(&mut tracked, event))
    }

    async fn execute(&self, actions: Vec<Action>, from_reader: bool) {
        for action in actions {
            match action {
                Action::CloseChannel => {
                    if !from_reader {
                        self.stop_reader();
                    }
                    if let Err(e) = self.transport.close().await {
                        tracing::warn!("Error closing live channel: {}", e);
                    }
                }
                Action::EmitEvent(event) => match event {
                    ConnectionEvent::Connected { user_id } => {
                        tracing::info!("Live channel connected as {}", user_id)
                    }
                    ConnectionEvent::ConnectionFailed { error } => {
                        tracing::warn!("Live channel connection failed: {}", error)
                    }
                    ConnectionEvent::Disconnected { reason } => {
                        tracing::info!("Live channel disconnected: {}", reason)
                    }
                },
                // Opening and presence are driven by connect()
                Action::OpenChannel | Action::AnnouncePresence { .. } => {}
            }
        }
    }

    async fn lose(&self, epoch: u64, reason: String, from_reader: bool) {
        if let Some(actions) = self
            .apply_if_current(epoch, Event::ChannelLost { reason })
            .await
        {
            self.execute(actions, from_reader).await;
        }
    }

    /// A superseded attempt opened the transport after all. Close it unless a
    /// newer attempt is using it.
    async fn discard_stale_channel(&self) {
        let idle = matches!(
            self.tracked.lock().await.state,
            ConnectionState::Disconnected
        );
        if idle {
            self.transport.close().await.ok();
        }
    }

    async fn publish(&self, event: &LiveEvent) -> Result<(), TransportError> {
        let bytes = event
            .to_bytes()
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.transport.send(&bytes).await
    }

    fn forward(&self, event: ChannelEvent) {
        let slot = self
            .consumer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match slot.as_ref() {
            Some(tx) => {
                if tx.send(event).is_err() {
                    tracing::debug!("Live subscriber gone; event dropped");
                }
            }
            None => tracing::debug!("No live subscriber; event dropped"),
        }
    }

    fn dispatch(&self, frame: &[u8]) {
        match LiveEvent::from_bytes(frame) {
            Ok(LiveEvent::DeliverMessage(message)) => self.forward(ChannelEvent::Message(message)),
            Ok(LiveEvent::ActiveUsers(users)) => self.forward(ChannelEvent::Presence(users)),
            Ok(LiveEvent::RegisterPresence(_) | LiveEvent::SendMessage(_)) => {
                tracing::debug!("Ignoring outbound-only event on live channel")
            }
            Err(e) => tracing::warn!("Dropping undecodable live frame: {}", e),
        }
    }

    fn start_reader(self: &Arc<Self>, epoch: u64) {
        let transport = Arc::clone(&self.transport);
        let shared: Weak<Self> = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            loop {
                let result = transport.recv().await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                match result {
                    Ok(frame) => shared.dispatch(&frame),
                    Err(e) => {
                        tracing::debug!("Live reader stopped: {}", e);
                        shared.lose(epoch, e.to_string(), true).await;
                        break;
                    }
                }
            }
        });

        let mut slot = self
            .reader
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    fn stop_reader(&self) {
        let mut slot = self
            .reader
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

impl<T: Transport + 'static> Drop for Shared<T> {
    fn drop(&mut self) {
        self.stop_reader();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use std::time::Duration;
    use threadline_types::Nonce;

    fn identity(id: &str) -> Identity {
        Identity::new(id, "Someone", "someone@example.com")
    }

    fn manager() -> (ConnectionManager<MockTransport>, MockTransport) {
        let transport = MockTransport::new();
        (ConnectionManager::new(transport.clone(), "ws://chat"), transport)
    }

    fn presence_announcements(transport: &MockTransport) -> Vec<UserId> {
        transport
            .sent_events()
            .into_iter()
            .filter_map(|event| match event {
                LiveEvent::RegisterPresence(p) => Some(p.user_id),
                _ => None,
            })
            .collect()
    }

    fn deliver(conversation: &str, sender: &str, body: &str) -> LiveEvent {
        LiveEvent::DeliverMessage(DeliverMessage {
            conversation_id: conversation.into(),
            sender_id: sender.into(),
            body: body.into(),
            nonce: None,
        })
    }

    async fn next_event(subscription: &mut Subscription) -> Option<ChannelEvent> {
        tokio::time::timeout(Duration::from_secs(1), subscription.next())
            .await
            .expect("timed out waiting for live event")
    }

    async fn wait_for_state(
        manager: &ConnectionManager<MockTransport>,
        check: impl Fn(&ConnectionState) -> bool,
    ) {
        let mut status = manager.watch_state();
        tokio::time::timeout(Duration::from_secs(1), status.wait_for(|s| check(s)))
            .await
            .expect("timed out waiting for state")
            .unwrap();
    }

    // ===========================================
    // Connect / Disconnect
    // ===========================================

    #[tokio::test]
    async fn connect_announces_presence() {
        let (manager, transport) = manager();

        manager.connect(&identity("u1")).await.unwrap();

        assert!(manager.is_connected().await);
        assert_eq!(transport.connected_address(), Some("ws://chat".to_string()));
        assert_eq!(presence_announcements(&transport), vec![UserId::from("u1")]);
    }

    #[tokio::test]
    async fn reconnect_same_identity_is_noop() {
        let (manager, transport) = manager();

        manager.connect(&identity("u1")).await.unwrap();
        manager.connect(&identity("u1")).await.unwrap();

        assert_eq!(transport.connect_attempts(), 1);
        assert_eq!(presence_announcements(&transport).len(), 1);
    }

    #[tokio::test]
    async fn concurrent_connects_announce_once() {
        let (manager, transport) = manager();
        transport.hold_connect();

        let first = tokio::spawn({
            let manager = manager.clone();
            async move { manager.connect(&identity("u1")).await }
        });
        while transport.connect_attempts() < 1 {
            tokio::task::yield_now().await;
        }
        let second = tokio::spawn({
            let manager = manager.clone();
            async move { manager.connect(&identity("u1")).await }
        });
        tokio::task::yield_now().await;

        transport.release_connect();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(transport.connect_attempts(), 1);
        assert_eq!(presence_announcements(&transport), vec![UserId::from("u1")]);
    }

    #[tokio::test]
    async fn connect_failure_lands_in_disconnected_and_can_retry() {
        let (manager, transport) = manager();
        transport.fail_next_connect("refused");

        let result = manager.connect(&identity("u1")).await;

        assert!(matches!(result, Err(ConnectionError::Transport(_))));
        assert_eq!(manager.state().await, ConnectionState::Disconnected);

        manager.connect(&identity("u1")).await.unwrap();
        assert!(manager.is_connected().await);
    }

    #[tokio::test]
    async fn disconnect_when_never_connected_is_safe() {
        let (manager, transport) = manager();

        manager.disconnect().await;

        assert_eq!(manager.state().await, ConnectionState::Disconnected);
        assert_eq!(transport.close_count(), 0);
    }

    #[tokio::test]
    async fn disconnect_during_connect_supersedes_attempt() {
        let (manager, transport) = manager();
        transport.hold_connect();

        let attempt = tokio::spawn({
            let manager = manager.clone();
            async move { manager.connect(&identity("u1")).await }
        });
        while transport.connect_attempts() < 1 {
            tokio::task::yield_now().await;
        }

        manager.disconnect().await;
        transport.release_connect();

        let result = attempt.await.unwrap();
        assert!(matches!(result, Err(ConnectionError::Superseded)));
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
        assert!(!transport.is_connected(), "stale channel must be closed");
        assert!(presence_announcements(&transport).is_empty());
    }

    #[tokio::test]
    async fn switching_identity_closes_previous_channel() {
        let (manager, transport) = manager();

        manager.connect(&identity("u1")).await.unwrap();
        manager.connect(&identity("u2")).await.unwrap();

        assert_eq!(transport.close_count(), 1);
        assert_eq!(
            manager.state().await,
            ConnectionState::Connected {
                user_id: UserId::from("u2")
            }
        );
        assert_eq!(
            presence_announcements(&transport),
            vec![UserId::from("u1"), UserId::from("u2")]
        );
    }

    // ===========================================
    // Live Events
    // ===========================================

    #[tokio::test]
    async fn incoming_messages_reach_subscriber() {
        let (manager, transport) = manager();
        let mut subscription = manager.subscribe();
        manager.connect(&identity("u1")).await.unwrap();

        transport.push_event(&deliver("c1", "u2", "hello"));

        match next_event(&mut subscription).await {
            Some(ChannelEvent::Message(message)) => {
                assert_eq!(message.body, "hello");
                assert_eq!(message.sender_id, UserId::from("u2"));
            }
            other => panic!("Expected Message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn presence_roster_reaches_subscriber() {
        let (manager, transport) = manager();
        let mut subscription = manager.subscribe();
        manager.connect(&identity("u1")).await.unwrap();

        transport.push_event(&LiveEvent::ActiveUsers(ActiveUsers {
            users: vec![RegisterPresence {
                user_id: UserId::from("u2"),
            }],
        }));

        assert!(matches!(
            next_event(&mut subscription).await,
            Some(ChannelEvent::Presence(_))
        ));
    }

    #[tokio::test]
    async fn undecodable_frames_are_skipped() {
        let (manager, transport) = manager();
        let mut subscription = manager.subscribe();
        manager.connect(&identity("u1")).await.unwrap();

        transport.push_incoming(b"garbage".to_vec());
        transport.push_event(&deliver("c1", "u2", "after"));

        match next_event(&mut subscription).await {
            Some(ChannelEvent::Message(message)) => assert_eq!(message.body, "after"),
            other => panic!("Expected Message, got {:?}", other),
        }
        assert!(manager.is_connected().await);
    }

    #[tokio::test]
    async fn new_subscription_replaces_old() {
        let (manager, transport) = manager();
        let mut old = manager.subscribe();
        let mut current = manager.subscribe();
        manager.connect(&identity("u1")).await.unwrap();

        assert!(next_event(&mut old).await.is_none(), "old handle ends");

        transport.push_event(&deliver("c1", "u2", "x"));
        assert!(next_event(&mut current).await.is_some());
    }

    #[tokio::test]
    async fn reconnect_does_not_stack_readers() {
        let (manager, transport) = manager();
        let mut subscription = manager.subscribe();

        manager.connect(&identity("u1")).await.unwrap();
        manager.disconnect().await;
        manager.connect(&identity("u1")).await.unwrap();

        transport.push_event(&deliver("c1", "u2", "once"));

        assert!(next_event(&mut subscription).await.is_some());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(subscription.try_next().is_none(), "delivered exactly once");
    }

    // ===========================================
    // Failure Handling
    // ===========================================

    #[tokio::test]
    async fn remote_close_moves_to_disconnected() {
        let (manager, transport) = manager();
        manager.connect(&identity("u1")).await.unwrap();

        transport.drop_connection();

        wait_for_state(&manager, |s| *s == ConnectionState::Disconnected).await;
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn send_failure_moves_to_disconnected() {
        let (manager, transport) = manager();
        manager.connect(&identity("u1")).await.unwrap();
        transport.fail_next_send("broken pipe");

        let published = manager
            .send(&SendMessage {
                conversation_id: "c1".into(),
                sender_id: "u1".into(),
                receiver_id: "u2".into(),
                body: "hi".into(),
                nonce: Nonce::new(),
            })
            .await;

        assert!(!published);
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn send_while_disconnected_is_skipped() {
        let (manager, transport) = manager();

        let published = manager
            .send(&SendMessage {
                conversation_id: "c1".into(),
                sender_id: "u1".into(),
                receiver_id: "u2".into(),
                body: "hi".into(),
                nonce: Nonce::new(),
            })
            .await;

        assert!(!published);
        assert!(transport.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn failed_presence_announcement_fails_connect() {
        let (manager, transport) = manager();
        transport.fail_next_send("reset");

        let result = manager.connect(&identity("u1")).await;

        assert!(matches!(result, Err(ConnectionError::Lost(_))));
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn watch_state_tracks_transitions() {
        let (manager, _transport) = manager();
        let status = manager.watch_state();
        assert_eq!(*status.borrow(), ConnectionState::Disconnected);

        manager.connect(&identity("u1")).await.unwrap();
        assert!(status.borrow().is_connected());

        manager.disconnect().await;
        assert_eq!(*status.borrow(), ConnectionState::Disconnected);
    }
}
