//! Duplicate suppression for at-least-once live delivery.
//!
//! The live channel may deliver the same event more than once. This module
//! decides whether an incoming message has already been accepted:
//! - Messages carrying a [`Nonce`] are keyed by the nonce alone
//! - Messages without one are keyed by (conversation, sender, body) and
//!   collapse only when they arrive within the dedupe window of each other
//!
//! Arrival times are supplied by the caller in milliseconds on any
//! monotonic clock, which keeps this module free of I/O.

use std::collections::{HashMap, HashSet, VecDeque};
use threadline_types::{ConversationId, Message, Nonce, UserId};

/// The derived value used to recognize a duplicate delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupeKey {
    /// Explicit client correlation id.
    Nonce(Nonce),
    /// Content identity for messages without a nonce.
    Content {
        /// Conversation of the message.
        conversation_id: ConversationId,
        /// Author of the message.
        sender_id: UserId,
        /// Message text.
        body: String,
    },
}

impl DedupeKey {
    /// Derive the key for a message.
    pub fn for_message(message: &Message) -> Self {
        match message.nonce {
            Some(nonce) => Self::Nonce(nonce),
            None => Self::Content {
                conversation_id: message.conversation_id.clone(),
                sender_id: message.sender_id.clone(),
                body: message.body.clone(),
            },
        }
    }
}

/// Remembers recently accepted messages.
///
/// Nonces are remembered for the whole session (bounded by
/// [`DedupeTracker::MAX_TRACKED`], oldest evicted first). Content keys are
/// remembered with the arrival time of their last acceptance.
#[derive(Debug, Clone)]
pub struct DedupeTracker {
    window_ms: u64,
    nonces: HashSet<Nonce>,
    nonce_order: VecDeque<Nonce>,
    recent: HashMap<DedupeKey, u64>,
}

impl DedupeTracker {
    /// Maximum number of nonces or content keys kept before eviction.
    pub const MAX_TRACKED: usize = 10_000;

    /// Create a tracker collapsing nonce-less repeats within `window_ms`.
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            nonces: HashSet::new(),
            nonce_order: VecDeque::new(),
            recent: HashMap::new(),
        }
    }

    /// Record a message arriving at `at_ms`.
    ///
    /// Returns `true` if the message is new and should be accepted,
    /// `false` if it duplicates one already accepted.
    pub fn observe(&mut self, message: &Message, at_ms: u64) -> bool {
        match DedupeKey::for_message(message) {
            DedupeKey::Nonce(nonce) => self.remember_nonce(nonce),
            key => self.observe_content(key, at_ms),
        }
    }

    /// Remember a nonce without a message (our own outgoing sends).
    ///
    /// Returns `true` if the nonce was not known before.
    pub fn remember_nonce(&mut self, nonce: Nonce) -> bool {
        if !self.nonces.insert(nonce) {
            return false;
        }
        self.nonce_order.push_back(nonce);
        if self.nonce_order.len() > Self::MAX_TRACKED {
            if let Some(evicted) = self.nonce_order.pop_front() {
                self.nonces.remove(&evicted);
            }
        }
        true
    }

    /// Remember one of our own outgoing messages arriving at `at_ms`.
    ///
    /// Both its nonce and its content key are recorded, so an echo is
    /// recognized whether or not the server relays the nonce.
    pub fn remember_send(&mut self, message: &Message, at_ms: u64) {
        if let Some(nonce) = message.nonce {
            self.remember_nonce(nonce);
        }
        let key = DedupeKey::Content {
            conversation_id: message.conversation_id.clone(),
            sender_id: message.sender_id.clone(),
            body: message.body.clone(),
        };
        self.observe_content(key, at_ms);
    }

    /// Check whether a nonce has been seen.
    pub fn knows_nonce(&self, nonce: &Nonce) -> bool {
        self.nonces.contains(nonce)
    }

    /// Number of keys currently tracked (nonces + content keys).
    pub fn len(&self) -> usize {
        self.nonces.len() + self.recent.len()
    }

    /// Check if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.nonces.clear();
        self.nonce_order.clear();
        self.recent.clear();
    }

    fn observe_content(&mut self, key: DedupeKey, at_ms: u64) -> bool {
        if let Some(&last) = self.recent.get(&key) {
            if at_ms.saturating_sub(last) < self.window_ms {
                return false;
            }
        }

        if self.recent.len() >= Self::MAX_TRACKED {
            self.prune(at_ms);
        }
        self.recent.insert(key, at_ms);
        true
    }

    /// Drop content keys whose window has passed.
    fn prune(&mut self, now_ms: u64) {
        let window = self.window_ms;
        self.recent
            .retain(|_, &mut last| now_ms.saturating_sub(last) < window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_types::MessageOrigin;

    fn live(conversation: &str, sender: &str, body: &str, nonce: Option<Nonce>) -> Message {
        Message {
            conversation_id: conversation.into(),
            sender_id: sender.into(),
            body: body.into(),
            nonce,
            origin: MessageOrigin::Live,
        }
    }

    #[test]
    fn first_delivery_is_accepted() {
        let mut tracker = DedupeTracker::new(2_000);
        assert!(tracker.observe(&live("c1", "u2", "a", None), 0));
    }

    #[test]
    fn redelivery_within_window_is_duplicate() {
        let mut tracker = DedupeTracker::new(2_000);
        let msg = live("c1", "u2", "a", None);

        assert!(tracker.observe(&msg, 100));
        assert!(!tracker.observe(&msg, 150));
    }

    #[test]
    fn repeat_after_window_is_new_message() {
        let mut tracker = DedupeTracker::new(2_000);
        let msg = live("c1", "u2", "ok", None);

        assert!(tracker.observe(&msg, 0));
        assert!(tracker.observe(&msg, 5_000));
    }

    #[test]
    fn same_body_in_other_conversation_is_distinct() {
        let mut tracker = DedupeTracker::new(2_000);

        assert!(tracker.observe(&live("c1", "u2", "a", None), 0));
        assert!(tracker.observe(&live("c2", "u2", "a", None), 0));
        assert!(tracker.observe(&live("c1", "u3", "a", None), 0));
    }

    #[test]
    fn nonce_duplicates_regardless_of_time() {
        let mut tracker = DedupeTracker::new(2_000);
        let nonce = Nonce::new();
        let msg = live("c1", "u1", "hi", Some(nonce));

        assert!(tracker.observe(&msg, 0));
        assert!(!tracker.observe(&msg, 1_000_000));
    }

    #[test]
    fn distinct_nonces_with_same_body_are_both_kept() {
        let mut tracker = DedupeTracker::new(2_000);

        assert!(tracker.observe(&live("c1", "u1", "ok", Some(Nonce::new())), 0));
        assert!(tracker.observe(&live("c1", "u1", "ok", Some(Nonce::new())), 0));
    }

    #[test]
    fn remembered_nonce_suppresses_echo() {
        let mut tracker = DedupeTracker::new(2_000);
        let nonce = Nonce::new();

        assert!(tracker.remember_nonce(nonce));
        assert!(tracker.knows_nonce(&nonce));
        assert!(!tracker.observe(&live("c1", "u1", "hi", Some(nonce)), 10));
    }

    #[test]
    fn remembered_send_suppresses_stripped_echo() {
        let mut tracker = DedupeTracker::new(2_000);
        let sent = live("c1", "u1", "hi", Some(Nonce::new()));

        tracker.remember_send(&sent, 100);

        assert!(!tracker.observe(&sent, 150));
        assert!(!tracker.observe(&live("c1", "u1", "hi", None), 300));
    }

    #[test]
    fn nonce_memory_is_bounded() {
        let mut tracker = DedupeTracker::new(2_000);
        let first = Nonce::new();
        tracker.remember_nonce(first);

        for _ in 0..DedupeTracker::MAX_TRACKED {
            tracker.remember_nonce(Nonce::new());
        }

        assert!(!tracker.knows_nonce(&first), "oldest nonce should be evicted");
        assert_eq!(tracker.len(), DedupeTracker::MAX_TRACKED);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut tracker = DedupeTracker::new(2_000);
        tracker.observe(&live("c1", "u2", "a", None), 0);
        tracker.remember_nonce(Nonce::new());

        tracker.clear();

        assert!(tracker.is_empty());
        assert!(tracker.observe(&live("c1", "u2", "a", None), 1));
    }
}
