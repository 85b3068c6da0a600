//! Message synchronizer: merges historical pulls and live pushes into the
//! active thread.
//!
//! The synchronizer owns the [`ActiveThreadView`] and decides, for every
//! incoming message, whether it is appended, buffered, or dropped:
//!
//! - Selecting a thread hands out a [`FetchRequest`] with a fresh ticket.
//!   Only the result carrying the current ticket may seed the view.
//! - Live messages for the thread being loaded are buffered and replayed,
//!   in receipt order, right after the seed. Buffered messages the store
//!   had already persisted into the fetched history are not replayed.
//! - Live messages for any other conversation are discarded.
//! - Our own sends are appended optimistically as `Pending` and tracked in
//!   the [`Outbox`] by nonce; the live echo of the same nonce is suppressed.
//!
//! Like the rest of this crate it performs no I/O. The caller fetches,
//! publishes, and stores, then reports results back.

use std::collections::VecDeque;
use thiserror::Error;
use threadline_types::{
    ConversationId, DeliverMessage, Message, MessageOrigin, Nonce, SendMessage, UserId,
};

use crate::dedupe::DedupeTracker;
use crate::outbox::{Outbox, OutboxError, PendingSend};
use crate::thread::{ActiveThreadView, DeliveryStatus, ThreadPhase, ThreadTarget};

/// Tunables for the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Window in which identical nonce-less live messages collapse.
    pub dedupe_window_ms: u64,
    /// Maximum number of sends awaiting (or having failed) their store write.
    pub outbox_capacity: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            dedupe_window_ms: 2_000,
            outbox_capacity: 256,
        }
    }
}

/// Errors from synchronizer operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Sending requires a thread whose history has been seeded.
    #[error("no thread is ready for sending")]
    NotReady,

    /// Message body is empty or whitespace.
    #[error("message body is empty")]
    EmptyBody,

    /// No failed send with this nonce exists.
    #[error("no failed send with nonce {0}")]
    UnknownSend(Nonce),

    /// Too many sends are awaiting their store write.
    #[error(transparent)]
    Outbox(#[from] OutboxError),
}

/// A historical fetch the caller must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Identifies this fetch; results with an older ticket are stale.
    pub ticket: u64,
    /// Conversation to fetch (the sentinel for a peer without one).
    pub conversation_id: ConversationId,
    /// The peer of the thread.
    pub peer_id: UserId,
}

/// Result of [`MessageSynchronizer::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The target is already shown or loading; nothing to do.
    Unchanged,
    /// Fetch history, then call `complete_history` or `fail_history`.
    Fetch(FetchRequest),
}

/// Result of [`MessageSynchronizer::complete_history`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// The view was seeded; `replayed` buffered live messages followed.
    Seeded {
        /// Number of buffered live messages appended after the history.
        replayed: usize,
    },
    /// The ticket was superseded by a later selection; result ignored.
    Stale,
}

/// What happened to an incoming live message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveOutcome {
    /// Appended to the active thread.
    Appended,
    /// Held until the thread's history is seeded.
    Buffered,
    /// Already accepted earlier.
    Duplicate,
    /// The echo of one of our own sends.
    Echo,
    /// Not for the active thread (or tagged with the sentinel).
    Discarded,
}

/// Result of [`MessageSynchronizer::confirm_send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Marked delivered.
    Delivered,
    /// Marked delivered, and the store created a conversation for the peer.
    ConversationAssigned {
        /// The new conversation id.
        conversation_id: ConversationId,
        /// Peer the conversation is held with.
        peer_id: UserId,
    },
    /// No send with this nonce is in flight.
    Unknown,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Loading {
        target: ThreadTarget,
        ticket: u64,
        backlog: VecDeque<Message>,
    },
    Ready {
        view: ActiveThreadView,
    },
}

/// Single-owner merge state for one session.
#[derive(Debug)]
pub struct MessageSynchronizer {
    self_id: UserId,
    phase: Phase,
    next_ticket: u64,
    dedupe: DedupeTracker,
    outbox: Outbox,
}

impl MessageSynchronizer {
    /// Create a synchronizer for the session user.
    pub fn new(self_id: UserId, settings: SyncSettings) -> Self {
        Self {
            self_id,
            phase: Phase::Idle,
            next_ticket: 1,
            dedupe: DedupeTracker::new(settings.dedupe_window_ms),
            outbox: Outbox::new(settings.outbox_capacity),
        }
    }

    /// The session user.
    pub fn self_id(&self) -> &UserId {
        &self.self_id
    }

    /// Selection phase of the active thread.
    pub fn phase(&self) -> ThreadPhase {
        match self.phase {
            Phase::Idle => ThreadPhase::NoneSelected,
            Phase::Loading { .. } => ThreadPhase::LoadingHistory,
            Phase::Ready { .. } => ThreadPhase::Ready,
        }
    }

    /// The seeded view, if the active thread is ready.
    pub fn view(&self) -> Option<&ActiveThreadView> {
        match &self.phase {
            Phase::Ready { view } => Some(view),
            _ => None,
        }
    }

    /// The thread being loaded or shown.
    pub fn target(&self) -> Option<ThreadTarget> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Loading { target, .. } => Some(target.clone()),
            Phase::Ready { view } => Some(view.target()),
        }
    }

    /// Select a thread.
    ///
    /// Re-selecting the thread that is already ready or loading is a no-op.
    /// Any other selection replaces the current view and invalidates any
    /// outstanding fetch.
    pub fn select(&mut self, target: ThreadTarget) -> Selection {
        if let Some(current) = self.target() {
            if current.same_thread(&target) {
                return Selection::Unchanged;
            }
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;

        let request = FetchRequest {
            ticket,
            conversation_id: target.conversation_id.clone(),
            peer_id: target.peer.id.clone(),
        };
        self.phase = Phase::Loading {
            target,
            ticket,
            backlog: VecDeque::new(),
        };
        Selection::Fetch(request)
    }

    /// Seed the view with fetched history, then replay buffered live messages.
    pub fn complete_history(&mut self, ticket: u64, history: Vec<Message>) -> SeedOutcome {
        if !self.is_current(ticket) {
            return SeedOutcome::Stale;
        }

        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Loading {
                target,
                mut backlog,
                ..
            } => {
                let persisted = persisted_overlap(&history, &backlog);
                backlog.drain(..persisted);

                let mut view = ActiveThreadView::seeded(target, history);
                if !view.conversation_id.is_sentinel() {
                    // Assigned while loading; history fetched for the sentinel
                    let id = view.conversation_id.clone();
                    view.assign_conversation(&id);
                }
                let replayed = backlog.len();
                for message in backlog {
                    view.push(message, DeliveryStatus::Delivered);
                }
                self.phase = Phase::Ready { view };
                SeedOutcome::Seeded { replayed }
            }
            other => {
                self.phase = other;
                SeedOutcome::Stale
            }
        }
    }

    /// Record that the fetch for `ticket` failed.
    ///
    /// The thread reverts to no selection. Returns `false` if the ticket was
    /// already stale.
    pub fn fail_history(&mut self, ticket: u64) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.phase = Phase::Idle;
        true
    }

    /// Offer an incoming live message arriving at `at_ms`.
    pub fn apply_live(&mut self, event: DeliverMessage, at_ms: u64) -> LiveOutcome {
        self.apply_message(event.into_message(), at_ms)
    }

    /// Offer an incoming message (any origin other than history).
    pub fn apply_message(&mut self, message: Message, at_ms: u64) -> LiveOutcome {
        let own = message.is_from(&self.self_id);
        if let Some(nonce) = &message.nonce {
            if own && self.dedupe.knows_nonce(nonce) {
                return LiveOutcome::Echo;
            }
        }

        if message.conversation_id.is_sentinel() {
            return LiveOutcome::Discarded;
        }

        let matches = match &self.phase {
            Phase::Idle => false,
            Phase::Loading { target, .. } => target.conversation_id == message.conversation_id,
            Phase::Ready { view } => view.conversation_id == message.conversation_id,
        };
        if !matches {
            return LiveOutcome::Discarded;
        }

        if !self.dedupe.observe(&message, at_ms) {
            // A relay that strips the nonce still echoes our content
            if own && message.nonce.is_none() {
                return LiveOutcome::Echo;
            }
            return LiveOutcome::Duplicate;
        }

        match &mut self.phase {
            Phase::Loading { backlog, .. } => {
                backlog.push_back(message);
                LiveOutcome::Buffered
            }
            Phase::Ready { view } => {
                view.push(message, DeliveryStatus::Delivered);
                LiveOutcome::Appended
            }
            Phase::Idle => LiveOutcome::Discarded,
        }
    }

    /// Start sending `body` to the active thread's peer.
    ///
    /// Appends the message as `Pending` and returns the event to publish on
    /// the live channel. The caller then writes it to the store and reports
    /// the result with [`confirm_send`](Self::confirm_send) or
    /// [`fail_send`](Self::fail_send).
    pub fn begin_send(&mut self, body: &str, at_ms: u64) -> Result<SendMessage, SyncError> {
        let view = match &mut self.phase {
            Phase::Ready { view } => view,
            _ => return Err(SyncError::NotReady),
        };
        if body.trim().is_empty() {
            return Err(SyncError::EmptyBody);
        }

        let nonce = Nonce::new();
        self.outbox.enqueue(PendingSend::new(
            nonce,
            view.conversation_id.clone(),
            view.peer.id.clone(),
            body,
        ))?;

        let message = Message {
            conversation_id: view.conversation_id.clone(),
            sender_id: self.self_id.clone(),
            body: body.to_string(),
            nonce: Some(nonce),
            origin: MessageOrigin::Local,
        };
        self.dedupe.remember_send(&message, at_ms);
        view.push(message, DeliveryStatus::Pending);

        Ok(SendMessage {
            conversation_id: view.conversation_id.clone(),
            sender_id: self.self_id.clone(),
            receiver_id: view.peer.id.clone(),
            body: body.to_string(),
            nonce,
        })
    }

    /// Record a successful store write.
    ///
    /// `assigned` is the conversation id the store reported, if any. When
    /// the send went to the sentinel, the assigned id replaces it on the
    /// peer's thread (if shown or loading) and on the peer's other in-flight
    /// sends.
    pub fn confirm_send(&mut self, nonce: &Nonce, assigned: Option<ConversationId>) -> SendOutcome {
        let entry = match self.outbox.ack(nonce) {
            Some(entry) => entry,
            None => return SendOutcome::Unknown,
        };

        let assigned = assigned
            .filter(|id| entry.conversation_id.is_sentinel() && !id.is_sentinel() && !id.as_str().is_empty());

        match &mut self.phase {
            Phase::Ready { view } => {
                view.set_status(nonce, DeliveryStatus::Delivered);
                if let Some(id) = &assigned {
                    if view.conversation_id.is_sentinel() && view.peer.id == entry.receiver_id {
                        view.assign_conversation(id);
                    }
                }
            }
            Phase::Loading { target, .. } => {
                if let Some(id) = &assigned {
                    if target.conversation_id.is_sentinel() && target.peer.id == entry.receiver_id {
                        target.conversation_id = id.clone();
                    }
                }
            }
            Phase::Idle => {}
        }

        match assigned {
            Some(conversation_id) => {
                self.outbox.retarget(&entry.receiver_id, &conversation_id);
                SendOutcome::ConversationAssigned {
                    conversation_id,
                    peer_id: entry.receiver_id,
                }
            }
            None => SendOutcome::Delivered,
        }
    }

    /// Record a failed store write. The message stays in the view as `Failed`.
    ///
    /// Returns `false` if no send with this nonce is in flight.
    pub fn fail_send(&mut self, nonce: &Nonce) -> bool {
        if !self.outbox.is_pending(nonce) {
            return false;
        }
        self.outbox.nack(nonce);
        if let Phase::Ready { view } = &mut self.phase {
            view.set_status(nonce, DeliveryStatus::Failed);
        }
        true
    }

    /// Re-arm a failed send with the same content and nonce.
    ///
    /// Returns the event to publish again; the caller then repeats the
    /// store write.
    pub fn retry_send(&mut self, nonce: &Nonce) -> Result<SendMessage, SyncError> {
        let entry = self
            .outbox
            .rearm(nonce)
            .ok_or(SyncError::UnknownSend(*nonce))?;

        if let Phase::Ready { view } = &mut self.phase {
            view.set_status(nonce, DeliveryStatus::Pending);
        }

        Ok(SendMessage {
            conversation_id: entry.conversation_id,
            sender_id: self.self_id.clone(),
            receiver_id: entry.receiver_id,
            body: entry.body,
            nonce: entry.nonce,
        })
    }

    /// Number of sends awaiting their store write.
    pub fn pending_sends(&self) -> usize {
        self.outbox.pending_count()
    }

    /// Number of sends whose store write failed.
    pub fn failed_sends(&self) -> usize {
        self.outbox.failed_count()
    }

    /// Drop the view, pending sends, and dedupe memory (logout).
    pub fn clear(&mut self) {
        self.phase = Phase::Idle;
        self.dedupe.clear();
        self.outbox.clear();
    }

    fn is_current(&self, ticket: u64) -> bool {
        matches!(&self.phase, Phase::Loading { ticket: current, .. } if *current == ticket)
    }
}

/// Length of the longest backlog prefix that matches the tail of `history`.
///
/// The store may persist a live message before answering the fetch, so the
/// same message can arrive both ways.
fn persisted_overlap(history: &[Message], backlog: &VecDeque<Message>) -> usize {
    let longest = history.len().min(backlog.len());
    (1..=longest)
        .rev()
        .find(|&len| {
            history[history.len() - len..]
                .iter()
                .zip(backlog.iter())
                .all(|(stored, live)| same_content(stored, live))
        })
        .unwrap_or(0)
}

fn same_content(stored: &Message, live: &Message) -> bool {
    let nonces_agree = match (&stored.nonce, &live.nonce) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    };
    nonces_agree && stored.sender_id == live.sender_id && stored.body == live.body
}
