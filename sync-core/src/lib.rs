//! # sync-core
//!
//! Pure logic for Threadline (no I/O, instant tests).
//!
//! This crate implements the state machines and the merge algorithm for
//! the messaging sync client without any network or disk I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (live channel, message store) is performed by
//! `sync-client`, which interprets the actions and requests produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dedupe;
pub mod directory;
pub mod outbox;
pub mod session;
pub mod state;
pub mod sync;
pub mod thread;

pub use dedupe::{DedupeKey, DedupeTracker};
pub use directory::{ConversationDirectory, PeerDirectory};
pub use outbox::{Outbox, OutboxError, PendingSend};
pub use session::{AuthToken, SessionContext};
pub use state::{Action, ConnectionEvent, ConnectionState, Event};
pub use sync::{
    FetchRequest, LiveOutcome, MessageSynchronizer, SeedOutcome, Selection, SendOutcome,
    SyncError, SyncSettings,
};
pub use thread::{ActiveThreadView, DeliveryStatus, ThreadMessage, ThreadPhase, ThreadTarget};
