//! # sync-types
//!
//! Entity and wire format types for the Threadline messaging sync client.
//!
//! This crate provides the foundational types used across all Threadline crates:
//! - [`UserId`], [`ConversationId`], [`Nonce`] - Identity and correlation types
//! - [`Identity`], [`Conversation`], [`Message`] - Session entities
//! - [`LiveEvent`] - Live channel events (presence, message delivery)
//! - [`records`] - JSON records exchanged with the message store API
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod entities;
mod error;
mod events;
mod ids;
pub mod records;

pub use entities::{Conversation, Identity, Message, MessageOrigin};
pub use error::WireError;
pub use events::{ActiveUsers, DeliverMessage, LiveEvent, RegisterPresence, SendMessage};
pub use ids::{ConversationId, Nonce, UserId, NEW_CONVERSATION};
