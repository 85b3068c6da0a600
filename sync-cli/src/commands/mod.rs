//! CLI command implementations.

pub mod chat;
pub mod directory;
pub mod history;
pub mod logout;
pub mod send;
pub mod session;

use anyhow::{Context, Result};
use threadline_client::{ChatClient, MessageStore, Transport};
use threadline_core::{ActiveThreadView, DeliveryStatus, ThreadMessage};
use threadline_types::{ConversationId, Identity, Message, UserId};

/// Which thread a command works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thread {
    /// An existing conversation.
    Conversation(ConversationId),
    /// A peer, with or without a conversation yet.
    Peer(UserId),
}

impl Thread {
    /// Build from the `--conversation` / `--peer` options.
    pub fn from_args(conversation: Option<String>, peer: Option<String>) -> Result<Self> {
        match (conversation, peer) {
            (Some(id), None) => Ok(Self::Conversation(ConversationId::new(id))),
            (None, Some(id)) => Ok(Self::Peer(UserId::new(id))),
            _ => anyhow::bail!("Specify exactly one of --conversation or --peer"),
        }
    }
}

/// Select `thread` and wait for its history.
pub async fn select<T: Transport + 'static, S: MessageStore>(
    client: &ChatClient<T, S>,
    thread: &Thread,
) -> Result<ActiveThreadView> {
    match thread {
        Thread::Conversation(id) => client
            .select_conversation(id)
            .await
            .with_context(|| format!("Failed to open conversation {}", id))?,
        Thread::Peer(id) => client
            .select_peer(id)
            .await
            .with_context(|| format!("Failed to open thread with {}", id))?,
    }
    client
        .view()
        .await
        .context("Thread was replaced while loading")
}

/// One display line for a message: `[me] text` or `[Peer Name] text`.
pub fn format_message(message: &Message, me: &UserId, peer: &Identity) -> String {
    let author = if message.is_from(me) {
        "me"
    } else if message.sender_id == peer.id && !peer.display_name.is_empty() {
        peer.display_name.as_str()
    } else {
        message.sender_id.as_str()
    };
    format!("[{}] {}", author, message.body)
}

/// [`format_message`] plus the delivery state of our own sends.
pub fn format_entry(entry: &ThreadMessage, me: &UserId, peer: &Identity) -> String {
    let line = format_message(&entry.message, me, peer);
    match entry.status {
        DeliveryStatus::Delivered => line,
        DeliveryStatus::Pending => format!("{} (pending)", line),
        DeliveryStatus::Failed => format!("{} (failed)", line),
    }
}

/// Print a thread header and its messages.
pub fn print_view(view: &ActiveThreadView, me: &UserId) {
    if view.conversation_id.is_sentinel() {
        println!("New thread with {} ({})", view.peer.display_name, view.peer.id);
    } else {
        println!(
            "Conversation {} with {} ({})",
            view.conversation_id, view.peer.display_name, view.peer.id
        );
    }
    if view.messages.is_empty() {
        println!("  (no messages)");
    }
    for entry in &view.messages {
        println!("  {}", format_entry(entry, me, &view.peer));
    }
}
