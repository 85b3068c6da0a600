//! List conversations and peers.

use anyhow::{Context, Result};
use threadline_client::{ChatClient, MessageStore, Transport};

/// Run the `conversations` command.
pub async fn conversations<T: Transport + 'static, S: MessageStore>(
    client: &ChatClient<T, S>,
) -> Result<()> {
    client.mount().await.context("Failed to load conversations")?;
    let conversations = client.conversations().await;

    if conversations.is_empty() {
        println!("No conversations yet. Start one with 'threadline send --peer <id> <message>'.");
        return Ok(());
    }
    println!("Conversations ({}):", conversations.len());
    for conversation in conversations {
        println!(
            "  {}  {} <{}>",
            conversation.conversation_id, conversation.peer.display_name, conversation.peer.email
        );
    }
    Ok(())
}

/// Run the `peers` command.
pub async fn peers<T: Transport + 'static, S: MessageStore>(client: &ChatClient<T, S>) -> Result<()> {
    client.mount().await.context("Failed to load peers")?;
    let peers = client.peers().await;

    if peers.is_empty() {
        println!("No other users.");
        return Ok(());
    }
    println!("Peers ({}):", peers.len());
    for peer in peers {
        println!("  {}  {} <{}>", peer.id, peer.display_name, peer.email);
    }
    Ok(())
}
