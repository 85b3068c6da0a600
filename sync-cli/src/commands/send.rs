//! Send one message.

use anyhow::{Context, Result};
use threadline_client::{ChatClient, MessageStore, SendReceipt, Transport};
use threadline_core::SendOutcome;

use super::{select, Thread};

/// Run the `send` command.
///
/// The live channel is best-effort: if it cannot be opened the message is
/// still written to the store.
pub async fn run<T: Transport + 'static, S: MessageStore>(
    client: &ChatClient<T, S>,
    thread: &Thread,
    message: &str,
) -> Result<SendReceipt> {
    if let Err(e) = client.connect().await {
        tracing::warn!("Live channel unavailable, storing only: {}", e);
    }

    let view = select(client, thread).await?;
    let receipt = client.send(message).await.context("Failed to send message")?;

    println!("Sent to {} ({})", view.peer.display_name, view.peer.id);
    println!("  Nonce:     {}", receipt.nonce);
    println!("  Published: {}", if receipt.published { "live" } else { "store only" });
    if let SendOutcome::ConversationAssigned {
        conversation_id, ..
    } = &receipt.outcome
    {
        println!("  New conversation: {}", conversation_id);
    }

    client.disconnect().await;
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use threadline_client::ClientConfig;
    use threadline_types::ConversationId;

    #[tokio::test]
    async fn send_to_existing_conversation() {
        let client = demo::client(demo::session(), &ClientConfig::default());

        let receipt = run(&client, &Thread::Conversation("c1".into()), "hello")
            .await
            .unwrap();

        assert!(receipt.published);
        assert_eq!(receipt.outcome, SendOutcome::Delivered);
        assert_eq!(client.store().created().len(), 1);
    }

    #[tokio::test]
    async fn first_send_to_peer_reports_new_conversation() {
        let client = demo::client(demo::session(), &ClientConfig::default());

        let receipt = run(&client, &Thread::Peer("u3".into()), "hi Cleo")
            .await
            .unwrap();

        match receipt.outcome {
            SendOutcome::ConversationAssigned {
                conversation_id, ..
            } => assert_ne!(conversation_id, ConversationId::new_sentinel()),
            other => panic!("Expected new conversation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_without_live_channel_still_stores() {
        let client = demo::client(demo::session(), &ClientConfig::default());
        client.transport().fail_next_connect("refused");

        let receipt = run(&client, &Thread::Conversation("c1".into()), "later")
            .await
            .unwrap();

        assert!(!receipt.published);
        assert_eq!(client.store().created().len(), 1);
    }

    #[tokio::test]
    async fn store_failure_is_an_error() {
        let client = demo::client(demo::session(), &ClientConfig::default());
        client.store().fail_next_create("disk full");

        let result = run(&client, &Thread::Conversation("c1".into()), "lost").await;

        assert!(result.is_err());
    }
}
