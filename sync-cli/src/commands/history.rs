//! Show a thread's history.

use anyhow::Result;
use threadline_client::{ChatClient, MessageStore, Transport};

use super::{print_view, select, Thread};

/// Run the `history` command.
pub async fn run<T: Transport + 'static, S: MessageStore>(
    client: &ChatClient<T, S>,
    thread: &Thread,
) -> Result<()> {
    let me = client.identity().await?.id;
    let view = select(client, thread).await?;
    print_view(&view, &me);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use threadline_client::ClientConfig;

    #[tokio::test]
    async fn shows_existing_conversation() {
        let client = demo::client(demo::session(), &ClientConfig::default());

        run(&client, &Thread::Conversation("c1".into())).await.unwrap();

        assert_eq!(client.store().history_fetches(), 1);
    }

    #[tokio::test]
    async fn peer_without_conversation_shows_empty_thread() {
        let client = demo::client(demo::session(), &ClientConfig::default());

        run(&client, &Thread::Peer("u3".into())).await.unwrap();

        let view = client.view().await.unwrap();
        assert!(view.conversation_id.is_sentinel());
        assert!(view.messages.is_empty());
    }

    #[tokio::test]
    async fn unknown_conversation_fails() {
        let client = demo::client(demo::session(), &ClientConfig::default());

        let err = run(&client, &Thread::Conversation("c404".into()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("c404"));
    }
}
