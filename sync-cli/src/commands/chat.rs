//! Interactive chat with one peer.

use anyhow::{Context, Result};
use threadline_client::{ChatClient, ClientError, LiveUpdate, MessageStore, Transport};
use threadline_core::LiveOutcome;
use threadline_types::{Identity, Nonce, UserId};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{format_message, print_view, select, Thread};

/// What the input loop does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading.
    Continue,
    /// Leave the chat.
    Quit,
}

/// Input state kept between lines.
#[derive(Debug, Default)]
pub struct Prompt {
    last_failed: Option<Nonce>,
}

impl Prompt {
    /// Handle one line typed by the user.
    ///
    /// `/quit` leaves, `/retry` resends the last failed message, anything
    /// else is sent. Send failures are printed, not returned.
    pub async fn submit<T: Transport + 'static, S: MessageStore>(
        &mut self,
        client: &ChatClient<T, S>,
        line: &str,
    ) -> Flow {
        let line = line.trim();
        match line {
            "" => Flow::Continue,
            "/quit" => Flow::Quit,
            "/retry" => {
                match self.last_failed.take() {
                    Some(nonce) => self.report(client.resend(&nonce).await),
                    None => println!("* nothing to retry"),
                }
                Flow::Continue
            }
            body => {
                self.report(client.send(body).await);
                Flow::Continue
            }
        }
    }

    fn report<T>(&mut self, result: Result<T, ClientError>) {
        match result {
            Ok(_) => {}
            Err(ClientError::Send { nonce, source }) => {
                println!("* not delivered ({}); type /retry to resend", source);
                self.last_failed = Some(nonce);
            }
            Err(e) => println!("* {}", e),
        }
    }
}

/// Text to print for a live update, if any.
pub fn describe_update(update: &LiveUpdate, me: &UserId, peer: &Identity) -> Option<String> {
    match update {
        LiveUpdate::Message {
            outcome: LiveOutcome::Appended | LiveOutcome::Buffered,
            message,
        } => Some(format_message(message, me, peer)),
        LiveUpdate::Message { .. } => None,
        LiveUpdate::Presence { online } => {
            let state = if online.contains(&peer.id) { "online" } else { "offline" };
            Some(format!("* {} is {}", peer.display_name, state))
        }
    }
}

/// Run the `chat` command.
pub async fn run<T: Transport + 'static, S: MessageStore>(
    client: &ChatClient<T, S>,
    peer_id: &UserId,
) -> Result<()> {
    let me = client.identity().await?.id;
    client.connect().await.context("Failed to open live channel")?;

    let view = select(client, &Thread::Peer(peer_id.clone())).await?;
    print_view(&view, &me);
    println!("Type a message and press Enter. /quit or Ctrl-D to leave.");

    let mut status = client.watch_connection();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut prompt = Prompt::default();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                if prompt.submit(client, &line).await == Flow::Quit {
                    break;
                }
            }
            // Cancel safe: an event taken by a losing branch is applied next time
            update = client.pump_live() => {
                let Some(update) = update else {
                    break;
                };
                if let Some(text) = describe_update(&update, &me, &view.peer) {
                    println!("{}", text);
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                if !status.borrow_and_update().is_connected() {
                    println!("* live channel closed; messages are still stored");
                }
            }
        }
    }

    client.disconnect().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use threadline_client::ClientConfig;
    use threadline_types::{Message, MessageOrigin};

    fn bob() -> Identity {
        Identity::new("u2", "Bob Babbage", "bob@example.com")
    }

    fn live(body: &str) -> Message {
        Message {
            conversation_id: "c1".into(),
            sender_id: "u2".into(),
            body: body.into(),
            nonce: None,
            origin: MessageOrigin::Live,
        }
    }

    #[test]
    fn appended_messages_are_printed() {
        let me = UserId::from("u1");
        let update = LiveUpdate::Message {
            outcome: LiveOutcome::Appended,
            message: live("ping"),
        };
        assert_eq!(
            describe_update(&update, &me, &bob()),
            Some("[Bob Babbage] ping".to_string())
        );
    }

    #[test]
    fn dropped_messages_are_silent() {
        let me = UserId::from("u1");
        for outcome in [LiveOutcome::Duplicate, LiveOutcome::Echo, LiveOutcome::Discarded] {
            let update = LiveUpdate::Message {
                outcome,
                message: live("x"),
            };
            assert_eq!(describe_update(&update, &me, &bob()), None);
        }
    }

    #[test]
    fn presence_reports_peer_state() {
        let me = UserId::from("u1");
        let update = LiveUpdate::Presence {
            online: vec![UserId::from("u1"), UserId::from("u2")],
        };
        assert_eq!(
            describe_update(&update, &me, &bob()),
            Some("* Bob Babbage is online".to_string())
        );
    }

    #[tokio::test]
    async fn prompt_sends_and_quits() {
        let client = demo::client(demo::session(), &ClientConfig::default());
        client.select_conversation(&"c1".into()).await.unwrap();
        let mut prompt = Prompt::default();

        assert_eq!(prompt.submit(&client, "  ").await, Flow::Continue);
        assert_eq!(prompt.submit(&client, "hello").await, Flow::Continue);
        assert_eq!(prompt.submit(&client, "/quit").await, Flow::Quit);

        assert_eq!(client.store().created().len(), 1);
    }

    #[tokio::test]
    async fn prompt_retries_failed_send() {
        let client = demo::client(demo::session(), &ClientConfig::default());
        client.select_conversation(&"c1".into()).await.unwrap();
        client.store().fail_next_create("disk full");
        let mut prompt = Prompt::default();

        prompt.submit(&client, "important").await;
        assert!(client.store().created().is_empty());

        prompt.submit(&client, "/retry").await;
        let created = client.store().created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].message, "important");
    }
}
