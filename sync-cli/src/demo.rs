//! Offline demo data for `--mock`.

use threadline_client::{ChatClient, ClientConfig, MockStore, MockTransport};
use threadline_core::{AuthToken, SessionContext};
use threadline_types::Identity;

/// Demo client type.
pub type DemoClient = ChatClient<MockTransport, MockStore>;

/// Identity used when `--mock` runs without a stored session.
pub fn identity() -> Identity {
    Identity::new("u1", "Ada Lovelace", "ada@example.com")
}

/// Session for [`identity`].
pub fn session() -> SessionContext {
    SessionContext::new(identity(), AuthToken::new("demo-token"))
}

/// A store with two peers and one conversation with the first of them.
pub fn store(me: &Identity) -> MockStore {
    let store = MockStore::new();
    store.add_user(me.clone());

    let others: Vec<Identity> = [
        Identity::new("u2", "Bob Babbage", "bob@example.com"),
        Identity::new("u3", "Cleo Hopper", "cleo@example.com"),
    ]
    .into_iter()
    .filter(|peer| peer.id != me.id)
    .collect();
    for peer in &others {
        store.add_user(peer.clone());
    }

    if let Some(first) = others.first() {
        store.add_conversation("c1", me.id.as_str(), first.id.as_str());
        store.add_message("c1", first.id.as_str(), "Hey, did the build pass?");
        store.add_message("c1", me.id.as_str(), "Green on all targets.");
        store.add_message("c1", first.id.as_str(), "Nice.");
    }
    store
}

/// Client wired to the demo store and a mock live channel.
pub fn client(session: SessionContext, config: &ClientConfig) -> DemoClient {
    let store = store(session.identity());
    ChatClient::new(session, MockTransport::new(), store, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_thread_has_history() {
        let client = client(session(), &ClientConfig::default());

        client.select_conversation(&"c1".into()).await.unwrap();

        let view = client.view().await.unwrap();
        assert_eq!(view.peer.display_name, "Bob Babbage");
        assert_eq!(view.messages.len(), 3);
    }

    #[tokio::test]
    async fn demo_never_lists_self_as_peer() {
        let me = Identity::new("u2", "Bob Babbage", "bob@example.com");
        let client = client(
            SessionContext::new(me, AuthToken::new("t")),
            &ClientConfig::default(),
        );

        client.mount().await.unwrap();

        let ids: Vec<String> = client.peers().await.iter().map(|p| p.id.to_string()).collect();
        assert_eq!(ids, vec!["u3"]);
    }
}
