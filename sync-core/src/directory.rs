//! Conversation and peer directories.
//!
//! Both are loaded once per session from the message store and keep the
//! server's order. The conversation directory grows only when our own first
//! send to a new peer is assigned a conversation id.

use std::collections::HashSet;
use threadline_types::{Conversation, ConversationId, Identity, UserId};

use crate::thread::ThreadTarget;

/// Existing conversations of the session user.
#[derive(Debug, Clone, Default)]
pub struct ConversationDirectory {
    entries: Vec<Conversation>,
    loaded: bool,
}

impl ConversationDirectory {
    /// Create an empty, unloaded directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate from a store listing. Later calls are ignored.
    ///
    /// Returns `false` if the directory was already loaded.
    pub fn load(&mut self, conversations: Vec<Conversation>) -> bool {
        if self.loaded {
            return false;
        }
        self.entries = conversations;
        self.loaded = true;
        true
    }

    /// Whether the directory has been populated.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Conversations in server order.
    pub fn list(&self) -> &[Conversation] {
        &self.entries
    }

    /// Find a conversation by id.
    pub fn find(&self, id: &ConversationId) -> Option<&Conversation> {
        self.entries.iter().find(|c| &c.conversation_id == id)
    }

    /// Find the conversation held with a peer.
    pub fn find_by_peer(&self, peer_id: &UserId) -> Option<&Conversation> {
        self.entries.iter().find(|c| &c.peer.id == peer_id)
    }

    /// Record a conversation created by our first send to a peer.
    ///
    /// Ignored if a conversation with that id is already listed.
    pub fn record_created(&mut self, conversation: Conversation) {
        if self.find(&conversation.conversation_id).is_none() {
            self.entries.push(conversation);
        }
    }

    /// Thread target for selecting a peer: their existing conversation, or
    /// the sentinel if none exists yet.
    pub fn target_for_peer(&self, peer: &Identity) -> ThreadTarget {
        match self.find_by_peer(&peer.id) {
            Some(existing) => ThreadTarget::new(existing.conversation_id.clone(), existing.peer.clone()),
            None => ThreadTarget::new(ConversationId::new_sentinel(), peer.clone()),
        }
    }

    /// Forget all entries (logout).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.loaded = false;
    }
}

/// Other known users, plus who is currently on the live channel.
#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    peers: Vec<Identity>,
    online: HashSet<UserId>,
    loaded: bool,
}

impl PeerDirectory {
    /// Create an empty, unloaded directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate from a store listing. Later calls are ignored.
    ///
    /// Returns `false` if the directory was already loaded.
    pub fn load(&mut self, peers: Vec<Identity>) -> bool {
        if self.loaded {
            return false;
        }
        self.peers = peers;
        self.loaded = true;
        true
    }

    /// Whether the directory has been populated.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Peers in server order.
    pub fn list(&self) -> &[Identity] {
        &self.peers
    }

    /// Find a peer by id.
    pub fn find(&self, id: &UserId) -> Option<&Identity> {
        self.peers.iter().find(|p| &p.id == id)
    }

    /// Replace the online roster from a presence event.
    pub fn set_online<I: IntoIterator<Item = UserId>>(&mut self, users: I) {
        self.online = users.into_iter().collect();
    }

    /// Whether a peer is currently on the live channel.
    pub fn is_online(&self, id: &UserId) -> bool {
        self.online.contains(id)
    }

    /// Forget all entries (logout).
    pub fn clear(&mut self) {
        self.peers.clear();
        self.online.clear();
        self.loaded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: &str, name: &str) -> Identity {
        Identity::new(id, name, &format!("{}@example.com", id))
    }

    fn conversation(id: &str, peer: &str) -> Conversation {
        Conversation {
            conversation_id: id.into(),
            peer: identity(peer, peer),
        }
    }

    #[test]
    fn load_keeps_server_order() {
        let mut directory = ConversationDirectory::new();
        assert!(!directory.is_loaded());

        directory.load(vec![conversation("c2", "u3"), conversation("c1", "u2")]);

        let ids: Vec<&str> = directory
            .list()
            .iter()
            .map(|c| c.conversation_id.as_str())
            .collect();
        assert_eq!(ids, vec!["c2", "c1"]);
    }

    #[test]
    fn load_happens_once() {
        let mut directory = ConversationDirectory::new();
        assert!(directory.load(vec![conversation("c1", "u2")]));
        assert!(!directory.load(vec![]));
        assert_eq!(directory.list().len(), 1);
    }

    #[test]
    fn peer_with_conversation_targets_it() {
        let mut directory = ConversationDirectory::new();
        directory.load(vec![conversation("c1", "u2")]);

        let target = directory.target_for_peer(&identity("u2", "u2"));
        assert_eq!(target.conversation_id, ConversationId::from("c1"));
    }

    #[test]
    fn peer_without_conversation_targets_sentinel() {
        let directory = ConversationDirectory::new();

        let target = directory.target_for_peer(&identity("u9", "Nine"));
        assert!(target.conversation_id.is_sentinel());
        assert_eq!(target.peer.display_name, "Nine");
    }

    #[test]
    fn record_created_appends_once() {
        let mut directory = ConversationDirectory::new();
        directory.load(vec![]);

        directory.record_created(conversation("c7", "u2"));
        directory.record_created(conversation("c7", "u2"));

        assert_eq!(directory.list().len(), 1);
        assert!(directory.find_by_peer(&UserId::from("u2")).is_some());
    }

    #[test]
    fn peer_roster_tracks_online() {
        let mut peers = PeerDirectory::new();
        peers.load(vec![identity("u2", "Bob"), identity("u3", "Cleo")]);

        peers.set_online(vec![UserId::from("u3")]);

        assert!(peers.is_online(&UserId::from("u3")));
        assert!(!peers.is_online(&UserId::from("u2")));
        assert_eq!(peers.find(&UserId::from("u2")).unwrap().display_name, "Bob");
    }

    #[test]
    fn clear_unloads() {
        let mut peers = PeerDirectory::new();
        peers.load(vec![identity("u2", "Bob")]);
        peers.clear();

        assert!(!peers.is_loaded());
        assert!(peers.list().is_empty());
        assert!(peers.load(vec![identity("u3", "Cleo")]));
    }
}
