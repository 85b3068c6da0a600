//! Connection state machine for the live channel.
//!
//! This module provides a pure, side-effect-free state machine for managing
//! the live channel lifecycle. The state machine takes events as input and
//! produces a new state plus a list of actions to execute.
//!
//! The actual I/O (opening the channel, announcing presence) is performed by
//! sync-client, not by this module. There is no automatic reconnect: a failed
//! or lost channel lands in `Disconnected` and the caller decides to retry.

use threadline_types::UserId;

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No channel open.
    #[default]
    Disconnected,
    /// Channel open in progress for this user.
    Connecting {
        /// The user the channel is being opened for.
        user_id: UserId,
    },
    /// Channel open and presence announced.
    Connected {
        /// The user whose presence is registered.
        user_id: UserId,
    },
}

impl ConnectionState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (sync-client)
    /// is responsible for executing the returned actions in order.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // Same identity while opening or open: idempotent
            (Self::Connecting { user_id }, Event::ConnectRequested { user_id: requested })
                if user_id == requested =>
            {
                (Self::Connecting { user_id }, vec![])
            }
            (Self::Connected { user_id }, Event::ConnectRequested { user_id: requested })
                if user_id == requested =>
            {
                (Self::Connected { user_id }, vec![])
            }

            // Different identity: drop the old channel first
            (Self::Connecting { .. } | Self::Connected { .. }, Event::ConnectRequested { user_id }) => (
                Self::Connecting { user_id },
                vec![Action::CloseChannel, Action::OpenChannel],
            ),

            // From Disconnected
            (Self::Disconnected, Event::ConnectRequested { user_id }) => {
                (Self::Connecting { user_id }, vec![Action::OpenChannel])
            }

            // From Connecting
            (Self::Connecting { user_id }, Event::ConnectSucceeded) => (
                Self::Connected {
                    user_id: user_id.clone(),
                },
                vec![
                    Action::AnnouncePresence {
                        user_id: user_id.clone(),
                    },
                    Action::EmitEvent(ConnectionEvent::Connected { user_id }),
                ],
            ),
            (Self::Connecting { .. }, Event::ConnectFailed { error }) => (
                Self::Disconnected,
                vec![Action::EmitEvent(ConnectionEvent::ConnectionFailed { error })],
            ),

            // From Connected
            (Self::Connected { .. }, Event::ChannelLost { reason }) => (
                Self::Disconnected,
                vec![
                    Action::CloseChannel,
                    Action::EmitEvent(ConnectionEvent::Disconnected { reason }),
                ],
            ),

            // Explicit disconnect from any live state
            (Self::Connecting { .. } | Self::Connected { .. }, Event::DisconnectRequested) => (
                Self::Disconnected,
                vec![
                    Action::CloseChannel,
                    Action::EmitEvent(ConnectionEvent::Disconnected {
                        reason: "user requested".into(),
                    }),
                ],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Check if currently trying to connect.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting { .. })
    }

    /// The user this state belongs to, if any.
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Disconnected => None,
            Self::Connecting { user_id } | Self::Connected { user_id } => Some(user_id),
        }
    }
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Caller asked to connect as this user.
    ConnectRequested {
        /// The session user.
        user_id: UserId,
    },
    /// Transport channel opened.
    ConnectSucceeded,
    /// Transport channel failed to open.
    ConnectFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// An open channel closed or errored.
    ChannelLost {
        /// Reason for the loss.
        reason: String,
    },
    /// Caller asked to disconnect.
    DisconnectRequested,
}

/// Actions to be executed by the sync-client.
///
/// These are instructions, not side effects. The sync-client interprets
/// these and performs the actual I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open the transport channel.
    OpenChannel,
    /// Close the transport channel and stop reading from it.
    CloseChannel,
    /// Send the presence registration for this user.
    AnnouncePresence {
        /// The user to register.
        user_id: UserId,
    },
    /// Emit an event to the application.
    EmitEvent(ConnectionEvent),
}

/// Events emitted to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Channel open and presence announced.
    Connected {
        /// The registered user.
        user_id: UserId,
    },
    /// The channel could not be opened.
    ConnectionFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// The channel closed.
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
}
