//! # sync-client
//!
//! Client library for the Threadline messaging sync client.
//!
//! This is the library an application embeds to show a user's
//! conversations and keep the open thread current.
//!
//! ## Features
//!
//! - **History + live merge**: one ordered thread view, no duplicates
//! - **Optimistic sends**: local echo keyed by nonce, resend on failure
//! - **Transport Abstraction**: Pluggable live channel (WebSocket, mock)
//! - **Store Abstraction**: Pluggable message store (HTTP, mock)
//! - **Pure State Machine**: Uses sync-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use threadline_client::{ChatClient, ClientConfig, HttpStore, WebSocketTransport};
//!
//! let config = ClientConfig::default();
//! let store = HttpStore::new(&config.api_base_url, config.request_timeout())?;
//! let client = ChatClient::new(session, WebSocketTransport::new(), store, &config);
//!
//! client.connect().await?;
//! client.select_peer(&"u2".into()).await?;
//! client.send("hello").await?;
//!
//! while let Some(update) = client.pump_live().await {
//!     println!("{:?}", update);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod connection;
pub mod store;
pub mod transport;

pub use client::{ChatClient, ClientError, LiveUpdate, SendReceipt};
pub use config::{ClientConfig, ConfigError};
pub use connection::{ChannelEvent, ConnectionError, ConnectionManager, Subscription};
pub use store::{HttpStore, MessageStore, MockStore, StoreError};
pub use transport::{
    MockTransport, Transport, TransportError, WebSocketTransport, WebSocketTransportConfig,
    MAX_MESSAGE_SIZE,
};
