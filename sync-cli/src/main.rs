//! # threadline
//!
//! Command-line client for Threadline messaging.
//!
//! ## Commands
//!
//! - `session set|show`: Store or show the identity and token from your login
//! - `conversations`, `peers`: List the directories
//! - `history`: Print a thread
//! - `send`: Send one message
//! - `chat`: Interactive chat with a peer
//! - `logout`: End the session
//!
//! ## Example
//!
//! ```bash
//! # Store the session obtained from the login flow
//! threadline session set --user-id u1 --name Ada --email ada@example.com --token "$TOKEN"
//!
//! # Start a conversation
//! threadline send --peer u2 "Hello!"
//!
//! # Chat live
//! threadline chat --peer u2
//!
//! # Try it offline with demo data
//! threadline --mock history --conversation c1
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use threadline_client::{
    ChatClient, ClientConfig, HttpStore, MessageStore, Transport, WebSocketTransport,
    WebSocketTransportConfig,
};
use threadline_core::SessionContext;
use threadline_types::UserId;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod demo;

use commands::{chat, directory, history, logout, send, session, Thread};
use config::SessionFile;

/// Command-line client for Threadline messaging.
#[derive(Parser, Debug)]
#[command(name = "threadline")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the session and configuration
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file (default: <data-dir>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use an in-memory store and live channel with demo data
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage the stored session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// List your conversations
    Conversations,

    /// List the users you can message
    Peers,

    /// Print the messages of a thread
    History {
        /// Conversation id
        #[arg(long, conflicts_with = "peer", required_unless_present = "peer")]
        conversation: Option<String>,

        /// Peer user id
        #[arg(long)]
        peer: Option<String>,
    },

    /// Send one message
    Send {
        /// Conversation id
        #[arg(long, conflicts_with = "peer", required_unless_present = "peer")]
        conversation: Option<String>,

        /// Peer user id (starts a conversation if none exists)
        #[arg(long)]
        peer: Option<String>,

        /// Message text
        message: String,
    },

    /// Chat with a peer interactively
    Chat {
        /// Peer user id
        #[arg(long)]
        peer: String,
    },

    /// Log out and delete the stored session
    Logout,
}

#[derive(Subcommand, Debug)]
enum SessionAction {
    /// Store the identity and token from the login flow
    Set {
        /// User id
        #[arg(long)]
        user_id: String,

        /// Display name
        #[arg(long)]
        name: String,

        /// Email address
        #[arg(long)]
        email: String,

        /// Bearer token for the message store
        #[arg(long)]
        token: String,
    },

    /// Show the stored identity (token redacted)
    Show,
}

/// Commands that run against a client.
enum ClientCommand {
    Conversations,
    Peers,
    History(Thread),
    Send(Thread, String),
    Chat(UserId),
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    config::set_dir_permissions_0700(&data_dir).await?;

    let command = match cli.command {
        Commands::Session { action } => return run_session(&data_dir, action).await,
        Commands::Conversations => ClientCommand::Conversations,
        Commands::Peers => ClientCommand::Peers,
        Commands::History { conversation, peer } => {
            ClientCommand::History(Thread::from_args(conversation, peer)?)
        }
        Commands::Send {
            conversation,
            peer,
            message,
        } => ClientCommand::Send(Thread::from_args(conversation, peer)?, message),
        Commands::Chat { peer } => ClientCommand::Chat(UserId::new(peer)),
        Commands::Logout => ClientCommand::Logout,
    };

    let client_config = config::load_client_config(cli.config.as_deref(), &data_dir)?;
    let session = load_session(&data_dir, cli.mock).await?;

    if cli.mock {
        let client = demo::client(session, &client_config);
        run_client(&client, command, &data_dir).await
    } else {
        let store = HttpStore::new(&client_config.api_base_url, client_config.request_timeout())
            .context("Failed to create store client")?;
        let transport = WebSocketTransport::with_config(WebSocketTransportConfig {
            connect_timeout: client_config.connect_timeout(),
            ..Default::default()
        });
        let client = ChatClient::new(session, transport, store, &client_config);
        run_client(&client, command, &data_dir).await
    }
}

async fn run_session(data_dir: &Path, action: SessionAction) -> Result<()> {
    match action {
        SessionAction::Set {
            user_id,
            name,
            email,
            token,
        } => {
            session::set(
                data_dir,
                SessionFile {
                    user_id,
                    name,
                    email,
                    token,
                },
            )
            .await
        }
        SessionAction::Show => session::show(data_dir).await,
    }
}

/// The stored session; in mock mode the demo identity when none is stored.
async fn load_session(data_dir: &Path, mock: bool) -> Result<SessionContext> {
    if mock && !SessionFile::exists(data_dir).await {
        return Ok(demo::session());
    }
    Ok(SessionFile::load(data_dir).await?.into_session())
}

async fn run_client<T: Transport + 'static, S: MessageStore>(
    client: &ChatClient<T, S>,
    command: ClientCommand,
    data_dir: &Path,
) -> Result<()> {
    match command {
        ClientCommand::Conversations => directory::conversations(client).await,
        ClientCommand::Peers => directory::peers(client).await,
        ClientCommand::History(thread) => history::run(client, &thread).await,
        ClientCommand::Send(thread, message) => send::run(client, &thread, &message).await.map(|_| ()),
        ClientCommand::Chat(peer) => chat::run(client, &peer).await,
        ClientCommand::Logout => logout::run(client, data_dir).await,
    }
}

/// Get the default data directory for threadline.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("chat", "threadline", "threadline")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
