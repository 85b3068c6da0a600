//! End the session.

use anyhow::{Context, Result};
use std::path::Path;
use threadline_client::{ChatClient, ClientError, MessageStore, Transport};

use crate::config::SessionFile;

/// Run the `logout` command.
///
/// The stored session is deleted even if the server-side logout fails.
pub async fn run<T: Transport + 'static, S: MessageStore>(
    client: &ChatClient<T, S>,
    data_dir: &Path,
) -> Result<()> {
    let result = client.logout().await;
    SessionFile::delete(data_dir).await?;

    match result {
        Ok(identity) => {
            println!("Logged out {} ({})", identity.display_name, identity.id);
            Ok(())
        }
        Err(ClientError::Logout(e)) => {
            tracing::warn!("Server logout failed: {}", e);
            println!("Logged out locally (server logout failed: {})", e);
            Ok(())
        }
        Err(e) => Err(e).context("Logout failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use tempfile::tempdir;
    use threadline_client::ClientConfig;

    async fn stored(dir: &Path) {
        SessionFile {
            user_id: "u1".into(),
            name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            token: "demo-token".into(),
        }
        .save(dir)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn logout_deletes_session_file() {
        let dir = tempdir().unwrap();
        stored(dir.path()).await;
        let client = demo::client(demo::session(), &ClientConfig::default());

        run(&client, dir.path()).await.unwrap();

        assert!(!SessionFile::exists(dir.path()).await);
        assert_eq!(client.store().logout_count(), 1);
    }

    #[tokio::test]
    async fn server_failure_still_logs_out_locally() {
        let dir = tempdir().unwrap();
        stored(dir.path()).await;
        let client = demo::client(demo::session(), &ClientConfig::default());
        client.store().fail_next_logout("gateway timeout");

        run(&client, dir.path()).await.unwrap();

        assert!(!SessionFile::exists(dir.path()).await);
        assert!(client.identity().await.is_err());
    }
}
