//! Store and show the local session.

use anyhow::Result;
use std::path::Path;

use crate::config::SessionFile;

/// Run `session set`.
pub async fn set(data_dir: &Path, session: SessionFile) -> Result<()> {
    if session.token.trim().is_empty() {
        anyhow::bail!("Token must not be empty");
    }
    let replaced = SessionFile::exists(data_dir).await;
    session.save(data_dir).await?;

    println!("Session stored for {} ({})", session.name, session.user_id);
    if replaced {
        println!("  (previous session replaced)");
    }
    Ok(())
}

/// Run `session show`.
pub async fn show(data_dir: &Path) -> Result<()> {
    match SessionFile::load(data_dir).await {
        Ok(session) => {
            println!("Session:");
            println!("  User:  {}", session.user_id);
            println!("  Name:  {}", session.name);
            println!("  Email: {}", session.email);
            println!("  Token: {}", session.redacted_token());
        }
        Err(_) => {
            println!("Session: NONE");
            println!();
            println!("Run 'threadline session set --user-id <id> --name <name> --email <email> --token <token>'.");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(token: &str) -> SessionFile {
        SessionFile {
            user_id: "u1".into(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            token: token.into(),
        }
    }

    #[tokio::test]
    async fn set_then_show() {
        let dir = tempdir().unwrap();

        set(dir.path(), sample("tok")).await.unwrap();

        assert!(SessionFile::exists(dir.path()).await);
        assert!(show(dir.path()).await.is_ok());
    }

    #[tokio::test]
    async fn empty_token_is_rejected() {
        let dir = tempdir().unwrap();

        assert!(set(dir.path(), sample("  ")).await.is_err());
        assert!(!SessionFile::exists(dir.path()).await);
    }

    #[tokio::test]
    async fn show_without_session() {
        let dir = tempdir().unwrap();
        assert!(show(dir.path()).await.is_ok());
    }
}
