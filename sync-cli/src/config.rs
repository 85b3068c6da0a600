//! Local files for the threadline CLI: the stored session and the client
//! configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use threadline_client::ClientConfig;
use threadline_core::{AuthToken, SessionContext};
use threadline_types::Identity;

const SESSION_FILE: &str = "session.json";
const CONFIG_FILE: &str = "config.toml";

/// Identity and token obtained from the external login flow.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionFile {
    /// Store user id.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Bearer token for the message store.
    pub token: String,
}

impl std::fmt::Debug for SessionFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFile")
            .field("user_id", &self.user_id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl SessionFile {
    /// The stored identity.
    pub fn identity(&self) -> Identity {
        Identity::new(self.user_id.as_str(), &self.name, &self.email)
    }

    /// Build the client session. The file copy of the token is not kept.
    pub fn into_session(self) -> SessionContext {
        let identity = self.identity();
        SessionContext::new(identity, AuthToken::new(self.token))
    }

    /// Token with all but its length hidden.
    pub fn redacted_token(&self) -> String {
        format!("[{} chars]", self.token.len())
    }

    /// Load the session from a data directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(SESSION_FILE);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("No session. Run 'threadline session set' first.")?;
        serde_json::from_str(&contents).context("Invalid session file")
    }

    /// Save the session to a data directory (owner-only permissions).
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(SESSION_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save session")?;
        set_file_permissions_0600(&path).await?;
        Ok(())
    }

    /// Delete the stored session. Succeeds if there is none.
    pub async fn delete(data_dir: &Path) -> Result<()> {
        let path = data_dir.join(SESSION_FILE);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to delete session"),
        }
    }

    /// Check if a session is stored.
    pub async fn exists(data_dir: &Path) -> bool {
        data_dir.join(SESSION_FILE).exists()
    }
}

/// Path of the client configuration: `--config`, or `<data_dir>/config.toml`.
pub fn config_path(explicit: Option<&Path>, data_dir: &Path) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| data_dir.join(CONFIG_FILE))
}

/// Load the client configuration, falling back to defaults when the file
/// is absent.
pub fn load_client_config(explicit: Option<&Path>, data_dir: &Path) -> Result<ClientConfig> {
    let path = config_path(explicit, data_dir);
    if explicit.is_some() {
        // An explicitly named file must exist
        return ClientConfig::from_file(&path).context("Failed to load configuration");
    }
    ClientConfig::from_file_or_default(&path).context("Failed to load configuration")
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> SessionFile {
        SessionFile {
            user_id: "u1".into(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            token: "secret-token".into(),
        }
    }

    #[tokio::test]
    async fn session_roundtrip() {
        let dir = tempdir().unwrap();
        sample().save(dir.path()).await.unwrap();

        let loaded = SessionFile::load(dir.path()).await.unwrap();
        assert_eq!(loaded.identity(), Identity::new("u1", "Ada", "ada@example.com"));

        let session = loaded.into_session();
        assert_eq!(session.token().expose(), "secret-token");
    }

    #[tokio::test]
    async fn missing_session_explains_how_to_fix() {
        let dir = tempdir().unwrap();

        let err = SessionFile::load(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("session set"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        sample().save(dir.path()).await.unwrap();

        SessionFile::delete(dir.path()).await.unwrap();
        assert!(!SessionFile::exists(dir.path()).await);
        SessionFile::delete(dir.path()).await.unwrap();
    }

    #[test]
    fn debug_output_hides_token() {
        let session = sample();
        assert!(!format!("{:?}", session).contains("secret-token"));
        assert_eq!(session.redacted_token(), "[12 chars]");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn session_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        sample().save(dir.path()).await.unwrap();

        let path = dir.path().join(SESSION_FILE);
        let perms = tokio::fs::metadata(&path).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600, "file should be 0600");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn data_dir_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("test-data");
        tokio::fs::create_dir_all(&data_dir).await.unwrap();
        set_dir_permissions_0700(&data_dir).await.unwrap();

        let perms = tokio::fs::metadata(&data_dir).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o700, "dir should be 0700");
    }

    #[test]
    fn config_defaults_to_data_dir() {
        let dir = tempdir().unwrap();
        assert_eq!(config_path(None, dir.path()), dir.path().join("config.toml"));

        let config = load_client_config(None, dir.path()).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("elsewhere.toml");

        assert!(load_client_config(Some(&missing), dir.path()).is_err());
    }

    #[test]
    fn explicit_config_is_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "api_base_url = \"https://chat.example.com\"\n").unwrap();

        let config = load_client_config(Some(&path), dir.path()).unwrap();
        assert_eq!(config.api_base_url, "https://chat.example.com");
    }
}
