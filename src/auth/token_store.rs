//! File-backed session storage
//!
//! Stored in ~/.local/share/qbank/session.json with 0600 permissions
//! (owner read/write only).

use super::{AuthSession, SessionStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk format with a version for future migrations
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSession {
    version: u32,
    #[serde(flatten)]
    session: AuthSession,
    /// Unix timestamp of the last write
    stored_at: i64,
}

pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    const VERSION: u32 = 1;

    /// Store at the default data location
    pub fn new() -> Result<Self> {
        let data_dir = dirs::data_local_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .context("Failed to determine data directory")?;

        Ok(Self::at(data_dir.join("qbank").join("session.json")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Option<AuthSession>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Failed to read session file"),
        };

        let stored: StoredSession =
            serde_json::from_str(&content).context("Failed to parse session file")?;

        if stored.version > Self::VERSION {
            anyhow::bail!(
                "Session file version {} is newer than supported version {}",
                stored.version,
                Self::VERSION
            );
        }

        Ok(Some(stored.session))
    }

    async fn save(&self, session: &AuthSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create session directory")?;
        }

        let stored = StoredSession {
            version: Self::VERSION,
            session: session.clone(),
            stored_at: chrono::Utc::now().timestamp(),
        };
        let content = serde_json::to_string_pretty(&stored)?;

        // Write to temp file first, then rename (atomic)
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &content)
            .await
            .context("Failed to write temp session file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&temp_path, perms)
                .await
                .context("Failed to set session file permissions")?;
        }

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .context("Failed to save session file")?;

        tracing::debug!(target: "auth", "Saved session to {:?}", self.path);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::info!(target: "auth", "Deleted session file {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to delete session file"),
        }
    }
}
