//! Local filesystem state store.
//!
//! One pretty-printed JSON document per account. Writes go to a temp file
//! that is renamed over the target, so a crash never leaves a torn file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::MonitorState;
use crate::storage::StateStore;

#[derive(Debug, Clone)]
pub struct LocalStateStore {
    root_dir: PathBuf,
}

impl LocalStateStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// File holding the state of `username`.
    pub fn path(&self, username: &str) -> PathBuf {
        self.root_dir.join(format!("{}.json", file_stem(username)))
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Read bytes, returning None if the file doesn't exist.
    async fn read_bytes(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self, username: &str) -> Result<MonitorState> {
        let path = self.path(username);
        match self.read_bytes(&path).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => {
                log::debug!("No saved state for @{username} at {}", path.display());
                Ok(MonitorState::default())
            }
        }
    }

    async fn save(&self, username: &str, state: &MonitorState) -> Result<()> {
        let path = self.path(username);
        let bytes = serde_json::to_vec_pretty(state)?;
        self.write_bytes(&path, &bytes).await?;
        log::debug!("Saved state for @{username} to {}", path.display());
        Ok(())
    }
}

/// Handles are `[A-Za-z0-9_]`; anything else is replaced so a hostile name
/// cannot escape the state directory.
fn file_stem(username: &str) -> String {
    let stem: String = username
        .trim()
        .trim_start_matches('@')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() { "_".to_string() } else { stem }
}
