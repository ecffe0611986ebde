//! File-backed preference store
//!
//! Flags live in a small JSON object (`{"has_run_before": true}`). A missing
//! file reads as empty; the first write creates parent directories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use realmkey_core::PreferenceStore;
use realmkey_domain::{AuthError, Result};
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::to_auth;

const FILE_NAME: &str = "preferences.json";

/// `PreferenceStore` persisted as a JSON file.
#[derive(Debug)]
pub struct FilePreferenceStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within the process
    write_lock: Mutex<()>,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    /// Store under the per-user config directory, falling back to
    /// `./.realmkey` when no home directory is known.
    pub fn new_default() -> Self {
        Self::new(default_dir().join(FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, bool>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(to_auth(err)),
        };

        serde_json::from_str(&raw).map_err(|err| {
            AuthError::Storage(format!("preferences file {} is corrupt: {err}", self.path.display()))
        })
    }

    async fn save(&self, values: &BTreeMap<String, bool>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(to_auth)?;
        }
        let serialized = serde_json::to_string_pretty(values).map_err(to_auth)?;
        tokio::fs::write(&self.path, serialized).await.map_err(to_auth)
    }
}

#[async_trait]
impl PreferenceStore for FilePreferenceStore {
    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        Ok(self.load().await?.get(key).copied())
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut values = self.load().await?;
        values.insert(key.to_string(), value);
        self.save(&values).await?;

        debug!(path = %self.path.display(), key = %key, value, "Preference stored");
        Ok(())
    }
}

fn default_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "realmkey", "realmkey")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".realmkey"))
}
