//! Keychain-backed secure store
//!
//! Thin wrapper over the platform keychain (macOS Keychain Access, Windows
//! Credential Manager, Linux kernel keyring) via `keyring`.
//!
//! The keychain has no portable "list entries" call, so every written key is
//! also recorded in an index entry under the same service. `delete_all`
//! walks that index.
//!
//! Keychain calls block (and may raise an OS unlock prompt), so each port
//! method runs on the blocking pool.

use std::collections::BTreeSet;

use async_trait::async_trait;
use keyring::Entry;
use realmkey_core::SecureStore;
use realmkey_domain::{AuthError, Result};
use tokio::task;
use tracing::debug;

use crate::errors::to_auth;

/// Default keychain service name
pub const DEFAULT_SERVICE_NAME: &str = "Realmkey.session";

const INDEX_KEY: &str = "__realmkey_index";

/// `SecureStore` over the platform keychain.
#[derive(Debug, Clone)]
pub struct KeychainSecureStore {
    service_name: String,
}

impl KeychainSecureStore {
    /// Create a store scoped to `service_name`.
    ///
    /// Use a distinct service per realm/client to keep sessions apart.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into() }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service_name, key).map_err(to_auth)
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(to_auth(err)),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(to_auth(err)),
        }
    }

    fn load_index(&self) -> Result<BTreeSet<String>> {
        self.get(INDEX_KEY)?.map_or_else(|| Ok(BTreeSet::new()), |raw| decode_index(&raw))
    }

    fn save_index(&self, index: &BTreeSet<String>) -> Result<()> {
        self.entry(INDEX_KEY)?.set_password(&encode_index(index)?).map_err(to_auth)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?.set_password(value).map_err(to_auth)?;

        let mut index = self.load_index()?;
        if index.insert(key.to_string()) {
            self.save_index(&index)?;
        }
        Ok(())
    }

    fn purge(&self) -> Result<()> {
        let index = self.load_index()?;
        debug!(service = %self.service_name, entries = index.len(), "Purging keychain entries");

        for key in &index {
            self.remove(key)?;
        }
        self.remove(INDEX_KEY)
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Self) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        task::spawn_blocking(move || op(store)).await.map_err(map_join_error)?
    }
}

impl Default for KeychainSecureStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

#[async_trait]
impl SecureStore for KeychainSecureStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        debug!(service = %self.service_name, key = %key, "Reading secret from keychain");
        let key = key.to_string();
        self.blocking(move |store| store.get(&key)).await
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        debug!(service = %self.service_name, key = %key, "Storing secret in keychain");
        let (key, value) = (key.to_string(), value.to_string());
        self.blocking(move |store| store.put(&key, &value)).await
    }

    async fn delete_all(&self) -> Result<()> {
        self.blocking(|store| store.purge()).await
    }
}

fn map_join_error(err: task::JoinError) -> AuthError {
    AuthError::Internal(format!("keychain task failed: {err}"))
}

fn encode_index(index: &BTreeSet<String>) -> Result<String> {
    serde_json::to_string(index).map_err(|err| AuthError::Internal(format!("index encode: {err}")))
}

fn decode_index(raw: &str) -> Result<BTreeSet<String>> {
    serde_json::from_str(raw)
        .map_err(|err| AuthError::Storage(format!("keychain index is corrupt: {err}")))
}
