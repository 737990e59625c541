//! Key-value storage backends and subscribable storage fields.
//!
//! [`KvStore`] is the persistence collaborator: a flat map of JSON values.
//! [`StorageField`] layers a typed, observable value on top of one key,
//! readable synchronously and written asynchronously. Every successful
//! write notifies the field's subscribers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{RwLock, watch};
use tracing::debug;

use crate::account::Account;
use crate::error::StorageResult;

/// Trait for key-value storage backends.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Load the value stored under `key`.
    async fn load(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn save(&self, key: &str, value: &Value) -> StorageResult<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List all stored keys.
    async fn list_keys(&self) -> StorageResult<Vec<String>>;

    /// Check if a key exists.
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.load(key).await?.is_some())
    }
}

/// In-memory key-value storage.
///
/// Fast but not persistent across restarts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    /// Create a new memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn load(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &Value) -> StorageResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_owned(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

/// File-based key-value storage.
///
/// Persists each key as a pretty-printed JSON file in a directory.
#[derive(Debug)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Create a new file store rooted at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Root directory of the store.
    #[must_use]
    pub const fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let safe_key = key.replace([':', '/', '\\'], "_");
        self.base_path.join(format!("{safe_key}.json"))
    }

    async fn ensure_dir(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn load(&self, key: &str) -> StorageResult<Option<Value>> {
        let path = self.entry_path(key);

        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&path).await?;
        let value = serde_json::from_str(&content)?;
        debug!(key = %key, "loaded entry from file");
        Ok(Some(value))
    }

    async fn save(&self, key: &str, value: &Value) -> StorageResult<()> {
        self.ensure_dir().await?;

        let path = self.entry_path(key);
        let content = serde_json::to_string_pretty(value)?;
        tokio::fs::write(&path, content).await?;
        debug!(key = %key, "saved entry to file");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.entry_path(key);

        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(&path).await?;
            debug!(key = %key, "deleted entry file");
        }
        Ok(())
    }

    async fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.ensure_dir().await?;

        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(stem) = path.file_stem()
            {
                keys.push(stem.to_string_lossy().into_owned());
            }
        }

        keys.sort();
        Ok(keys)
    }
}

/// A typed value persisted under one key of a [`KvStore`].
pub struct StorageField<T> {
    key: String,
    store: Arc<dyn KvStore>,
    tx: watch::Sender<T>,
}

impl<T> std::fmt::Debug for StorageField<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageField")
            .field("key", &self.key)
            .field("value", &*self.tx.borrow())
            .finish_non_exhaustive()
    }
}

impl<T> StorageField<T>
where
    T: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static,
{
    /// Load the field from `store`, falling back to `default` when the key
    /// has never been written.
    ///
    /// # Errors
    ///
    /// Fails when the backend cannot be read or the stored value does not
    /// deserialize into `T`.
    pub async fn load(
        store: Arc<dyn KvStore>,
        key: impl Into<String>,
        default: T,
    ) -> StorageResult<Self> {
        let key = key.into();
        let value = match store.load(&key).await? {
            Some(raw) => serde_json::from_value(raw)?,
            None => default,
        };
        let (tx, _) = watch::channel(value);
        Ok(Self { key, store, tx })
    }

    /// Storage key of this field.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Snapshot of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Persist `value` and notify subscribers.
    ///
    /// Returns `false` without touching the backend when `value` equals the
    /// current one.
    ///
    /// # Errors
    ///
    /// Fails when the backend write fails; the in-memory value is left
    /// unchanged in that case.
    pub async fn set(&self, value: T) -> StorageResult<bool> {
        if *self.tx.borrow() == value {
            return Ok(false);
        }
        let raw = serde_json::to_value(&value)?;
        self.store.save(&self.key, &raw).await?;
        self.tx.send_replace(value);
        debug!(key = %self.key, "storage field updated");
        Ok(true)
    }

    /// Receive every future value of this field.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

/// The persisted state of one chain family.
#[derive(Debug)]
pub struct ProviderStorage<P> {
    /// Currently selected account.
    pub account: StorageField<Account>,
    /// Currently selected provider type.
    pub provider_type: StorageField<P>,
}

impl<P> ProviderStorage<P>
where
    P: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static,
{
    /// Load both fields under `<namespace>.account` and
    /// `<namespace>.providerType`.
    ///
    /// # Errors
    ///
    /// See [`StorageField::load`].
    pub async fn load(
        store: Arc<dyn KvStore>,
        namespace: &str,
        default_account: Account,
        default_provider_type: P,
    ) -> StorageResult<Self> {
        let account = StorageField::load(
            Arc::clone(&store),
            format!("{namespace}.account"),
            default_account,
        )
        .await?;
        let provider_type = StorageField::load(
            store,
            format!("{namespace}.providerType"),
            default_provider_type,
        )
        .await?;
        Ok(Self {
            account,
            provider_type,
        })
    }
}
