//! Secret store port
//!
//! The inline backend stages cleartext as [`StagedSecrets`] and keeps only the
//! store name and keys on the resolution. Staged entries are written through
//! this port when the run is submitted. [`InMemorySecretStore`] backs dry runs
//! and tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::error::SecretError;

#[cfg(test)]
use mockall::automock;

/// Failure reported by a secret store
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct StoreError {
    /// Description of the failure
    pub message: String,
}

impl StoreError {
    /// Create a store error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Destination for cleartext secret values
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Create or replace `store` in `namespace` with the given entries
    async fn store_secrets(
        &self,
        namespace: &str,
        store: &str,
        entries: &BTreeMap<String, SecretString>,
    ) -> Result<(), StoreError>;

    /// Remove `store` from `namespace`; a missing store is not an error
    async fn delete_secrets(&self, namespace: &str, store: &str) -> Result<(), StoreError>;
}

/// Cleartext entries bound for one store, not yet written
#[derive(Clone)]
pub struct StagedSecrets {
    sink: Arc<dyn SecretStore>,
    namespace: String,
    store: String,
    entries: BTreeMap<String, SecretString>,
}

impl StagedSecrets {
    /// Stage `entries` for `store` in `namespace`
    pub fn new(
        sink: Arc<dyn SecretStore>,
        namespace: impl Into<String>,
        store: impl Into<String>,
        entries: BTreeMap<String, SecretString>,
    ) -> Self {
        Self {
            sink,
            namespace: namespace.into(),
            store: store.into(),
            entries,
        }
    }

    /// Target namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Target store name
    pub fn store(&self) -> &str {
        &self.store
    }

    /// Staged key names
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// True if `other` targets the same store
    pub fn same_target(&self, other: &StagedSecrets) -> bool {
        self.namespace == other.namespace && self.store == other.store
    }

    /// Fold `other`'s entries into this one; later values win
    pub fn merge(&mut self, other: StagedSecrets) {
        self.entries.extend(other.entries);
    }

    /// Write the staged entries
    pub async fn commit(&self) -> Result<(), SecretError> {
        self.sink
            .store_secrets(&self.namespace, &self.store, &self.entries)
            .await
            .map_err(|e| self.store_error(e))?;
        debug!(store = %self.store, keys = self.entries.len(), "committed staged secrets");
        Ok(())
    }

    /// Remove a previously committed store
    pub async fn discard(&self) -> Result<(), SecretError> {
        self.sink
            .delete_secrets(&self.namespace, &self.store)
            .await
            .map_err(|e| self.store_error(e))?;
        debug!(store = %self.store, "discarded staged secrets");
        Ok(())
    }

    fn store_error(&self, e: StoreError) -> SecretError {
        SecretError::Store {
            store: self.store.clone(),
            message: e.message,
        }
    }
}

impl std::fmt::Debug for StagedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedSecrets")
            .field("namespace", &self.namespace)
            .field("store", &self.store)
            .field("keys", &self.keys())
            .finish()
    }
}

/// Secret store that keeps entries in process memory
#[derive(Default)]
pub struct InMemorySecretStore {
    stores: Mutex<BTreeMap<(String, String), BTreeMap<String, SecretString>>>,
}

impl InMemorySecretStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys written to `store` in `namespace`
    pub fn keys(&self, namespace: &str, store: &str) -> Option<Vec<String>> {
        self.stores
            .lock()
            .get(&(namespace.to_string(), store.to_string()))
            .map(|entries| entries.keys().cloned().collect())
    }

    /// Cleartext value of one key
    pub fn reveal(&self, namespace: &str, store: &str, key: &str) -> Option<String> {
        self.stores
            .lock()
            .get(&(namespace.to_string(), store.to_string()))
            .and_then(|entries| entries.get(key))
            .map(|value| value.expose_secret().to_string())
    }

    /// Number of stores written
    pub fn len(&self) -> usize {
        self.stores.lock().len()
    }

    /// True if nothing was written
    pub fn is_empty(&self) -> bool {
        self.stores.lock().is_empty()
    }
}

impl std::fmt::Debug for InMemorySecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySecretStore")
            .field("stores", &self.stores.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn store_secrets(
        &self,
        namespace: &str,
        store: &str,
        entries: &BTreeMap<String, SecretString>,
    ) -> Result<(), StoreError> {
        let copy = entries
            .iter()
            .map(|(k, v)| (k.clone(), SecretString::from(v.expose_secret().to_string())))
            .collect();
        self.stores
            .lock()
            .insert((namespace.to_string(), store.to_string()), copy);
        Ok(())
    }

    async fn delete_secrets(&self, namespace: &str, store: &str) -> Result<(), StoreError> {
        self.stores
            .lock()
            .remove(&(namespace.to_string(), store.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replaces_store_contents() {
        let store = InMemorySecretStore::new();
        let first = BTreeMap::from([
            ("a".to_string(), SecretString::from("1".to_string())),
            ("b".to_string(), SecretString::from("2".to_string())),
        ]);
        store.store_secrets("ns", "s", &first).await.unwrap();

        let second = BTreeMap::from([("c".to_string(), SecretString::from("3".to_string()))]);
        store.store_secrets("ns", "s", &second).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.keys("ns", "s"), Some(vec!["c".to_string()]));
        assert_eq!(store.reveal("ns", "s", "c").as_deref(), Some("3"));
        assert!(store.reveal("other", "s", "c").is_none());
    }

    fn entries(pairs: &[(&str, &str)]) -> BTreeMap<String, SecretString> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), SecretString::from(v.to_string())))
            .collect()
    }

    #[tokio::test]
    async fn staged_secrets_write_only_on_commit() {
        let store = Arc::new(InMemorySecretStore::new());
        let staged = StagedSecrets::new(store.clone(), "ns", "s", entries(&[("k", "v")]));
        assert!(store.is_empty());

        staged.commit().await.unwrap();
        assert_eq!(store.reveal("ns", "s", "k").as_deref(), Some("v"));

        staged.discard().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn commit_failure_names_the_store() {
        let mut sink = MockSecretStore::new();
        sink.expect_store_secrets()
            .returning(|_, _, _| Err(StoreError::new("forbidden")));
        let staged = StagedSecrets::new(
            Arc::new(sink),
            "ns",
            "run-inline-secrets",
            entries(&[("k", "v")]),
        );

        match staged.commit().await {
            Err(SecretError::Store { store, message }) => {
                assert_eq!(store, "run-inline-secrets");
                assert_eq!(message, "forbidden");
            }
            other => panic!("expected store error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn merged_stages_write_one_store() {
        let store = Arc::new(InMemorySecretStore::new());
        let mut first = StagedSecrets::new(store.clone(), "ns", "s", entries(&[("a", "1")]));
        let second = StagedSecrets::new(
            store.clone(),
            "ns",
            "s",
            entries(&[("a", "2"), ("b", "3")]),
        );
        assert!(first.same_target(&second));

        first.merge(second);
        first.commit().await.unwrap();
        assert_eq!(store.keys("ns", "s"), Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(store.reveal("ns", "s", "a").as_deref(), Some("2"));
    }

    #[test]
    fn staged_debug_lists_keys_only() {
        let staged = StagedSecrets::new(
            Arc::new(InMemorySecretStore::new()),
            "ns",
            "s",
            entries(&[("token", "hunter2")]),
        );
        let rendered = format!("{staged:?}");
        assert!(rendered.contains("token"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn debug_does_not_print_values() {
        let store = InMemorySecretStore::new();
        store.stores.lock().insert(
            ("ns".to_string(), "s".to_string()),
            BTreeMap::from([("k".to_string(), SecretString::from("hunter2".to_string()))]),
        );
        assert!(!format!("{store:?}").contains("hunter2"));
    }
}
