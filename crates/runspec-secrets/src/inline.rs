//! Inline secret backend
//!
//! Cleartext values supplied with the task are staged for a per-run store and
//! written through the [`SecretStore`] port when the run is submitted. The
//! container receives env entries that reference store keys, never the values.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use runspec_common::ENV_SECRET_PREFIX;
use runspec_workload::EnvironmentSet;
use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::backend::{
    ResolveContext, SecretBackend, SecretDeclaration, SecretReference, SecretResolution,
};
use crate::error::SecretError;
use crate::store::{SecretStore, StagedSecrets};
use crate::KIND_INLINE;

/// Suffix appended to the run name to form the inline store name
pub const INLINE_STORE_SUFFIX: &str = "-inline-secrets";

/// Store name for a run's inline secrets
pub fn inline_store_name(run_name: &str) -> String {
    format!("{run_name}{INLINE_STORE_SUFFIX}")
}

/// Env var name referencing an inline secret key
///
/// Keys are upper-cased; characters outside `[A-Z0-9_]` become `_`. Two keys
/// of one declaration that land on the same name are rejected at resolve time.
pub fn secret_env_name(key: &str) -> String {
    let normalized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{ENV_SECRET_PREFIX}{normalized}")
}

/// Backend for `inline` declarations
pub struct InlineBackend {
    store: Arc<dyn SecretStore>,
}

impl InlineBackend {
    /// Create a backend staging writes for `store`
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }
}

fn parse_source(source: &Value) -> Result<BTreeMap<String, SecretString>, SecretError> {
    let map = source.as_object().ok_or_else(|| {
        SecretError::invalid_source(KIND_INLINE, "source must be a map of name to value")
    })?;
    map.iter()
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key.clone(), SecretString::from(s.clone()))),
            _ => Err(SecretError::invalid_source(
                KIND_INLINE,
                format!("value of '{key}' must be a string"),
            )),
        })
        .collect()
}

#[async_trait]
impl SecretBackend for InlineBackend {
    fn kind(&self) -> &'static str {
        KIND_INLINE
    }

    #[instrument(skip(self, declaration), fields(run = %ctx.run_name))]
    async fn resolve(
        &self,
        declaration: &SecretDeclaration,
        ctx: &ResolveContext,
    ) -> Result<SecretResolution, SecretError> {
        let entries = parse_source(&declaration.source)?;
        let store = inline_store_name(&ctx.run_name);

        let mut env = EnvironmentSet::new();
        let mut claimed: BTreeMap<String, &str> = BTreeMap::new();
        for key in entries.keys() {
            let name = secret_env_name(key);
            if let Some(other) = claimed.insert(name.clone(), key) {
                return Err(SecretError::invalid_source(
                    KIND_INLINE,
                    format!("keys '{other}' and '{key}' both map to env {name}"),
                ));
            }
            env.set_secret_ref(name, &store, key);
        }
        debug!(store = %store, keys = entries.len(), "staged inline secrets");

        let keys: Vec<String> = entries.keys().cloned().collect();
        let staged = (!entries.is_empty()).then(|| {
            StagedSecrets::new(self.store.clone(), &ctx.namespace, &store, entries)
        });

        Ok(SecretResolution {
            env,
            mount: None,
            reference: SecretReference {
                kind: KIND_INLINE.to_string(),
                store,
                keys,
            },
            staged,
        })
    }
}
