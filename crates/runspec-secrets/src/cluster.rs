//! Kubernetes adapters for the identity lookup and secret store ports

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::Client;
use runspec_common::config::VaultConfig;
use runspec_common::{LABEL_MANAGED_BY, LABEL_MANAGED_BY_RUNSPEC};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::store::{SecretStore, StoreError};
use crate::vault::{IdentityLookup, IdentityRecord, LookupError};

/// Field manager for server-side apply
const FIELD_MANAGER: &str = "runspec-compiler";

/// Identity lookup backed by project service accounts
pub struct KubeIdentityLookup {
    client: Client,
    namespace: String,
    config: VaultConfig,
}

impl KubeIdentityLookup {
    /// Look up service accounts in `namespace`, named by the vault config template
    pub fn new(client: Client, namespace: impl Into<String>, config: VaultConfig) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            config,
        }
    }
}

#[async_trait]
impl IdentityLookup for KubeIdentityLookup {
    async fn lookup_identity(&self, project: &str) -> Result<IdentityRecord, LookupError> {
        let name = self.config.service_account_for(project);
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), &self.namespace);

        let sa = api
            .get_opt(&name)
            .await
            .map_err(|e| LookupError::Unavailable(e.to_string()))?
            .ok_or_else(|| LookupError::NotFound { name: name.clone() })?;

        let secrets = sa
            .secrets
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| r.name)
            .collect();
        debug!(service_account = %name, "found project service account");

        Ok(IdentityRecord { name, secrets })
    }
}

/// Secret store that server-side-applies Opaque Secrets
pub struct KubeSecretStore {
    client: Client,
}

impl KubeSecretStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn store_secrets(
        &self,
        namespace: &str,
        store: &str,
        entries: &BTreeMap<String, SecretString>,
    ) -> Result<(), StoreError> {
        let string_data: serde_json::Map<String, serde_json::Value> = entries
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.expose_secret().to_string())))
            .collect();

        let secret_json = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {
                "name": store,
                "namespace": namespace,
                "labels": {
                    LABEL_MANAGED_BY: LABEL_MANAGED_BY_RUNSPEC,
                }
            },
            "type": "Opaque",
            "stringData": string_data,
        });

        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(store, &params, &Patch::Apply(&secret_json))
            .await
            .map_err(|e| StoreError::new(e.to_string()))?;

        debug!(store, namespace, keys = entries.len(), "applied secret store");
        Ok(())
    }

    async fn delete_secrets(&self, namespace: &str, store: &str) -> Result<(), StoreError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(store, &DeleteParams::default()).await {
            Ok(_) => {
                debug!(store, namespace, "deleted secret store");
                Ok(())
            }
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(StoreError::new(e.to_string())),
        }
    }
}
