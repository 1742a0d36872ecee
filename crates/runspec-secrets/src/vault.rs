//! Vault secret backend
//!
//! The execution image authenticates to vault itself. The compiler discovers
//! the token secret attached to the project's identity, mounts it, and tells
//! the image which role and URL to use.

use std::sync::Arc;

use async_trait::async_trait;
use runspec_common::config::VaultConfig;
use runspec_common::{ENV_VAULT_ROLE, ENV_VAULT_URL};
use runspec_workload::{EnvironmentSet, MountDescriptor};
use serde_json::Value;
use tracing::{debug, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::backend::{
    ResolveContext, SecretBackend, SecretDeclaration, SecretReference, SecretResolution,
};
use crate::error::SecretError;
use crate::KIND_VAULT;

/// Volume name of the mounted vault token
pub const VAULT_VOLUME_NAME: &str = "vault-secret";

/// Identity a project's workloads run as
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityRecord {
    /// Identity name (service account)
    pub name: String,
    /// Secrets attached to the identity, in attachment order
    pub secrets: Vec<String>,
}

/// Identity lookup failures
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The project has no identity
    #[error("identity {name} not found")]
    NotFound {
        /// Identity that was looked up
        name: String,
    },
    /// The lookup could not be performed
    #[error("identity lookup failed: {0}")]
    Unavailable(String),
}

/// Port for discovering a project's identity
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Look up the identity for `project`
    async fn lookup_identity(&self, project: &str) -> Result<IdentityRecord, LookupError>;
}

/// Backend for `vault` declarations
pub struct VaultBackend {
    lookup: Arc<dyn IdentityLookup>,
    config: VaultConfig,
    file_mode: i32,
}

impl VaultBackend {
    /// Create a backend
    pub fn new(lookup: Arc<dyn IdentityLookup>, config: VaultConfig, file_mode: i32) -> Self {
        Self {
            lookup,
            config,
            file_mode,
        }
    }
}

/// Project and secret names from either `{project, secrets}` or a bare list
fn parse_source(
    source: &Value,
    default_project: &str,
) -> Result<(String, Vec<String>), SecretError> {
    let (project, names) = match source {
        Value::Array(names) => (default_project.to_string(), names),
        Value::Object(map) => {
            let project = match map.get("project") {
                None | Some(Value::Null) => default_project.to_string(),
                Some(Value::String(p)) if !p.is_empty() => p.clone(),
                Some(_) => {
                    return Err(SecretError::invalid_source(
                        KIND_VAULT,
                        "project must be a non-empty string",
                    ))
                }
            };
            let names = map
                .get("secrets")
                .and_then(Value::as_array)
                .ok_or_else(|| SecretError::invalid_source(KIND_VAULT, "secrets must be a list"))?;
            (project, names)
        }
        _ => {
            return Err(SecretError::invalid_source(
                KIND_VAULT,
                "source must be a list of names or {project, secrets}",
            ))
        }
    };

    let names = names
        .iter()
        .map(|n| {
            n.as_str()
                .map(str::to_string)
                .ok_or_else(|| {
                    SecretError::invalid_source(KIND_VAULT, "secret names must be strings")
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((project, names))
}

#[async_trait]
impl SecretBackend for VaultBackend {
    fn kind(&self) -> &'static str {
        KIND_VAULT
    }

    #[instrument(skip(self, declaration, ctx), fields(run = %ctx.run_name))]
    async fn resolve(
        &self,
        declaration: &SecretDeclaration,
        ctx: &ResolveContext,
    ) -> Result<SecretResolution, SecretError> {
        let (project, names) = parse_source(&declaration.source, &ctx.project)?;

        let identity = self
            .lookup
            .lookup_identity(&project)
            .await
            .map_err(|e| {
                warn!(project = %project, error = %e, "vault identity lookup failed");
                SecretError::unavailable(&project, e.to_string())
            })?;

        let secret_name = identity
            .secrets
            .first()
            .cloned()
            .ok_or_else(|| SecretError::SecretNotFound {
                project: project.clone(),
                identity: identity.name.clone(),
            })?;
        debug!(
            project = %project,
            identity = %identity.name,
            secret = %secret_name,
            "discovered vault token secret"
        );

        let mut env = EnvironmentSet::new();
        env.set(ENV_VAULT_ROLE, format!("project:{project}"));
        env.set(ENV_VAULT_URL, self.config.remote_url.as_str());

        Ok(SecretResolution {
            env,
            mount: Some(MountDescriptor::Secret {
                volume_name: VAULT_VOLUME_NAME.to_string(),
                secret_name: secret_name.clone(),
                mount_path: self.config.token_path.clone(),
                default_mode: self.file_mode,
            }),
            reference: SecretReference {
                kind: KIND_VAULT.to_string(),
                store: secret_name,
                keys: names,
            },
            staged: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ResolveContext {
        ResolveContext {
            project: "task-project".to_string(),
            run_name: "run-1".to_string(),
            namespace: "ns".to_string(),
        }
    }

    fn config() -> VaultConfig {
        VaultConfig {
            remote_url: "https://vault.test:8200".to_string(),
            token_path: "/var/run/vault".to_string(),
            ..Default::default()
        }
    }

    fn lookup_returning(project: &'static str, secrets: Vec<&'static str>) -> MockIdentityLookup {
        let mut lookup = MockIdentityLookup::new();
        lookup
            .expect_lookup_identity()
            .withf(move |p| p == project)
            .times(1)
            .returning(move |p| {
                Ok(IdentityRecord {
                    name: format!("runspec-vault-{p}"),
                    secrets: secrets.iter().map(|s| s.to_string()).collect(),
                })
            });
        lookup
    }

    #[tokio::test]
    async fn mounts_discovered_secret_and_sets_role() {
        let backend = VaultBackend::new(
            Arc::new(lookup_returning("proj", vec!["test-secret", "other"])),
            config(),
            420,
        );
        let decl = SecretDeclaration::vault(Some("proj"), ["secret1", "secret2", "AWS_KEY"]);

        let res = backend.resolve(&decl, &ctx()).await.unwrap();

        assert_eq!(res.env.get_literal(ENV_VAULT_ROLE), Some("project:proj"));
        assert_eq!(res.env.get_literal(ENV_VAULT_URL), Some("https://vault.test:8200"));
        assert_eq!(
            res.mount,
            Some(MountDescriptor::Secret {
                volume_name: "vault-secret".to_string(),
                secret_name: "test-secret".to_string(),
                mount_path: "/var/run/vault".to_string(),
                default_mode: 420,
            })
        );
        assert_eq!(res.reference.keys, vec!["secret1", "secret2", "AWS_KEY"]);
    }

    #[tokio::test]
    async fn bare_list_uses_task_project() {
        let backend = VaultBackend::new(
            Arc::new(lookup_returning("task-project", vec!["tok"])),
            config(),
            420,
        );
        let decl = SecretDeclaration::vault(None, ["a"]);
        let res = backend.resolve(&decl, &ctx()).await.unwrap();
        assert_eq!(res.env.get_literal(ENV_VAULT_ROLE), Some("project:task-project"));
    }

    #[tokio::test]
    async fn identity_without_secret_is_not_found() {
        let backend = VaultBackend::new(Arc::new(lookup_returning("proj", vec![])), config(), 420);
        let decl = SecretDeclaration::vault(Some("proj"), ["a"]);
        match backend.resolve(&decl, &ctx()).await {
            Err(SecretError::SecretNotFound { project, identity }) => {
                assert_eq!(project, "proj");
                assert_eq!(identity, "runspec-vault-proj");
            }
            other => panic!("expected SecretNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn lookup_failures_mean_unavailable() {
        for failure in [
            LookupError::Unavailable("connection refused".to_string()),
            LookupError::NotFound {
                name: "runspec-vault-proj".to_string(),
            },
        ] {
            let mut lookup = MockIdentityLookup::new();
            lookup.expect_lookup_identity().return_once(move |_| Err(failure));
            let backend = VaultBackend::new(Arc::new(lookup), config(), 420);
            let decl = SecretDeclaration::vault(Some("proj"), ["a"]);

            assert!(matches!(
                backend.resolve(&decl, &ctx()).await,
                Err(SecretError::SecretBackendUnavailable { .. })
            ));
        }
    }

    #[tokio::test]
    async fn malformed_source_is_invalid() {
        let mut lookup = MockIdentityLookup::new();
        lookup.expect_lookup_identity().never();
        let backend = VaultBackend::new(Arc::new(lookup), config(), 420);

        for source in [
            serde_json::json!("secret1"),
            serde_json::json!({ "project": "p" }),
            serde_json::json!([1, 2]),
        ] {
            let decl = SecretDeclaration::new(KIND_VAULT, source);
            assert!(matches!(
                backend.resolve(&decl, &ctx()).await,
                Err(SecretError::InvalidSource { .. })
            ));
        }
    }
}
