//! Secret backend trait and kind-keyed registry

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use runspec_workload::{EnvironmentSet, MountDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::error::SecretError;
use crate::store::StagedSecrets;
use crate::{KIND_INLINE, KIND_VAULT};

/// A secret declaration attached to a task: backend kind plus kind-specific source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SecretDeclaration {
    /// Backend kind (e.g., "inline", "vault")
    pub kind: String,
    /// Kind-specific source
    pub source: Value,
}

impl SecretDeclaration {
    /// Create a declaration of any kind
    pub fn new(kind: impl Into<String>, source: Value) -> Self {
        Self {
            kind: kind.into(),
            source,
        }
    }

    /// Inline declaration from name/cleartext pairs
    pub fn inline<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: serde_json::Map<String, Value> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();
        Self::new(KIND_INLINE, Value::Object(map))
    }

    /// Vault declaration for a set of secret names
    ///
    /// Without a project the resolving task's project is used.
    pub fn vault<I, S>(project: Option<&str>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<Value> = names.into_iter().map(|n| Value::String(n.into())).collect();
        let source = match project {
            Some(project) => serde_json::json!({ "project": project, "secrets": names }),
            None => Value::Array(names),
        };
        Self::new(KIND_VAULT, source)
    }
}

/// Where a backend is resolving for
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveContext {
    /// Owning project
    pub project: String,
    /// Unique run name
    pub run_name: String,
    /// Target namespace
    pub namespace: String,
}

/// Names-only pointer to resolved secret material
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretReference {
    /// Backend kind
    pub kind: String,
    /// Store holding the material
    pub store: String,
    /// Secret names available through the store
    pub keys: Vec<String>,
}

/// What a backend contributes to a workload
#[derive(Clone, Debug)]
pub struct SecretResolution {
    /// Environment entries
    pub env: EnvironmentSet,
    /// Secret mount, if the backend needs one
    pub mount: Option<MountDescriptor>,
    /// Reference recorded on the descriptor
    pub reference: SecretReference,
    /// Cleartext to write when the run is submitted
    pub staged: Option<StagedSecrets>,
}

/// A backend that materializes one kind of secret declaration
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretBackend: Send + Sync {
    /// Kind this backend handles
    fn kind(&self) -> &'static str;

    /// Resolve a declaration of this backend's kind
    async fn resolve(
        &self,
        declaration: &SecretDeclaration,
        ctx: &ResolveContext,
    ) -> Result<SecretResolution, SecretError>;
}

/// Registry of secret backends keyed by kind
#[derive(Default)]
pub struct SecretResolver {
    backends: HashMap<&'static str, Arc<dyn SecretBackend>>,
}

impl SecretResolver {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its kind, replacing any existing one
    pub fn register(&mut self, backend: Arc<dyn SecretBackend>) {
        self.backends.insert(backend.kind(), backend);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with_backend(mut self, backend: Arc<dyn SecretBackend>) -> Self {
        self.register(backend);
        self
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.backends.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Resolve a declaration with the backend registered for its kind
    pub async fn resolve(
        &self,
        declaration: &SecretDeclaration,
        ctx: &ResolveContext,
    ) -> Result<SecretResolution, SecretError> {
        let backend = self.backends.get(declaration.kind.as_str()).ok_or_else(|| {
            SecretError::UnsupportedSecretKind {
                kind: declaration.kind.clone(),
            }
        })?;
        debug!(kind = %declaration.kind, project = %ctx.project, "resolving secret declaration");
        backend.resolve(declaration, ctx).await
    }
}

impl std::fmt::Debug for SecretResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretResolver")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ResolveContext {
        ResolveContext {
            project: "proj".to_string(),
            run_name: "run-abc".to_string(),
            namespace: "ns".to_string(),
        }
    }

    fn mock_backend(kind: &'static str) -> MockSecretBackend {
        let mut backend = MockSecretBackend::new();
        backend.expect_kind().return_const(kind);
        backend
    }

    #[tokio::test]
    async fn unknown_kind_is_unsupported() {
        let resolver = SecretResolver::new().with_backend(Arc::new(mock_backend("inline")));
        let decl = SecretDeclaration::new("s3", serde_json::json!({}));

        let err = resolver.resolve(&decl, &ctx()).await.unwrap_err();
        assert!(matches!(err, SecretError::UnsupportedSecretKind { kind } if kind == "s3"));
    }

    #[tokio::test]
    async fn dispatches_by_kind() {
        let mut vault = mock_backend("vault");
        vault.expect_resolve().times(1).returning(|decl, ctx| {
            Ok(SecretResolution {
                env: EnvironmentSet::new(),
                mount: None,
                reference: SecretReference {
                    kind: decl.kind.clone(),
                    store: ctx.project.clone(),
                    keys: vec![],
                },
                staged: None,
            })
        });
        let mut inline = mock_backend("inline");
        inline.expect_resolve().never();

        let resolver = SecretResolver::new()
            .with_backend(Arc::new(vault))
            .with_backend(Arc::new(inline));
        assert_eq!(resolver.kinds(), vec!["inline", "vault"]);

        let decl = SecretDeclaration::vault(None, ["a"]);
        let res = resolver.resolve(&decl, &ctx()).await.unwrap();
        assert_eq!(res.reference.kind, "vault");
        assert_eq!(res.reference.store, "proj");
    }

    #[test]
    fn vault_declaration_shapes() {
        let with_project = SecretDeclaration::vault(Some("p"), ["a", "b"]);
        assert_eq!(with_project.source["project"], "p");
        assert_eq!(with_project.source["secrets"][1], "b");

        let bare = SecretDeclaration::vault(None, ["a"]);
        assert!(bare.source.is_array());
    }

    #[test]
    fn inline_declaration_is_string_map() {
        let decl = SecretDeclaration::inline([("secret1", "password1")]);
        assert_eq!(decl.kind, KIND_INLINE);
        assert_eq!(decl.source["secret1"], "password1");
    }
}
