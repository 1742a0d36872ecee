//! Runtime: how to run (image, resources, env, mounts, code)

use std::collections::BTreeMap;

use runspec_workload::{
    CompilationError, EnvValue, EnvironmentSet, MountDescriptor, MountStrategy, ResourceDescriptor,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Name, project and labels shared by runtimes and tasks
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Execution template for a run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSpec {
    pub image: String,
    /// Entrypoint; the configured exec command is used when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// User environment, applied last at compile time
    #[serde(default)]
    pub env: EnvironmentSet,
    #[serde(default)]
    pub resources: ResourceDescriptor,
    /// Auto-selected network or PVC mount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount: Option<MountDescriptor>,
    /// Inline code body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
}

/// A job runtime
///
/// Mutated in place before compilation. The compiler snapshots the spec, so
/// changes made after `compile` never reach an already compiled descriptor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Runtime {
    pub metadata: Metadata,
    pub spec: RuntimeSpec,
}

impl Runtime {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            metadata: Metadata::new(name),
            spec: RuntimeSpec {
                image: image.into(),
                ..Default::default()
            },
        }
    }

    /// Parse a runtime from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.metadata.project = Some(project.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Merge resource limits. On error the runtime is unchanged.
    pub fn with_limits(
        &mut self,
        mem: Option<&str>,
        cpu: Option<&str>,
        gpus: Option<u32>,
        gpu_type: Option<&str>,
    ) -> Result<&mut Self, CompilationError> {
        self.spec.resources.set_limits(mem, cpu, gpus, gpu_type)?;
        Ok(self)
    }

    /// Merge resource requests. On error the runtime is unchanged.
    pub fn with_requests(
        &mut self,
        mem: Option<&str>,
        cpu: Option<&str>,
    ) -> Result<&mut Self, CompilationError> {
        self.spec.resources.set_requests(mem, cpu)?;
        Ok(self)
    }

    /// Insert or replace an environment variable
    pub fn set_env(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.spec.env.set(name, EnvValue::Literal(value.into()));
        self
    }

    /// Insert or replace an environment variable read from a cluster secret.
    ///
    /// Like [`set_env`](Self::set_env), this wins over injected entries.
    pub fn set_env_from_secret(
        &mut self,
        name: impl Into<String>,
        secret_name: impl Into<String>,
        key: impl Into<String>,
    ) -> &mut Self {
        self.spec.env.set_secret_ref(name, secret_name, key);
        self
    }

    /// Attach inline code, replacing any previous body
    pub fn with_code(&mut self, body: impl Into<String>) -> &mut Self {
        self.spec.code = Some(body.into());
        self
    }

    /// Apply a mount strategy, discarding any previous selection.
    ///
    /// An empty strategy clears the mount.
    pub fn apply(&mut self, strategy: MountStrategy) -> &mut Self {
        let mount = strategy.into_descriptor();
        debug!(
            runtime = %self.metadata.name,
            kind = mount.as_ref().map_or("none", MountDescriptor::kind_name),
            "applied mount strategy"
        );
        self.spec.mount = mount;
        self
    }

    pub fn with_service_account(mut self, service_account: impl Into<String>) -> Self {
        self.spec.service_account = Some(service_account.into());
        self
    }

    pub fn with_node_selector(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.node_selector.insert(key.into(), value.into());
        self
    }

    pub fn with_image_pull_policy(mut self, policy: impl Into<String>) -> Self {
        self.spec.image_pull_policy = Some(policy.into());
        self
    }
}
