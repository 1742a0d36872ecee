//! Compiled workload descriptor and pod rendering

use std::collections::BTreeMap;

use indexmap::IndexMap;
use k8s_openapi::api::core::v1::Pod;
use runspec_secrets::SecretReference;
use runspec_workload::k8s::{Container, Volume, VolumeMount};
use runspec_workload::{CodePayload, EnvironmentSet, MountDescriptor, ResourceDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::HyperParamOptions;

/// Name of the single container in a run pod
pub const CONTAINER_NAME: &str = "base";

/// Run metadata carried to the execution image
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    /// Task name
    pub name: String,
    pub project: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Everything the execution image needs to reconstruct the run.
///
/// Serialized into `RUNSPEC_EXEC_CONFIG`. Holds secret references only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPayload {
    pub metadata: RunMetadata,
    #[serde(default)]
    pub params: IndexMap<String, Value>,
    #[serde(default)]
    pub inputs: IndexMap<String, String>,
    #[serde(default)]
    pub hyperparams: IndexMap<String, Vec<Value>>,
    #[serde(default)]
    pub hyper_param_options: HyperParamOptions,
    #[serde(default)]
    pub secret_refs: Vec<SecretReference>,
}

/// Immutable, fully owned output of compilation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadDescriptor {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<CodePayload>,
    pub env: EnvironmentSet,
    pub resources: ResourceDescriptor,
    pub mounts: Vec<MountDescriptor>,
    pub secret_refs: Vec<SecretReference>,
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    pub run: RunPayload,
}

impl WorkloadDescriptor {
    /// All volumes, in mount order
    pub fn volumes(&self) -> Vec<Volume> {
        self.mounts.iter().flat_map(MountDescriptor::volumes).collect()
    }

    /// All container volume mounts, in mount order
    pub fn volume_mounts(&self) -> Vec<VolumeMount> {
        self.mounts
            .iter()
            .flat_map(MountDescriptor::volume_mounts)
            .collect()
    }

    /// The run container
    pub fn container(&self) -> Container {
        Container {
            name: CONTAINER_NAME.to_string(),
            image: self.image.clone(),
            image_pull_policy: self.image_pull_policy.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.to_env_vars(),
            resources: self.resources.to_requirements(),
            volume_mounts: self.volume_mounts(),
        }
    }

    /// Pod manifest as JSON
    pub fn pod_manifest(&self) -> Value {
        let mut spec = serde_json::json!({
            "restartPolicy": "Never",
            "containers": [self.container()],
        });
        let volumes = self.volumes();
        if !volumes.is_empty() {
            spec["volumes"] = serde_json::json!(volumes);
        }
        if let Some(ref sa) = self.service_account {
            spec["serviceAccountName"] = Value::String(sa.clone());
        }
        if !self.node_selector.is_empty() {
            spec["nodeSelector"] = serde_json::json!(self.node_selector);
        }

        serde_json::json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": self.name,
                "namespace": self.namespace,
                "labels": self.labels,
            },
            "spec": spec,
        })
    }

    /// Typed pod
    pub fn to_pod(&self) -> Result<Pod, serde_json::Error> {
        serde_json::from_value(self.pod_manifest())
    }
}
