//! Cluster submission port and the Kubernetes submitter

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, PostParams};
use kube::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

#[cfg(test)]
use mockall::automock;

use crate::descriptor::WorkloadDescriptor;

/// Acknowledgment returned by the cluster
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionHandle {
    pub name: String,
    pub namespace: String,
    /// Run uid
    pub uid: String,
}

impl SubmissionHandle {
    /// Handle for a descriptor
    pub fn for_descriptor(descriptor: &WorkloadDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            namespace: descriptor.namespace.clone(),
            uid: descriptor.uid.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The cluster refused the workload
    #[error("cluster rejected workload: {message}")]
    Rejected { message: String },

    /// The cluster could not be reached
    #[error("cluster transport error: {message}")]
    Transport { message: String },

    #[error("failed to render workload: {0}")]
    Render(#[from] serde_json::Error),
}

impl SubmitError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<kube::Error> for SubmitError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(resp) => Self::Rejected {
                message: format!("{} ({})", resp.message, resp.reason),
            },
            other => Self::Transport {
                message: other.to_string(),
            },
        }
    }
}

/// Port that accepts compiled workloads
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterSubmitter: Send + Sync {
    async fn submit(
        &self,
        descriptor: &WorkloadDescriptor,
    ) -> Result<SubmissionHandle, SubmitError>;
}

/// Observed state of a submitted run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl ExecutionState {
    /// Map a pod phase
    pub fn from_pod_phase(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => Self::Pending,
            Some("Running") => Self::Running,
            Some("Succeeded") => Self::Succeeded,
            Some("Failed") => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// True once the run can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Submits runs as bare pods
pub struct KubeSubmitter {
    client: Client,
}

impl KubeSubmitter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Current state of a submitted run
    #[instrument(skip(self), fields(run = %handle.name))]
    pub async fn observe(&self, handle: &SubmissionHandle) -> Result<ExecutionState, SubmitError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &handle.namespace);
        let state = match api.get_opt(&handle.name).await? {
            Some(pod) => ExecutionState::from_pod_phase(
                pod.status.as_ref().and_then(|s| s.phase.as_deref()),
            ),
            None => ExecutionState::Unknown,
        };
        debug!(state = ?state, "observed run");
        Ok(state)
    }
}

#[async_trait]
impl ClusterSubmitter for KubeSubmitter {
    #[instrument(skip_all, fields(run = %descriptor.name, namespace = %descriptor.namespace))]
    async fn submit(
        &self,
        descriptor: &WorkloadDescriptor,
    ) -> Result<SubmissionHandle, SubmitError> {
        let pod = descriptor.to_pod()?;
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &descriptor.namespace);
        api.create(&PostParams::default(), &pod).await?;
        info!("created run pod");
        Ok(SubmissionHandle::for_descriptor(descriptor))
    }
}
