//! Task: what to run (params, inputs, hyperparams, secrets)

use indexmap::IndexMap;
use runspec_secrets::SecretDeclaration;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::runtime::Metadata;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HyperParamOptions {
    /// Result selector (e.g., "max.accuracy")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub params: IndexMap<String, Value>,
    /// Input name to data locator
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub inputs: IndexMap<String, String>,
    /// Hyperparameter name to candidate values
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub hyperparams: IndexMap<String, Vec<Value>>,
    #[serde(default)]
    pub hyper_param_options: HyperParamOptions,
    /// Secret declarations, resolved in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_sources: Vec<SecretDeclaration>,
}

/// One invocation of a runtime
///
/// Built by value; the compiler only borrows it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: TaskSpec,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: Metadata::new(name),
            spec: TaskSpec::default(),
        }
    }

    /// Parse a task from YAML
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

    /// Merge a set of params (later keys overwrite)
    pub fn with_params<I, K>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.spec
            .params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.spec.params.insert(name.into(), value.into());
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, locator: impl Into<String>) -> Self {
        self.spec.inputs.insert(name.into(), locator.into());
        self
    }

    /// Set hyperparameters and the result selector
    pub fn with_hyper_params<I, K>(mut self, hyperparams: I, selector: Option<&str>) -> Self
    where
        I: IntoIterator<Item = (K, Vec<Value>)>,
        K: Into<String>,
    {
        self.spec.hyperparams = hyperparams
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .collect();
        self.spec.hyper_param_options.selector = selector.map(str::to_string);
        self
    }

    /// Attach a secret declaration
    pub fn with_secrets(mut self, kind: impl Into<String>, source: Value) -> Self {
        self.spec
            .secret_sources
            .push(SecretDeclaration::new(kind, source));
        self
    }
}
