//! Ordered environment sets
//!
//! An [`EnvironmentSet`] keeps first-insertion order and lets a later write
//! for the same name replace the value in place. Backend-injected entries go
//! in first; user entries are layered on top and win on conflict.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::k8s::{EnvVar, SecretKeySelector};

/// Value of a single environment variable
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    /// Plain value
    Literal(String),
    /// Reference to a key inside a cluster secret
    SecretKeyRef {
        /// Secret name and key
        #[serde(rename = "secretKeyRef")]
        secret_key_ref: SecretKeySelector,
    },
}

impl EnvValue {
    /// Literal value, if this is not a secret reference
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(v) => Some(v),
            Self::SecretKeyRef { .. } => None,
        }
    }

    fn to_env_var(&self, name: &str) -> EnvVar {
        match self {
            Self::Literal(v) => EnvVar::literal(name, v.clone()),
            Self::SecretKeyRef { secret_key_ref } => {
                EnvVar::from_secret(name, &secret_key_ref.name, &secret_key_ref.key)
            }
        }
    }
}

impl From<String> for EnvValue {
    fn from(v: String) -> Self {
        Self::Literal(v)
    }
}

impl From<&str> for EnvValue {
    fn from(v: &str) -> Self {
        Self::Literal(v.to_string())
    }
}

/// Ordered mapping from variable name to value, unique by name
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentSet(IndexMap<String, EnvValue>);

impl EnvironmentSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value. Replacing an existing name keeps its original position.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<EnvValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Set a secret key reference
    pub fn set_secret_ref(
        &mut self,
        name: impl Into<String>,
        secret_name: impl Into<String>,
        key: impl Into<String>,
    ) {
        self.set(
            name,
            EnvValue::SecretKeyRef {
                secret_key_ref: SecretKeySelector {
                    name: secret_name.into(),
                    key: key.into(),
                },
            },
        );
    }

    /// Look up a value
    pub fn get(&self, name: &str) -> Option<&EnvValue> {
        self.0.get(name)
    }

    /// Look up a literal value
    pub fn get_literal(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(EnvValue::as_literal)
    }

    /// True if `name` is set
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no variables are set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EnvValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Layer another set on top of this one (later wins)
    pub fn extend(&mut self, other: EnvironmentSet) {
        self.0.extend(other.0);
    }

    /// Compose the final set: injected entries first, user entries override
    pub fn compose(injected: EnvironmentSet, user: &EnvironmentSet) -> EnvironmentSet {
        let mut out = injected;
        out.extend(user.clone());
        out
    }

    /// Render as container env vars, in order
    pub fn to_env_vars(&self) -> Vec<EnvVar> {
        self.0.iter().map(|(k, v)| v.to_env_var(k)).collect()
    }
}

impl<K: Into<String>, V: Into<EnvValue>> FromIterator<(K, V)> for EnvironmentSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (k, v) in iter {
            set.set(k, v);
        }
        set
    }
}
