//! Compiler configuration
//!
//! Every value the compiler needs from its environment (vault endpoints,
//! network-mount credentials, payload ceilings) is carried here and injected
//! at construction. The compiler never reads process state itself; binaries
//! call [`CompilerConfig::apply_env_overrides`] with `std::env::var`.

use std::path::Path;

use serde::Deserialize;

use crate::{Error, Result, DEFAULT_NAMESPACE, DEFAULT_SECRET_FILE_MODE};

/// Env var overriding the vault remote URL
pub const OVERRIDE_VAULT_URL: &str = "RUNSPEC_VAULT_REMOTE_URL";

/// Env var overriding the vault token path
pub const OVERRIDE_VAULT_TOKEN_PATH: &str = "RUNSPEC_VAULT_TOKEN_PATH";

/// Env var overriding the target namespace
pub const OVERRIDE_NAMESPACE: &str = "RUNSPEC_NAMESPACE";

/// Top-level compiler configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerConfig {
    /// Namespace runs are submitted into
    pub namespace: String,
    /// Service account for submitted pods (cluster default when unset)
    pub service_account: Option<String>,
    /// Command the execution image runs when the runtime does not set one
    pub exec_command: Vec<String>,
    /// File mode for mounted secret volumes
    pub secret_file_mode: i32,
    /// Vault secret backend settings
    pub vault: VaultConfig,
    /// Code packaging settings
    pub code: CodeConfig,
    /// Network filesystem credentials used by mount auto-detection
    pub network_mount: NetworkMountConfig,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            service_account: None,
            exec_command: vec![
                "runspec".to_string(),
                "run".to_string(),
                "--from-env".to_string(),
            ],
            secret_file_mode: DEFAULT_SECRET_FILE_MODE,
            vault: VaultConfig::default(),
            code: CodeConfig::default(),
            network_mount: NetworkMountConfig::default(),
        }
    }
}

impl CompilerConfig {
    /// Parse configuration from a YAML document and validate it
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Apply overrides from an environment lookup.
    ///
    /// The lookup is injected so callers decide where ambient values come from;
    /// tests pass a closure over a map.
    pub fn apply_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ns) = lookup(OVERRIDE_NAMESPACE) {
            self.namespace = ns;
        }
        if let Some(url) = lookup(OVERRIDE_VAULT_URL) {
            self.vault.remote_url = url;
        }
        if let Some(path) = lookup(OVERRIDE_VAULT_TOKEN_PATH) {
            self.vault.token_path = path;
        }
        if let Some(key) = lookup(crate::ENV_NETWORK_ACCESS_KEY) {
            self.network_mount.access_key = Some(key);
        }
        if let Some(user) = lookup(crate::ENV_NETWORK_USERNAME) {
            self.network_mount.username = Some(user);
        }
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::config_field("namespace", "must not be empty"));
        }
        if self.code.max_payload_bytes == 0 {
            return Err(Error::config_field(
                "code.maxPayloadBytes",
                "must be greater than 0",
            ));
        }
        if !(0..=0o777).contains(&self.secret_file_mode) {
            return Err(Error::config_field(
                "secretFileMode",
                format!("{} is not a valid file mode", self.secret_file_mode),
            ));
        }
        if !self.vault.service_account_template.contains("{project}") {
            return Err(Error::config_field(
                "vault.serviceAccountTemplate",
                "must contain a {project} placeholder",
            ));
        }
        Ok(())
    }
}

/// Vault secret backend configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct VaultConfig {
    /// Remote URL handed to the execution image
    pub remote_url: String,
    /// Path the vault token secret is mounted at inside the pod
    pub token_path: String,
    /// Service account holding the project's vault token (`{project}` is substituted)
    pub service_account_template: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            remote_url: String::new(),
            token_path: "/var/run/secrets/vault".to_string(),
            service_account_template: "runspec-vault-{project}".to_string(),
        }
    }
}

impl VaultConfig {
    /// Name of the service account that carries the project's vault token
    pub fn service_account_for(&self, project: &str) -> String {
        self.service_account_template.replace("{project}", project)
    }
}

/// Code packaging configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CodeConfig {
    /// Ceiling on the encoded payload size in bytes
    pub max_payload_bytes: usize,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 1024 * 1024,
        }
    }
}

/// Network filesystem mount configuration
///
/// `access_key` and `username` are the two signals mount auto-detection
/// inspects. The remaining fields describe how the mount is rendered.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkMountConfig {
    /// Access key for the network filesystem
    pub access_key: Option<String>,
    /// Username for the network filesystem
    pub username: Option<String>,
    /// Flex volume driver
    pub driver: String,
    /// Container holding per-user home directories
    pub container: String,
    /// Mount path for the filesystem root
    pub mount_path: String,
    /// Mount path for the user's home directory
    pub user_mount_path: String,
    /// Volume name
    pub volume_name: String,
}

impl Default for NetworkMountConfig {
    fn default() -> Self {
        Self {
            access_key: None,
            username: None,
            driver: "v3io/fuse".to_string(),
            container: "users".to_string(),
            mount_path: "/v3io".to_string(),
            user_mount_path: "/User".to_string(),
            volume_name: "v3io".to_string(),
        }
    }
}

impl NetworkMountConfig {
    /// Credentials when both signals are present and non-empty
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.access_key.as_deref()) {
            (Some(user), Some(key)) if !user.is_empty() && !key.is_empty() => Some((user, key)),
            _ => None,
        }
    }
}
