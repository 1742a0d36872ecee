//! Common types for runspec: configuration, errors, telemetry, and shared constants

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod telemetry;

pub use config::{CodeConfig, CompilerConfig, NetworkMountConfig, VaultConfig};
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Environment variables understood by the execution image
// =============================================================================

/// Serialized run payload (task metadata, params, inputs, hyperparams)
pub const ENV_EXEC_CONFIG: &str = "RUNSPEC_EXEC_CONFIG";

/// Base64-encoded inline code; its presence switches the image into packaged-code mode
pub const ENV_EXEC_CODE: &str = "RUNSPEC_EXEC_CODE";

/// Vault role the execution image authenticates as
pub const ENV_VAULT_ROLE: &str = "RUNSPEC_SECRET_STORES__VAULT__ROLE";

/// Vault remote URL the execution image talks to
pub const ENV_VAULT_URL: &str = "RUNSPEC_SECRET_STORES__VAULT__URL";

/// Prefix for env vars that reference inline secrets (`RUNSPEC_SECRET__<KEY>`)
pub const ENV_SECRET_PREFIX: &str = "RUNSPEC_SECRET__";

/// Network filesystem username
pub const ENV_NETWORK_USERNAME: &str = "V3IO_USERNAME";

/// Network filesystem access key
pub const ENV_NETWORK_ACCESS_KEY: &str = "V3IO_ACCESS_KEY";

// =============================================================================
// Labels
// =============================================================================

/// Standard Kubernetes label for resource name
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Standard Kubernetes label for managed-by
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value for managed-by label
pub const LABEL_MANAGED_BY_RUNSPEC: &str = "runspec";

/// Label carrying the owning project
pub const LABEL_PROJECT: &str = "runspec.dev/project";

/// Label carrying the runtime class (always `job` for this compiler)
pub const LABEL_CLASS: &str = "runspec.dev/class";

/// Label carrying the task name
pub const LABEL_TASK: &str = "runspec.dev/task";

// =============================================================================
// Defaults
// =============================================================================

/// File mode applied to mounted secret volumes (0644)
pub const DEFAULT_SECRET_FILE_MODE: i32 = 420;

/// Project used when neither the task nor the runtime names one
pub const DEFAULT_PROJECT: &str = "default";

/// Namespace runs are submitted into unless configured otherwise
pub const DEFAULT_NAMESPACE: &str = "default-tenant";
