//! Error types for the CLI

use std::path::PathBuf;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid yaml in {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Config(#[from] runspec_common::Error),

    #[error("{0}")]
    Telemetry(#[from] runspec_common::telemetry::TelemetryError),

    #[error("kubernetes client error: {0}")]
    Kube(#[from] kube::Error),

    #[error("{0}")]
    Run(#[from] runspec_job::RunError),

    #[error("{0}")]
    Submit(#[from] runspec_job::SubmitError),
}
