//! Error types shared across runspec crates
//!
//! Covers configuration loading and serialization. Compilation, secret and
//! submission failures live in their own crates and wrap these where needed.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Common error type for runspec configuration
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or failed validation
    #[error("configuration error [{field}]: {message}")]
    Config {
        /// Configuration field path (e.g., "vault.remoteUrl")
        field: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// Source format (yaml, json) if known
        format: Option<String>,
    },

    /// I/O error while reading a configuration source
    #[error("io error reading {path}: {source}")]
    Io {
        /// Path being read
        path: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a configuration error without a field path
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            field: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a configuration error for a specific field
    pub fn config_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            format: None,
        }
    }

    /// Create a serialization error with the source format
    pub fn serialization_for_format(format: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            format: Some(format.into()),
        }
    }

    /// Get the offending field if this is a configuration error
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Config { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::serialization_for_format("yaml", e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_carries_field() {
        let err = Error::config_field("code.maxPayloadBytes", "must be greater than 0");
        assert_eq!(err.field(), Some("code.maxPayloadBytes"));
        assert!(err.to_string().contains("code.maxPayloadBytes"));
        assert!(err.to_string().contains("must be greater than 0"));
    }

    #[test]
    fn config_error_without_field_uses_unknown() {
        let err = Error::config("bad");
        assert_eq!(err.field(), Some(UNKNOWN_CONTEXT));
    }

    #[test]
    fn yaml_errors_convert_to_serialization() {
        let yaml_err = serde_yaml::from_str::<u32>("not: a number").unwrap_err();
        let err: Error = yaml_err.into();
        match err {
            Error::Serialization { format, .. } => assert_eq!(format.as_deref(), Some("yaml")),
            other => panic!("expected serialization error, got {other:?}"),
        }
        assert!(Error::serialization("x").field().is_none());
    }
}
