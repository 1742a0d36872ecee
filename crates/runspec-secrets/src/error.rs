//! Secret resolution error types

/// Errors raised while resolving secret declarations
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// No backend is registered for the declaration's kind
    #[error("unsupported secret kind: {kind}")]
    UnsupportedSecretKind {
        /// Requested kind
        kind: String,
    },

    /// The backend's identity lookup failed or found no identity
    #[error("secret backend unavailable for project {project}: {message}")]
    SecretBackendUnavailable {
        /// Project being resolved
        project: String,
        /// What went wrong
        message: String,
    },

    /// The project's identity carries no attached secret
    #[error("no secret attached to {identity} for project {project}")]
    SecretNotFound {
        /// Project being resolved
        project: String,
        /// Identity that was inspected (e.g., service account name)
        identity: String,
    },

    /// The declaration's source has the wrong shape for its kind
    #[error("invalid {kind} secret source: {message}")]
    InvalidSource {
        /// Backend kind
        kind: String,
        /// What's wrong with the source
        message: String,
    },

    /// Writing to the secret store failed
    #[error("failed to write secret store {store}: {message}")]
    Store {
        /// Store name
        store: String,
        /// Underlying failure
        message: String,
    },
}

impl SecretError {
    /// Create an invalid source error
    pub fn invalid_source(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSource {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create a backend unavailable error
    pub fn unavailable(project: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SecretBackendUnavailable {
            project: project.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_kind_names_the_kind() {
        let err = SecretError::UnsupportedSecretKind {
            kind: "s3".to_string(),
        };
        assert_eq!(err.to_string(), "unsupported secret kind: s3");
    }

    #[test]
    fn unavailable_includes_project_and_cause() {
        let err = SecretError::unavailable("proj", "connection refused");
        let msg = err.to_string();
        assert!(msg.contains("proj"));
        assert!(msg.contains("connection refused"));
    }
}
