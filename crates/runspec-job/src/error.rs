//! Run compilation and submission errors

use std::fmt;

use runspec_secrets::SecretError;
use runspec_workload::CompilationError;

use crate::compiler::{CompileStage, StageContext};
use crate::submit::SubmitError;

/// Flat error taxonomy across all stages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidResourceSpec,
    UnsupportedSecretKind,
    SecretBackendUnavailable,
    SecretNotFound,
    InvalidSecretSource,
    CodeTooLarge,
    Serialization,
    SubmissionRejected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidResourceSpec => "InvalidResourceSpec",
            Self::UnsupportedSecretKind => "UnsupportedSecretKind",
            Self::SecretBackendUnavailable => "SecretBackendUnavailable",
            Self::SecretNotFound => "SecretNotFound",
            Self::InvalidSecretSource => "InvalidSecretSource",
            Self::CodeTooLarge => "CodeTooLarge",
            Self::Serialization => "Serialization",
            Self::SubmissionRejected => "SubmissionRejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{stage} stage failed: {source}")]
    Compilation {
        stage: CompileStage,
        #[source]
        source: CompilationError,
    },

    #[error("secret resolution failed: {0}")]
    Secret(#[from] SecretError),

    #[error("failed to serialize run payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("submission rejected ({context}): {source}")]
    SubmissionRejected {
        context: StageContext,
        #[source]
        source: SubmitError,
    },
}

impl RunError {
    pub(crate) fn at(stage: CompileStage) -> impl FnOnce(CompilationError) -> Self {
        move |source| Self::Compilation { stage, source }
    }

    /// Taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Compilation { source, .. } => match source {
                CompilationError::InvalidResourceSpec { .. } => ErrorKind::InvalidResourceSpec,
                CompilationError::CodeTooLarge { .. } => ErrorKind::CodeTooLarge,
            },
            Self::Secret(e) => match e {
                SecretError::UnsupportedSecretKind { .. } => ErrorKind::UnsupportedSecretKind,
                SecretError::SecretBackendUnavailable { .. } | SecretError::Store { .. } => {
                    ErrorKind::SecretBackendUnavailable
                }
                SecretError::SecretNotFound { .. } => ErrorKind::SecretNotFound,
                SecretError::InvalidSource { .. } => ErrorKind::InvalidSecretSource,
            },
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::SubmissionRejected { .. } => ErrorKind::SubmissionRejected,
        }
    }

    /// Whether retrying the same request could succeed.
    ///
    /// Only transport-level submission failures qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SubmissionRejected { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}
