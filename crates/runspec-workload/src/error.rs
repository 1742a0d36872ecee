//! Workload compilation error types

/// Errors raised by the local validation stages
#[derive(Debug, thiserror::Error)]
pub enum CompilationError {
    /// A resource quantity or limit/request combination is invalid
    #[error("invalid resource spec for {field}: {message}")]
    InvalidResourceSpec {
        /// Field path (e.g., "limits.memory")
        field: String,
        /// Description of what's invalid
        message: String,
    },

    /// Encoded inline code exceeds the transport ceiling
    #[error("inline code is too large: {size} encoded bytes exceeds the {limit} byte limit")]
    CodeTooLarge {
        /// Encoded payload size in bytes
        size: usize,
        /// Configured ceiling in bytes
        limit: usize,
    },
}

impl CompilationError {
    /// Create an invalid resource spec error
    pub fn invalid_resource(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResourceSpec {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Field path for resource errors
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidResourceSpec { field, .. } => Some(field),
            Self::CodeTooLarge { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_resource_display_includes_field() {
        let err = CompilationError::invalid_resource("limits.gpus", "gpu_type is required");
        let display = err.to_string();
        assert!(display.contains("limits.gpus"));
        assert!(display.contains("gpu_type is required"));
        assert_eq!(err.field(), Some("limits.gpus"));
    }

    #[test]
    fn code_too_large_display_includes_sizes() {
        let err = CompilationError::CodeTooLarge {
            size: 2048,
            limit: 1024,
        };
        assert!(err.to_string().contains("2048"));
        assert!(err.to_string().contains("1024"));
        assert!(err.field().is_none());
    }
}
