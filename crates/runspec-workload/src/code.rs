//! Inline code packaging
//!
//! Code bodies travel to the execution image base64-encoded in a single
//! environment variable, so the ceiling applies to the encoded length.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::CompilationError;

/// Transport-safe inline code
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodePayload {
    /// Base64 (standard alphabet, padded) encoding of the body
    pub encoded: String,
    /// Length of the original body in bytes
    pub raw_len: usize,
}

impl CodePayload {
    /// Encode a code body, rejecting payloads whose encoding exceeds `limit` bytes
    pub fn package(body: &str, limit: usize) -> Result<Self, CompilationError> {
        let encoded = STANDARD.encode(body.as_bytes());
        if encoded.len() > limit {
            return Err(CompilationError::CodeTooLarge {
                size: encoded.len(),
                limit,
            });
        }
        Ok(Self {
            encoded,
            raw_len: body.len(),
        })
    }

    /// Decode back to the original body
    pub fn decode(&self) -> Option<String> {
        let bytes = STANDARD.decode(&self.encoded).ok()?;
        String::from_utf8(bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_and_decode() {
        let body = "def handler(context):\n    context.log_result('ok', 1)\n";
        let payload = CodePayload::package(body, 1024).unwrap();
        assert_eq!(payload.raw_len, body.len());
        assert_eq!(payload.decode().as_deref(), Some(body));
    }

    #[test]
    fn limit_applies_to_encoded_size() {
        // 6 raw bytes encode to 8
        let err = CodePayload::package("abcdef", 7).unwrap_err();
        assert!(matches!(
            err,
            CompilationError::CodeTooLarge { size: 8, limit: 7 }
        ));
        assert!(CodePayload::package("abcdef", 8).is_ok());
    }

    #[test]
    fn empty_body_is_allowed() {
        let payload = CodePayload::package("", 1).unwrap();
        assert_eq!(payload.encoded, "");
        assert_eq!(payload.raw_len, 0);
    }
}
