//! Error type for document loading and validation.

extern crate alloc;

use alloc::string::String;
use core::fmt;

/// Errors raised while loading or validating a [`crate::Document`].
#[derive(Debug)]
pub enum DocumentError {
    /// JSON payload could not be decoded.
    Json(serde_json::Error),
    /// The tree is structurally unusable.
    Invalid {
        /// Slash-separated location of the offending node.
        path: String,
        reason: &'static str,
    },
}

impl DocumentError {
    pub(crate) fn invalid(path: String, reason: &'static str) -> Self {
        Self::Invalid { path, reason }
    }
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(err) => write!(f, "document json decode failed: {}", err),
            Self::Invalid { path, reason } => {
                write!(f, "invalid document at {}: {}", path, reason)
            }
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

impl From<serde_json::Error> for DocumentError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_errors_keep_their_source() {
        let err: DocumentError = serde_json::from_str::<u32>("nope")
            .map_err(DocumentError::from)
            .expect_err("not a number");
        assert!(err.to_string().starts_with("document json decode failed"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
