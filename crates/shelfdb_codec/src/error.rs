//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while converting documents.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input text is not valid JSON.
    #[error("invalid JSON: {message}")]
    InvalidJson {
        /// Description of the parse error.
        message: String,
    },

    /// A JSON number has no finite double representation.
    #[error("number out of range: {literal}")]
    NumberOutOfRange {
        /// The offending number as written.
        literal: String,
    },

    /// A `{"$date": ...}` wrapper does not hold an integer timestamp.
    #[error("invalid date wrapper: {message}")]
    InvalidDate {
        /// Description of the problem.
        message: String,
    },

    /// Failed to serialize a value.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },
}

impl CodecError {
    /// Create an invalid JSON error.
    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::InvalidJson {
            message: message.into(),
        }
    }

    /// Create an invalid date error.
    pub fn invalid_date(message: impl Into<String>) -> Self {
        Self::InvalidDate {
            message: message.into(),
        }
    }

    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_json(err.to_string())
    }
}
