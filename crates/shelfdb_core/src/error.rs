//! Error types for ShelfDB core.

use std::fmt;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in ShelfDB core operations.
///
/// Every variant maps onto one symbolic [`ErrorKind`]. Errors are cheap to
/// clone so a request can keep its error after the listeners have seen it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Malformed or missing key, or key derivation failure.
    #[error("DataError: {message}")]
    Data {
        /// Description of the problem.
        message: String,
    },

    /// Uniqueness or key collision violation.
    #[error("ConstraintError: {message}")]
    Constraint {
        /// Description of the violation.
        message: String,
    },

    /// Referenced store, index or database does not exist.
    #[error("NotFoundError: {message}")]
    NotFound {
        /// Description of what was missing.
        message: String,
    },

    /// Operation attempted in the wrong state or on a destroyed object.
    #[error("InvalidStateError: {message}")]
    InvalidState {
        /// Description of why the state is invalid.
        message: String,
    },

    /// Invalid argument such as an empty transaction scope.
    #[error("InvalidAccessError: {message}")]
    InvalidAccess {
        /// Description of the invalid access.
        message: String,
    },

    /// Write attempted in a read-only transaction.
    #[error("ReadOnlyError: {message}")]
    ReadOnly {
        /// Description of the rejected write.
        message: String,
    },

    /// Request placed against an inactive or finished transaction.
    #[error("TransactionInactiveError: {message}")]
    TransactionInactive {
        /// Description of the transaction state.
        message: String,
    },

    /// Database opened with a version lower than its current one.
    #[error("VersionError: requested version {requested} is lower than current version {current}")]
    Version {
        /// Version asked for by the caller.
        requested: u64,
        /// Version the database is at.
        current: u64,
    },

    /// Idle transaction exceeded its grace window.
    #[error("TimeoutError: {message}")]
    Timeout {
        /// Description of the timeout.
        message: String,
    },

    /// Explicit or cascading abort.
    #[error("AbortError: {message}")]
    Abort {
        /// Reason for the abort.
        message: String,
    },

    /// Feature that this engine does not provide.
    #[error("NotSupportedError: {message}")]
    NotSupported {
        /// Description of the unsupported feature.
        message: String,
    },

    /// Document codec error.
    #[error("codec error: {0}")]
    Codec(#[from] shelfdb_codec::CodecError),
}

/// Symbolic name of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`CoreError::Data`].
    Data,
    /// See [`CoreError::Constraint`].
    Constraint,
    /// See [`CoreError::NotFound`].
    NotFound,
    /// See [`CoreError::InvalidState`].
    InvalidState,
    /// See [`CoreError::InvalidAccess`].
    InvalidAccess,
    /// See [`CoreError::ReadOnly`].
    ReadOnly,
    /// See [`CoreError::TransactionInactive`].
    TransactionInactive,
    /// See [`CoreError::Version`].
    Version,
    /// See [`CoreError::Timeout`].
    Timeout,
    /// See [`CoreError::Abort`].
    Abort,
    /// See [`CoreError::NotSupported`].
    NotSupported,
    /// See [`CoreError::Codec`].
    Codec,
}

impl ErrorKind {
    /// Returns the symbolic name surfaced to callers.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ErrorKind::Data => "DataError",
            ErrorKind::Constraint => "ConstraintError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::InvalidState => "InvalidStateError",
            ErrorKind::InvalidAccess => "InvalidAccessError",
            ErrorKind::ReadOnly => "ReadOnlyError",
            ErrorKind::TransactionInactive => "TransactionInactiveError",
            ErrorKind::Version => "VersionError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Abort => "AbortError",
            ErrorKind::NotSupported => "NotSupportedError",
            ErrorKind::Codec => "DataError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl CoreError {
    /// Returns the symbolic kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Data { .. } => ErrorKind::Data,
            CoreError::Constraint { .. } => ErrorKind::Constraint,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::InvalidState { .. } => ErrorKind::InvalidState,
            CoreError::InvalidAccess { .. } => ErrorKind::InvalidAccess,
            CoreError::ReadOnly { .. } => ErrorKind::ReadOnly,
            CoreError::TransactionInactive { .. } => ErrorKind::TransactionInactive,
            CoreError::Version { .. } => ErrorKind::Version,
            CoreError::Timeout { .. } => ErrorKind::Timeout,
            CoreError::Abort { .. } => ErrorKind::Abort,
            CoreError::NotSupported { .. } => ErrorKind::NotSupported,
            CoreError::Codec(_) => ErrorKind::Codec,
        }
    }

    /// Creates a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Creates a constraint error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an invalid access error.
    pub fn invalid_access(message: impl Into<String>) -> Self {
        Self::InvalidAccess {
            message: message.into(),
        }
    }

    /// Creates a read-only error.
    pub fn read_only(message: impl Into<String>) -> Self {
        Self::ReadOnly {
            message: message.into(),
        }
    }

    /// Creates a transaction inactive error.
    pub fn transaction_inactive(message: impl Into<String>) -> Self {
        Self::TransactionInactive {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates an abort error.
    pub fn abort(message: impl Into<String>) -> Self {
        Self::Abort {
            message: message.into(),
        }
    }

    /// Creates a not supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
        }
    }

    /// Creates a store not found error.
    pub fn store_not_found(name: &str) -> Self {
        Self::not_found(format!("object store '{name}' does not exist"))
    }

    /// Creates an index not found error.
    pub fn index_not_found(store: &str, index: &str) -> Self {
        Self::not_found(format!("index '{index}' does not exist on store '{store}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_have_symbolic_names() {
        assert_eq!(CoreError::data("x").kind().name(), "DataError");
        assert_eq!(CoreError::constraint("x").kind().name(), "ConstraintError");
        assert_eq!(
            CoreError::transaction_inactive("x").kind().name(),
            "TransactionInactiveError"
        );
        assert_eq!(
            CoreError::Version {
                requested: 1,
                current: 2
            }
            .kind(),
            ErrorKind::Version
        );
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = CoreError::store_not_found("books");
        assert_eq!(
            err.to_string(),
            "NotFoundError: object store 'books' does not exist"
        );
    }

    #[test]
    fn codec_errors_convert() {
        let err: CoreError = shelfdb_codec::CodecError::invalid_json("eof").into();
        assert_eq!(err.kind(), ErrorKind::Codec);
    }
}
