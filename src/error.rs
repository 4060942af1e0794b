// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Error types for the function export/import layer.
//!
//! The engine reports failures as an opaque status plus a message string; this
//! layer does not distinguish finer-grained causes (an unwritable destination,
//! a failed trace, and a corrupt package all surface as [`BridgeError::Native`]).
//! Host-side problems that are caught before crossing the boundary get their
//! own variants.
//!
//! ## Error Hierarchy
//!
//! ```text
//! BridgeError
//! ├── Native          - The engine reported a failure
//! ├── InvalidConfig   - Host-side validation failures (bad paths, options)
//! └── Io              - File/filesystem errors outside the engine
//! ```
//!
//! ## Crate-Specific Errors
//!
//! Downstream crates should define their own error types that wrap
//! `BridgeError`:
//!
//! ```rust
//! use fnbridge::BridgeError;
//! use thiserror::Error;
//!
//! #[derive(Error, Debug)]
//! pub enum DeployError {
//!     #[error("model bundle incomplete: {0}")]
//!     Incomplete(String),
//!
//!     #[error(transparent)]
//!     Bridge(#[from] BridgeError),
//! }
//! ```

use thiserror::Error;

/// Result type alias for fnbridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors raised by the export/import layer.
///
/// Every fallible engine entry point maps a non-zero status to
/// [`BridgeError::Native`] carrying whatever message the engine supplied.
/// There are no retries and no partial recovery; the first failure aborts the
/// operation.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    /// The native engine reported a failure.
    ///
    /// Raised for anything that goes wrong on the engine side of the
    /// boundary: tracing failures, unwritable destinations, missing or
    /// corrupt function packages. The message is passed through verbatim.
    #[error("native engine error: {message}")]
    Native {
        /// Message supplied by the engine.
        message: String,
    },

    /// Invalid configuration or argument rejected before the engine is
    /// involved.
    ///
    /// Raised for destinations that cannot be represented on the boundary
    /// (non-UTF-8 paths, interior NUL bytes) and invalid option values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    ///
    /// Raised for filesystem operations performed on the host side of the
    /// boundary, such as preparing a destination directory.
    #[error("I/O error: {0}")]
    Io(String),
}

impl BridgeError {
    /// Create a native engine error.
    pub fn native(message: impl Into<String>) -> Self {
        Self::Native {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an I/O error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::native("trace failed: shape mismatch");
        assert_eq!(
            err.to_string(),
            "native engine error: trace failed: shape mismatch"
        );

        let err = BridgeError::invalid_config("destination path is not valid UTF-8");
        assert!(err.to_string().contains("not valid UTF-8"));

        let err = BridgeError::io("permission denied");
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BridgeError = io_err.into();
        assert!(matches!(err, BridgeError::Io(_)));
    }
}
