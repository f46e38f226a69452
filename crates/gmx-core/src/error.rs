//! Unified error types for the GMX ecosystem
//!
//! This module provides a common error type [`GmxError`] that can represent
//! errors from any part of the conversion pipeline. The taxonomy separates
//! fatal conditions (no safe interpretation exists) from everything that is
//! handled as a diagnostic: structural invalidity and capacity overflows
//! never surface here, they degrade to bus-breaker topology and are
//! recorded in [`crate::diagnostics::Diagnostics`].
//!
//! # Example
//!
//! ```ignore
//! use gmx_core::{GmxError, GmxResult};
//!
//! fn convert_case(path: &str) -> GmxResult<()> {
//!     let case = read_case(path)?;
//!     import_network(&case)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all GMX operations.
#[derive(Error, Debug)]
pub enum GmxError {
    /// I/O errors (file access etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unrecognized per-unit convention code on a transformer record.
    ///
    /// Fatal: there is no safe default interpretation for an unknown
    /// CW/CZ/CM code, so conversion of the offending element stops.
    #[error("unsupported {field} code {code} on {element}")]
    Convention {
        element: String,
        field: &'static str,
        code: i32,
    },

    /// Numeric degeneracy in a conversion formula (e.g. negative radicand
    /// when back-solving X from a load-loss-derived R).
    #[error("numeric degeneracy on {element}: {detail}")]
    Numeric { element: String, detail: String },

    /// Network structure errors
    #[error("Network error: {0}")]
    Network(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using GmxError.
pub type GmxResult<T> = Result<T, GmxError>;

impl From<anyhow::Error> for GmxError {
    fn from(err: anyhow::Error) -> Self {
        GmxError::Other(err.to_string())
    }
}

impl From<serde_json::Error> for GmxError {
    fn from(err: serde_json::Error) -> Self {
        GmxError::Parse(err.to_string())
    }
}

impl From<String> for GmxError {
    fn from(s: String) -> Self {
        GmxError::Other(s)
    }
}

impl From<&str> for GmxError {
    fn from(s: &str) -> Self {
        GmxError::Other(s.to_string())
    }
}
