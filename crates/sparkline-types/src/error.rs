//! Error types for observation parsing in sparkline-types.

use thiserror::Error;

/// Errors that can occur when decoding a battery observation.
///
/// The same error is used for stored records (see [`crate::codec`]) and for
/// property-change payloads decoded at the subscription boundary.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A recognized field held text that is not a finite float.
    #[error("Invalid value {value:?} for field {field}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Raw text found in the record.
        value: String,
    },

    /// A required field was absent.
    #[error("Missing field {0}")]
    MissingField(&'static str),

    /// An observation carried NaN or infinity.
    #[error("Non-finite value {value} for field {field}")]
    NonFinite {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: f64,
    },

    /// A payload did not have the expected shape.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Result type alias using sparkline-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
