//! Error types for sparkline-store.

use std::path::PathBuf;

use sparkline_types::ParseError;

/// Result type for sparkline-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sparkline-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The database was written by a newer layout version.
    #[error("Unsupported schema version {found} (expected at most {supported})")]
    UnsupportedSchema { found: i32, supported: i32 },

    /// A child with this key already exists in the partition.
    #[error("Key {key} already exists in partition {partition}")]
    KeyExists { partition: String, key: String },

    /// Device has not been enrolled.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// An observation with this timestamp is already recorded for the device.
    #[error("Duplicate timestamp {timestamp} for device {device_id}")]
    DuplicateTimestamp { device_id: String, timestamp: String },

    /// A stored record failed to decode.
    #[error("Corrupt record {timestamp} for device {device_id}: {source}")]
    CorruptRecord {
        device_id: String,
        timestamp: String,
        source: ParseError,
    },

    /// The observation cannot be stored as given.
    #[error("Invalid observation: {0}")]
    InvalidObservation(ParseError),
}

impl Error {
    /// Whether this error is a fault of the storage engine itself.
    ///
    /// Fatal errors leave the store unusable for further work; everything else
    /// concerns a single operation and the caller may carry on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Database(_)
                | Error::CreateDirectory { .. }
                | Error::Io(_)
                | Error::UnsupportedSchema { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_fatal() {
        assert!(Error::Database(rusqlite::Error::InvalidQuery).is_fatal());
        assert!(!Error::DeviceNotFound("BAT0".into()).is_fatal());
        assert!(
            !Error::DuplicateTimestamp {
                device_id: "BAT0".into(),
                timestamp: "1000".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_error_display() {
        let err = Error::CorruptRecord {
            device_id: "BAT0".into(),
            timestamp: "1000".into(),
            source: ParseError::MissingField("percent"),
        };
        let display = err.to_string();
        assert!(display.contains("BAT0"));
        assert!(display.contains("1000"));
        assert!(display.contains("percent"));
    }
}
