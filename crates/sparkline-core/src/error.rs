//! Error types for sparkline-core.

use sparkline_types::ParseError;

/// Result type for sparkline-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the power service.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// D-Bus transport error.
    #[error("D-Bus error: {0}")]
    Bus(#[from] dbus::Error),

    /// A live property could not be read.
    #[error("Failed to read {property} from {device}: {message}")]
    PropertyRead {
        device: String,
        property: &'static str,
        message: String,
    },

    /// The device id is not a valid D-Bus object path.
    #[error("Invalid device path: {0}")]
    InvalidDevicePath(String),

    /// The power service does not know the device.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// A payload or property value had an unexpected shape.
    #[error(transparent)]
    Parse(#[from] ParseError),
}
