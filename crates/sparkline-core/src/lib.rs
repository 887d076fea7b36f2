//! Power service client for sparkline.
//!
//! This crate talks to UPower over the system D-Bus: it enumerates power
//! devices, subscribes to their property changes and reads their live charge
//! values.
//!
//! # Features
//!
//! - **Device enumeration**: List devices with their power-supply and presence flags
//! - **Change streams**: One `PropertiesChanged` subscription per device
//! - **Live reads**: Percentage and energy rate as an [`Observation`]
//! - **Mocking**: [`MockPowerSource`] for tests without a daemon
//!
//! # Quick Start
//!
//! ```no_run
//! use futures::StreamExt;
//! use sparkline_core::{PowerSource, UPower, DEFAULT_TIMEOUT};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (upower, _lost) = UPower::connect_system(DEFAULT_TIMEOUT)?;
//!
//!     for device in upower.enumerate().await? {
//!         if device.is_trackable() {
//!             println!("{}: {}", device.id, upower.read_observation(&device.id).await?);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! [`Observation`]: sparkline_types::Observation

pub mod error;
pub mod mock;
pub mod traits;
pub mod types;
pub mod upower;

pub use error::{Error, Result};
pub use mock::MockPowerSource;
pub use traits::{ChangeStream, PowerSource};
pub use types::{DeviceDescriptor, PropertyChange};
pub use upower::{
    DEFAULT_TIMEOUT, PROPERTIES_INTERFACE, UPOWER_BUS_NAME, UPOWER_DEVICE_INTERFACE,
    UPOWER_INTERFACE, UPOWER_PATH, UPower,
};
