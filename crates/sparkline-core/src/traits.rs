//! Trait abstraction over the power service.
//!
//! [`PowerSource`] abstracts over the real UPower daemon and the in-memory
//! mock used in tests.

use async_trait::async_trait;
use futures::stream::BoxStream;

use sparkline_types::Observation;

use crate::error::Result;
use crate::types::{DeviceDescriptor, PropertyChange};

/// Stream of change notifications for a single device.
///
/// Items that fail to decode are yielded as errors; the stream keeps going.
pub type ChangeStream = BoxStream<'static, Result<PropertyChange>>;

/// Trait abstracting power service operations.
///
/// # Example
///
/// ```ignore
/// use futures::StreamExt;
/// use sparkline_core::PowerSource;
///
/// async fn watch<P: PowerSource>(source: &P, device: &str) -> sparkline_core::Result<()> {
///     let mut changes = source.subscribe(device).await?;
///     while let Some(change) = changes.next().await {
///         let observation = source.read_observation(device).await?;
///         println!("{}: {}", change?.update_time, observation);
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait PowerSource: Send + Sync {
    /// List every device the power service knows about.
    async fn enumerate(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Subscribe to property changes of one device.
    ///
    /// Only notifications for that device are delivered.
    async fn subscribe(&self, device_id: &str) -> Result<ChangeStream>;

    /// Read the device's current charge percentage and energy rate.
    ///
    /// Both reads must succeed.
    async fn read_observation(&self, device_id: &str) -> Result<Observation>;
}
