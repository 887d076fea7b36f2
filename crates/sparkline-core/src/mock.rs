//! Mock power service for testing.
//!
//! [`MockPowerSource`] implements [`PowerSource`] in memory so collectors can
//! be tested without a running UPower daemon.
//!
//! # Features
//!
//! - **Device registry**: Add devices with their enumeration flags and live values
//! - **Manual events**: Push change notifications with [`MockPowerSource::emit`]
//! - **Failure injection**: Make property reads or enumeration fail

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use tokio::sync::{Mutex, RwLock, RwLockMappedWriteGuard, RwLockWriteGuard};

use sparkline_types::{Observation, ParseError};

use crate::error::{Error, Result};
use crate::traits::{ChangeStream, PowerSource};
use crate::types::{DeviceDescriptor, PropertyChange};

/// Properties reported with every mock change notification.
const CHANGED_PROPERTIES: [&str; 3] = ["EnergyRate", "Percentage", "UpdateTime"];

#[derive(Debug, Clone)]
struct MockDevice {
    descriptor: DeviceDescriptor,
    observation: Observation,
    /// Reads left to fail; `usize::MAX` fails forever.
    failing_reads: usize,
}

/// An in-memory power service.
///
/// # Example
///
/// ```
/// use futures::StreamExt;
/// use sparkline_core::{MockPowerSource, PowerSource};
/// use sparkline_types::Observation;
///
/// #[tokio::main]
/// async fn main() {
///     let source = MockPowerSource::new();
///     source.add_device("BAT0", true, true, Observation::new(80.0, -5.0)).await;
///
///     let mut changes = source.subscribe("BAT0").await.unwrap();
///     source.emit("BAT0", 1000).await;
///
///     let change = changes.next().await.unwrap().unwrap();
///     assert_eq!(change.update_time, 1000);
/// }
/// ```
#[derive(Default)]
pub struct MockPowerSource {
    devices: RwLock<Vec<MockDevice>>,
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Result<PropertyChange>>>>>,
    fail_enumerate: AtomicBool,
}

impl std::fmt::Debug for MockPowerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPowerSource")
            .field("fail_enumerate", &self.fail_enumerate.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockPowerSource {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device.
    pub async fn add_device(
        &self,
        id: &str,
        power_supply: bool,
        present: bool,
        observation: Observation,
    ) {
        self.devices.write().await.push(MockDevice {
            descriptor: DeviceDescriptor::new(id, power_supply, present),
            observation,
            failing_reads: 0,
        });
    }

    /// Change the live values of a device.
    pub async fn set_observation(&self, id: &str, observation: Observation) {
        if let Some(device) = self.find_mut(id).await.as_deref_mut() {
            device.observation = observation;
        }
    }

    /// Make property reads of a device fail (or succeed again).
    pub async fn set_fail_reads(&self, id: &str, fail: bool) {
        if let Some(device) = self.find_mut(id).await.as_deref_mut() {
            device.failing_reads = if fail { usize::MAX } else { 0 };
        }
    }

    /// Make the next `count` property reads of a device fail.
    pub async fn fail_next_reads(&self, id: &str, count: usize) {
        if let Some(device) = self.find_mut(id).await.as_deref_mut() {
            device.failing_reads = count;
        }
    }

    /// Make enumeration fail.
    pub fn set_fail_enumerate(&self, fail: bool) {
        self.fail_enumerate.store(fail, Ordering::Relaxed);
    }

    /// Deliver a change notification to every subscriber of a device.
    ///
    /// Returns the number of subscribers reached.
    pub async fn emit(&self, id: &str, update_time: u64) -> usize {
        let change = PropertyChange {
            device_id: id.to_string(),
            update_time,
            changed: CHANGED_PROPERTIES.iter().map(|p| p.to_string()).collect(),
        };
        self.deliver(id, || Ok(change.clone())).await
    }

    /// Deliver an undecodable notification to every subscriber of a device.
    pub async fn emit_malformed(&self, id: &str, reason: &str) -> usize {
        self.deliver(id, || Err(ParseError::InvalidPayload(reason.to_string()).into()))
            .await
    }

    /// Number of live subscriptions for a device.
    pub async fn subscriber_count(&self, id: &str) -> usize {
        self.subscribers
            .lock()
            .await
            .get(id)
            .map_or(0, |senders| senders.iter().filter(|tx| !tx.is_closed()).count())
    }

    /// End every subscription of a device.
    pub async fn close(&self, id: &str) {
        self.subscribers.lock().await.remove(id);
    }

    async fn deliver<F>(&self, id: &str, item: F) -> usize
    where
        F: Fn() -> Result<PropertyChange>,
    {
        let mut subscribers = self.subscribers.lock().await;
        let Some(senders) = subscribers.get_mut(id) else {
            return 0;
        };

        senders.retain(|tx| tx.unbounded_send(item()).is_ok());
        senders.len()
    }

    async fn find_mut(&self, id: &str) -> Option<RwLockMappedWriteGuard<'_, MockDevice>> {
        let devices = self.devices.write().await;
        RwLockWriteGuard::try_map(devices, |devices| {
            devices.iter_mut().find(|d| d.descriptor.id == id)
        })
        .ok()
    }
}

#[async_trait]
impl PowerSource for MockPowerSource {
    async fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        if self.fail_enumerate.load(Ordering::Relaxed) {
            return Err(dbus::Error::new_failed("mock enumeration failure").into());
        }

        Ok(self
            .devices
            .read()
            .await
            .iter()
            .map(|d| d.descriptor.clone())
            .collect())
    }

    async fn subscribe(&self, device_id: &str) -> Result<ChangeStream> {
        if !self
            .devices
            .read()
            .await
            .iter()
            .any(|d| d.descriptor.id == device_id)
        {
            return Err(Error::DeviceNotFound(device_id.to_string()));
        }

        let (tx, rx) = mpsc::unbounded();
        self.subscribers
            .lock()
            .await
            .entry(device_id.to_string())
            .or_default()
            .push(tx);

        Ok(rx.boxed())
    }

    async fn read_observation(&self, device_id: &str) -> Result<Observation> {
        let mut devices = self.devices.write().await;
        let device = devices
            .iter_mut()
            .find(|d| d.descriptor.id == device_id)
            .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))?;

        if device.failing_reads > 0 {
            if device.failing_reads != usize::MAX {
                device.failing_reads -= 1;
            }
            return Err(Error::PropertyRead {
                device: device_id.to_string(),
                property: "Percentage",
                message: "mock read failure".to_string(),
            });
        }

        device.observation.validate()?;
        Ok(device.observation)
    }
}
