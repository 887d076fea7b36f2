//! Types describing power devices and their change notifications.

/// A device reported by the power service's enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Stable device identifier (the UPower object path).
    pub id: String,
    /// Whether the device powers the system.
    pub power_supply: bool,
    /// Whether the device is physically present.
    pub present: bool,
}

impl DeviceDescriptor {
    /// Create a new descriptor.
    pub fn new(id: impl Into<String>, power_supply: bool, present: bool) -> Self {
        Self {
            id: id.into(),
            power_supply,
            present,
        }
    }

    /// Whether this device should be enrolled and monitored.
    ///
    /// Only present devices that supply power to the system are tracked.
    #[must_use]
    pub fn is_trackable(&self) -> bool {
        self.power_supply && self.present
    }
}

/// A decoded property-change notification for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChange {
    /// Device the notification belongs to.
    pub device_id: String,
    /// Update time reported with the change (Unix seconds).
    pub update_time: u64,
    /// Names of the properties that changed, sorted.
    pub changed: Vec<String>,
}
