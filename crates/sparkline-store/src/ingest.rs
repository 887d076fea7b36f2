//! Enrollment and ingest operations.

use sparkline_types::{Observation, codec};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::store::Store;

impl Store {
    /// Enroll a device, creating its partition if needed.
    ///
    /// Enrolling an already-enrolled device is a no-op.
    pub fn enroll(&self, device_id: &str) -> Result<()> {
        self.write(|txn| txn.ensure_partition(device_id).map(|_| ()))?;
        info!("Enrolled device {}", device_id);
        Ok(())
    }

    /// Record one observation for an enrolled device.
    ///
    /// The observation is stored under the base-10 text of `timestamp`. The
    /// device partition is never created here; unknown devices fail with
    /// [`Error::DeviceNotFound`]. A timestamp that is already recorded fails
    /// with [`Error::DuplicateTimestamp`] and leaves the existing record
    /// untouched.
    ///
    /// Returns the stored observation so the caller can broadcast it.
    pub fn record_observation(
        &self,
        device_id: &str,
        timestamp: u64,
        observation: &Observation,
    ) -> Result<Observation> {
        observation.validate().map_err(Error::InvalidObservation)?;
        let key = timestamp.to_string();

        self.write(|txn| {
            let partition = txn
                .open_partition(device_id)?
                .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))?;

            let child = txn.create_child(&partition, &key).map_err(|e| match e {
                Error::KeyExists { .. } => Error::DuplicateTimestamp {
                    device_id: device_id.to_string(),
                    timestamp: key.clone(),
                },
                other => other,
            })?;

            for (field, value) in codec::encode(observation) {
                txn.put(&child, field, &value)?;
            }

            Ok(())
        })?;

        debug!("Recorded {} at {} for {}", observation, key, device_id);
        Ok(*observation)
    }
}
