//! History queries.

use sparkline_types::{History, codec};
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::Store;

impl Store {
    /// Reconstruct every observation recorded for a device.
    ///
    /// Entries come back in store order (insertion order), keyed by timestamp
    /// text. A record that fails to decode aborts the whole query with
    /// [`Error::CorruptRecord`]; partial histories are never returned.
    pub fn collect(&self, device_id: &str) -> Result<History> {
        let history = self.read(|txn| {
            let partition = txn
                .open_partition(device_id)?
                .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))?;

            let mut history = History::new();
            txn.for_each_child(&partition, |child| {
                let mut fields = Vec::with_capacity(2);
                txn.for_each_entry(child, |key, value| {
                    fields.push((key.to_string(), value.to_string()));
                    Ok(())
                })?;

                let observation = codec::decode(fields).map_err(|source| Error::CorruptRecord {
                    device_id: device_id.to_string(),
                    timestamp: child.key().to_string(),
                    source,
                })?;

                history.push(child.key(), observation);
                Ok(())
            })?;

            Ok(history)
        })?;

        debug!("Collected {} records for {}", history.len(), device_id);
        Ok(history)
    }

    /// Ids of all enrolled devices, in enrollment order.
    pub fn devices(&self) -> Result<Vec<String>> {
        self.read(|txn| txn.partitions())
    }
}
