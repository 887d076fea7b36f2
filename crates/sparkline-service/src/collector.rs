//! Ingest workers.
//!
//! The collector enrolls every trackable device and runs one task per device.
//! Each task consumes that device's change stream and records the live
//! observation under the notification's update time.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use sparkline_core::{PowerSource, PropertyChange};

use crate::state::{AppState, UpdateEvent};

/// Outcome of one device worker, tagged with its device id.
type WorkerOutcome = (String, Result<(), CollectorError>);

/// Enrolls devices and spawns their ingest workers.
pub struct Collector<S> {
    state: Arc<AppState>,
    source: Arc<S>,
}

impl<S: PowerSource + 'static> Collector<S> {
    /// Create a new collector.
    pub fn new(state: Arc<AppState>, source: Arc<S>) -> Self {
        Self { state, source }
    }

    /// Enroll every present, power-supplying device.
    ///
    /// Returns the enrolled device ids, in enumeration order.
    pub async fn enroll(&self) -> Result<Vec<String>, CollectorError> {
        let devices = self
            .source
            .enumerate()
            .await
            .map_err(CollectorError::Enumerate)?;

        let mut enrolled = Vec::new();
        for device in devices {
            if !device.is_trackable() {
                debug!(
                    "Skipping {} (power_supply: {}, present: {})",
                    device.id, device.power_supply, device.present
                );
                continue;
            }

            self.state.store.enroll(&device.id)?;
            enrolled.push(device.id);
        }

        Ok(enrolled)
    }

    /// Start one worker per device.
    ///
    /// Returns immediately; collection happens in the background.
    pub fn start(&self, devices: Vec<String>) -> Workers {
        let mut set = JoinSet::new();

        if devices.is_empty() {
            info!("No devices to collect from");
        } else {
            info!("Starting collector for {} device(s)", devices.len());
        }

        for device_id in devices {
            let state = Arc::clone(&self.state);
            let source = Arc::clone(&self.source);
            set.spawn(async move {
                let outcome = monitor_device(state, source, &device_id).await;
                (device_id, outcome)
            });
        }

        Workers { set }
    }
}

/// Running device workers.
pub struct Workers {
    set: JoinSet<WorkerOutcome>,
}

impl Workers {
    /// Number of workers still running.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Whether every worker has finished.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Wait for the workers to finish.
    ///
    /// Workers that end cleanly or with a per-device fault are logged. The
    /// first fatal fault aborts the remaining workers and is returned.
    pub async fn supervise(mut self) -> Result<(), CollectorError> {
        while let Some(joined) = self.set.join_next().await {
            let (device_id, outcome) = joined?;
            match outcome {
                Ok(()) => info!("Collector for {} finished", device_id),
                Err(e) if e.is_fatal() => {
                    error!("Collector for {} failed: {}", device_id, e);
                    self.set.abort_all();
                    return Err(e);
                }
                Err(e) => warn!("Collector for {} stopped: {}", device_id, e),
            }
        }

        Ok(())
    }
}

/// Consume one device's change stream until it closes.
async fn monitor_device<S: PowerSource>(
    state: Arc<AppState>,
    source: Arc<S>,
    device_id: &str,
) -> Result<(), CollectorError> {
    let mut changes = source.subscribe(device_id).await?;
    info!("Watching {}", device_id);

    while let Some(change) = changes.next().await {
        match handle_change(&state, source.as_ref(), device_id, change).await {
            Ok(event) => debug!(
                "Recorded {} for {}: {}",
                event.timestamp, device_id, event.observation
            ),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("Dropped event for {}: {}", device_id, e),
        }
    }

    info!("Change stream for {} closed", device_id);
    Ok(())
}

/// Record the live observation for one change notification and publish it.
async fn handle_change<S: PowerSource>(
    state: &AppState,
    source: &S,
    device_id: &str,
    change: sparkline_core::Result<PropertyChange>,
) -> Result<UpdateEvent, CollectorError> {
    let change = change?;
    let observation = source.read_observation(device_id).await?;

    let observation = state
        .store
        .record_observation(device_id, change.update_time, &observation)?;

    let event = UpdateEvent {
        device_id: device_id.to_string(),
        timestamp: change.update_time,
        observation,
    };

    // No subscribers is not an error
    let _ = state.updates_tx.send(event.clone());

    Ok(event)
}

/// Collector errors.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to enumerate devices: {0}")]
    Enumerate(sparkline_core::Error),
    #[error(transparent)]
    Source(#[from] sparkline_core::Error),
    #[error("Failed to store: {0}")]
    Store(#[from] sparkline_store::Error),
    #[error("Collector task failed: {0}")]
    Join(#[from] JoinError),
}

impl CollectorError {
    /// Whether the fault should stop the whole service.
    ///
    /// Power service faults and rejected records only affect one event or one
    /// device; storage faults and enumeration failures do not recover.
    pub fn is_fatal(&self) -> bool {
        match self {
            CollectorError::Enumerate(_) | CollectorError::Join(_) => true,
            CollectorError::Source(_) => false,
            CollectorError::Store(e) => e.is_fatal(),
        }
    }
}
