//! Application state shared across the collector and query surfaces.
//!
//! # Update channel
//!
//! Every successful ingest is published on `updates_tx`, a
//! [`tokio::sync::broadcast`] channel. The D-Bus signal forwarder subscribes
//! to it. Senders never block: a subscriber that falls more than
//! `http.update_buffer` events behind loses the oldest ones.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use sparkline_store::Store;
use sparkline_types::Observation;

use crate::config::Config;

/// Shared application state.
pub struct AppState {
    /// The data store. Its transactions are the only synchronization it needs.
    pub store: Store,
    /// Configuration the service was started with.
    pub config: Config,
    /// Broadcast channel for ingest notifications.
    pub updates_tx: broadcast::Sender<UpdateEvent>,
}

impl AppState {
    /// Create new application state.
    pub fn new(store: Store, config: Config) -> Arc<Self> {
        let (updates_tx, _) = broadcast::channel(config.http.update_buffer.max(1));
        Arc::new(Self {
            store,
            config,
            updates_tx,
        })
    }
}

/// An observation that has just been recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateEvent {
    /// Device the observation belongs to.
    pub device_id: String,
    /// Timestamp it was recorded under.
    pub timestamp: u64,
    /// The recorded values.
    pub observation: Observation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_new() {
        let store = Store::open_in_memory().unwrap();
        let state = AppState::new(store, Config::default());

        assert_eq!(state.config.http.bind, "127.0.0.1:8470");
        assert!(state.store.devices().unwrap().is_empty());
        assert_eq!(state.updates_tx.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_app_state_broadcast_channel() {
        let store = Store::open_in_memory().unwrap();
        let state = AppState::new(store, Config::default());

        let mut rx = state.updates_tx.subscribe();
        let event = UpdateEvent {
            device_id: "BAT0".to_string(),
            timestamp: 1000,
            observation: Observation::new(87.5, -3.2),
        };
        state.updates_tx.send(event.clone()).unwrap();

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn test_update_event_serialization() {
        let event = UpdateEvent {
            device_id: "/org/freedesktop/UPower/devices/battery_BAT0".to_string(),
            timestamp: 1000,
            observation: Observation::new(87.5, -3.2),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["device_id"], "/org/freedesktop/UPower/devices/battery_BAT0");
        assert_eq!(json["timestamp"], 1000);
        assert_eq!(json["observation"]["percentage"], 87.5);
        assert_eq!(json["observation"]["energy_rate"], -3.2);
    }
}
