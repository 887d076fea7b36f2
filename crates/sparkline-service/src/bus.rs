//! Session bus export of the history query.
//!
//! The service owns a well-known name on the session bus and exports one
//! object with interface [`INTERFACE`]:
//!
//! - method `Collect(device: s) -> data: a{s(dd)}`
//! - signal `Update(percentage: d, energyRate: d)`, emitted after every ingest
//!
//! Introspection is answered by crossroads.

use std::collections::HashMap;
use std::sync::Arc;

use dbus::Message;
use dbus::channel::{MatchingReceiver, Sender};
use dbus::message::MatchRule;
use dbus::nonblock::stdintf::org_freedesktop_dbus::RequestNameReply;
use dbus::strings::BusName;
use dbus_crossroads::{Crossroads, MethodErr};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sparkline_types::{History, Observation};

use crate::state::{AppState, UpdateEvent};

/// Exported interface name.
pub const INTERFACE: &str = "party.sammyette.Sparkline";
/// Error returned for devices that were never enrolled.
pub const DEVICE_NOT_FOUND_ERROR: &str = "party.sammyette.Sparkline.Error.DeviceNotFound";
/// Error returned when a stored record cannot be decoded.
pub const CORRUPT_RECORD_ERROR: &str = "party.sammyette.Sparkline.Error.CorruptRecord";
/// Error returned for any other storage failure.
pub const STORAGE_ERROR: &str = "party.sammyette.Sparkline.Error.Storage";

/// Reply type of `Collect`: timestamp text to `(percentage, energyRate)`.
pub type CollectReply = HashMap<String, (f64, f64)>;

/// Errors while setting up the export.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("D-Bus error: {0}")]
    Bus(#[from] dbus::Error),
    #[error("Invalid bus name {name}: {reason}")]
    InvalidName { name: String, reason: String },
    #[error("Invalid object path {path}: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("Bus name {0} is already owned by another process")]
    NameTaken(String),
}

/// A running export.
pub struct BusExport {
    /// Resolves with a description of the failure once the connection is lost.
    pub lost: JoinHandle<String>,
    /// Task turning ingest notifications into `Update` signals.
    pub forwarder: JoinHandle<()>,
}

/// Connect to the session bus, claim the configured name and export the
/// query interface.
///
/// Must be called from within a tokio runtime.
pub async fn export(state: Arc<AppState>) -> Result<BusExport, BusError> {
    let name = state.config.bus.name.clone();
    let bus_name = BusName::new(name.clone()).map_err(|reason| BusError::InvalidName {
        name: name.clone(),
        reason,
    })?;
    let path = object_path(&state.config.bus.object_path)?;

    let (resource, conn) = dbus_tokio::connection::new_session_sync()?;
    let lost = tokio::spawn(async move { resource.await.to_string() });

    // Do not queue: a second instance must fail instead of waiting
    match conn.request_name(bus_name, false, false, true).await? {
        RequestNameReply::PrimaryOwner | RequestNameReply::AlreadyOwner => {}
        RequestNameReply::InQueue | RequestNameReply::Exists => {
            lost.abort();
            return Err(BusError::NameTaken(name));
        }
    }

    let mut cr = build_crossroads(Arc::clone(&state), path.clone());
    conn.start_receive(
        MatchRule::new_method_call(),
        Box::new(move |msg, conn| {
            if cr.handle_message(msg, conn).is_err() {
                warn!("Failed to dispatch incoming method call");
            }
            true
        }),
    );

    let forwarder = spawn_signal_forwarder(
        Arc::clone(&conn),
        path.clone(),
        state.updates_tx.subscribe(),
    );

    info!("Exported {} at {} as {}", INTERFACE, path, name);
    Ok(BusExport { lost, forwarder })
}

fn object_path(path: &str) -> Result<dbus::Path<'static>, BusError> {
    dbus::Path::new(path.to_string()).map_err(|reason| BusError::InvalidPath {
        path: path.to_string(),
        reason,
    })
}

/// Register the interface and insert the exported object.
pub fn build_crossroads(state: Arc<AppState>, path: dbus::Path<'static>) -> Crossroads {
    let mut cr = Crossroads::new();

    let iface = cr.register(INTERFACE, |b| {
        b.signal::<(f64, f64), _>("Update", ("percentage", "energyRate"));
        b.method(
            "Collect",
            ("device",),
            ("data",),
            |_, state: &mut Arc<AppState>, (device,): (String,)| {
                debug!("Collect requested for {}", device);
                let history = state.store.collect(&device).map_err(|e| method_error(&e))?;
                Ok((history_to_reply(&history),))
            },
        );
    });

    cr.insert(path, &[iface], state);
    cr
}

/// Map a store failure to a D-Bus error reply.
pub fn method_error(error: &sparkline_store::Error) -> MethodErr {
    let name = match error {
        sparkline_store::Error::DeviceNotFound(_) => DEVICE_NOT_FOUND_ERROR,
        sparkline_store::Error::CorruptRecord { .. } => CORRUPT_RECORD_ERROR,
        _ => STORAGE_ERROR,
    };
    MethodErr::from((name, error.to_string()))
}

/// Convert a history into the `a{s(dd)}` reply shape.
pub fn history_to_reply(history: &History) -> CollectReply {
    history
        .iter()
        .map(|entry| {
            let Observation {
                percentage,
                energy_rate,
            } = entry.observation;
            (entry.timestamp.clone(), (percentage, energy_rate))
        })
        .collect()
}

/// Build an `Update` signal for an observation.
pub fn update_signal(path: &dbus::Path<'static>, observation: &Observation) -> Option<Message> {
    Message::new_signal(path.to_string(), INTERFACE, "Update")
        .ok()
        .map(|msg| msg.append2(observation.percentage, observation.energy_rate))
}

fn spawn_signal_forwarder<C>(
    conn: Arc<C>,
    path: dbus::Path<'static>,
    mut updates: broadcast::Receiver<UpdateEvent>,
) -> JoinHandle<()>
where
    C: Sender + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(event) => {
                    let Some(signal) = update_signal(&path, &event.observation) else {
                        warn!("Failed to build Update signal for {}", event.device_id);
                        continue;
                    };
                    if conn.send(signal).is_err() {
                        warn!("Failed to emit Update for {}", event.device_id);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Signal forwarder fell behind, skipped {} update(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Signal forwarder stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::sync::Mutex;
    use std::time::Duration;

    use sparkline_core::MockPowerSource;
    use sparkline_store::Store;
    use tokio::time::timeout;

    use super::*;
    use crate::collector::Collector;
    use crate::config::{Config, DEFAULT_OBJECT_PATH};

    const BAT0: &str = "/org/freedesktop/UPower/devices/battery_BAT0";
    const WAIT: Duration = Duration::from_secs(5);

    /// Keeps every message it is asked to send.
    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<Message>>,
    }

    impl Sender for RecordingSender {
        fn send(&self, msg: Message) -> Result<u32, ()> {
            let mut sent = self.sent.lock().unwrap();
            sent.push(msg);
            Ok(sent.len() as u32)
        }
    }

    fn create_test_state() -> Arc<AppState> {
        AppState::new(Store::open_in_memory().unwrap(), Config::default())
    }

    fn call_collect(cr: &mut Crossroads, device: &str) -> Message {
        let mut msg = Message::new_method_call(INTERFACE, DEFAULT_OBJECT_PATH, INTERFACE, "Collect")
            .unwrap()
            .append1(device);
        msg.set_serial(1);

        let sent = RefCell::new(Vec::new());
        cr.handle_message(msg, &sent).unwrap();

        let mut replies = sent.into_inner();
        assert_eq!(replies.len(), 1);
        replies.remove(0)
    }

    fn error_name(mut reply: Message) -> String {
        let err = reply.as_result().unwrap_err();
        err.name().unwrap().to_string()
    }

    #[test]
    fn test_collect_returns_history() {
        let state = create_test_state();
        state.store.enroll(BAT0).unwrap();
        state
            .store
            .record_observation(BAT0, 1000, &Observation::new(87.5, -3.2))
            .unwrap();
        state
            .store
            .record_observation(BAT0, 1001, &Observation::new(87.0, -3.1))
            .unwrap();

        let mut cr = build_crossroads(state, DEFAULT_OBJECT_PATH.into());
        let reply = call_collect(&mut cr, BAT0);

        let data: CollectReply = reply.read1().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data["1000"], (87.5, -3.2));
        assert_eq!(data["1001"], (87.0, -3.1));
    }

    #[test]
    fn test_collect_unknown_device() {
        let mut cr = build_crossroads(create_test_state(), DEFAULT_OBJECT_PATH.into());
        let reply = call_collect(&mut cr, "nonexistent");
        assert_eq!(error_name(reply), DEVICE_NOT_FOUND_ERROR);
    }

    #[test]
    fn test_collect_corrupt_record() {
        let state = create_test_state();
        state
            .store
            .write(|txn| {
                let partition = txn.ensure_partition(BAT0)?;
                let child = txn.create_child(&partition, "1000")?;
                txn.put(&child, "percent", "garbage")?;
                txn.put(&child, "energyRate", "0")?;
                Ok(())
            })
            .unwrap();

        let mut cr = build_crossroads(state, DEFAULT_OBJECT_PATH.into());
        let reply = call_collect(&mut cr, BAT0);
        assert_eq!(error_name(reply), CORRUPT_RECORD_ERROR);
    }

    #[test]
    fn test_method_error_names() {
        let err = method_error(&sparkline_store::Error::DeviceNotFound("BAT9".into()));
        assert_eq!(&**err.errorname(), DEVICE_NOT_FOUND_ERROR);
        assert!(err.description().contains("BAT9"));

        let err = method_error(&sparkline_store::Error::Io(std::io::Error::other("disk")));
        assert_eq!(&**err.errorname(), STORAGE_ERROR);
    }

    #[test]
    fn test_history_to_reply() {
        let mut history = History::new();
        history.push("2000", Observation::new(50.0, 0.0));
        history.push("1000", Observation::new(60.0, 1.5));

        let reply = history_to_reply(&history);
        assert_eq!(reply.len(), 2);
        assert_eq!(reply["2000"], (50.0, 0.0));
        assert_eq!(reply["1000"], (60.0, 1.5));
    }

    #[test]
    fn test_update_signal() {
        let path = dbus::Path::from(DEFAULT_OBJECT_PATH);
        let signal = update_signal(&path, &Observation::new(42.0, -7.25)).unwrap();

        assert_eq!(signal.interface().as_deref(), Some(INTERFACE));
        assert_eq!(signal.member().as_deref(), Some("Update"));
        assert_eq!(signal.path().as_deref(), Some(DEFAULT_OBJECT_PATH));
        let (percentage, energy_rate): (f64, f64) = signal.read2().unwrap();
        assert_eq!((percentage, energy_rate), (42.0, -7.25));
    }

    #[tokio::test]
    async fn test_forwarder_emits_one_update_per_recorded_observation() {
        let state = create_test_state();
        let source = Arc::new(MockPowerSource::new());
        source
            .add_device("BAT0", true, true, Observation::new(87.5, -3.2))
            .await;

        let collector = Collector::new(Arc::clone(&state), Arc::clone(&source));
        let devices = collector.enroll().await.unwrap();

        let sender = Arc::new(RecordingSender::default());
        let forwarder = spawn_signal_forwarder(
            Arc::clone(&sender),
            DEFAULT_OBJECT_PATH.into(),
            state.updates_tx.subscribe(),
        );

        let mut updates = state.updates_tx.subscribe();
        let workers = collector.start(devices);
        timeout(WAIT, async {
            while source.subscriber_count("BAT0").await == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        source.emit("BAT0", 1000).await;
        timeout(WAIT, updates.recv()).await.unwrap().unwrap();

        // Rejected as a duplicate, so nothing is published
        source
            .set_observation("BAT0", Observation::new(1.0, 1.0))
            .await;
        source.emit("BAT0", 1000).await;
        source
            .set_observation("BAT0", Observation::new(87.0, -3.1))
            .await;
        source.emit("BAT0", 1001).await;
        source.close("BAT0").await;
        timeout(WAIT, workers.supervise()).await.unwrap().unwrap();

        // Dropping the last sender ends the forwarder
        drop(collector);
        drop(state);
        timeout(WAIT, forwarder).await.unwrap().unwrap();

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        for msg in sent.iter() {
            assert_eq!(msg.interface().as_deref(), Some(INTERFACE));
            assert_eq!(msg.member().as_deref(), Some("Update"));
            assert_eq!(msg.path().as_deref(), Some(DEFAULT_OBJECT_PATH));
        }
        let values: Vec<(f64, f64)> = sent.iter().map(|msg| msg.read2().unwrap()).collect();
        assert_eq!(values, vec![(87.5, -3.2), (87.0, -3.1)]);
    }

    #[tokio::test]
    async fn test_forwarder_stops_when_channel_closes() {
        let state = create_test_state();
        let sender = Arc::new(RecordingSender::default());
        let forwarder = spawn_signal_forwarder(
            Arc::clone(&sender),
            DEFAULT_OBJECT_PATH.into(),
            state.updates_tx.subscribe(),
        );

        drop(state);
        timeout(WAIT, forwarder).await.unwrap().unwrap();
        assert!(sender.sent.lock().unwrap().is_empty());
    }
}
