//! UPower client over the system D-Bus.
//!
//! Devices are identified by their UPower object path, e.g.
//! `/org/freedesktop/UPower/devices/battery_BAT0`.
//!
//! Change notifications arrive as `org.freedesktop.DBus.Properties.PropertiesChanged`
//! signals. Each subscription installs a match rule scoped to one device path,
//! and the signal body is decoded into a [`PropertyChange`] before it leaves
//! this module.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use dbus::Message;
use dbus::arg::PropMap;
use dbus::message::MatchRule;
use dbus::nonblock::stdintf::org_freedesktop_dbus::Properties;
use dbus::nonblock::{MsgMatch, Proxy, SyncConnection};
use futures::stream::{BoxStream, Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sparkline_types::{Observation, ParseError};

use crate::error::{Error, Result};
use crate::traits::{ChangeStream, PowerSource};
use crate::types::{DeviceDescriptor, PropertyChange};

/// Well-known bus name of the UPower daemon.
pub const UPOWER_BUS_NAME: &str = "org.freedesktop.UPower";
/// Object path of the UPower manager.
pub const UPOWER_PATH: &str = "/org/freedesktop/UPower";
/// Manager interface.
pub const UPOWER_INTERFACE: &str = "org.freedesktop.UPower";
/// Per-device interface.
pub const UPOWER_DEVICE_INTERFACE: &str = "org.freedesktop.UPower.Device";
/// Standard properties interface.
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Default timeout for UPower method calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// UPower client.
pub struct UPower {
    conn: Arc<SyncConnection>,
    timeout: Duration,
}

impl UPower {
    /// Connect to the system bus.
    ///
    /// Must be called from within a tokio runtime. The returned handle
    /// resolves with a description of the failure once the bus connection is
    /// lost; nothing on this client works after that.
    pub fn connect_system(timeout: Duration) -> Result<(Self, JoinHandle<String>)> {
        let (resource, conn) = dbus_tokio::connection::new_system_sync()?;
        let lost = tokio::spawn(async move { resource.await.to_string() });

        info!("Connected to system bus");
        Ok((Self::with_connection(conn, timeout), lost))
    }

    /// Use an existing connection.
    pub fn with_connection(conn: Arc<SyncConnection>, timeout: Duration) -> Self {
        Self { conn, timeout }
    }

    fn proxy(&self, path: dbus::Path<'static>) -> Proxy<'static, Arc<SyncConnection>> {
        Proxy::new(UPOWER_BUS_NAME, path, self.timeout, Arc::clone(&self.conn))
    }
}

#[async_trait]
impl PowerSource for UPower {
    async fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        let manager = self.proxy(dbus::Path::from(UPOWER_PATH));
        let (paths,): (Vec<dbus::Path<'static>>,) = manager
            .method_call(UPOWER_INTERFACE, "EnumerateDevices", ())
            .await?;

        debug!("UPower reported {} device(s)", paths.len());

        let mut devices = Vec::with_capacity(paths.len());
        for path in paths {
            let id = path.to_string();
            let device = self.proxy(path);

            // A device that cannot describe itself is not tracked
            let power_supply = read_flag(&device, &id, "PowerSupply").await;
            let present = read_flag(&device, &id, "IsPresent").await;

            devices.push(DeviceDescriptor {
                id,
                power_supply,
                present,
            });
        }

        Ok(devices)
    }

    async fn subscribe(&self, device_id: &str) -> Result<ChangeStream> {
        let path = device_path(device_id)?;
        let rule =
            MatchRule::new_signal(PROPERTIES_INTERFACE, "PropertiesChanged").with_path(path);

        let (msg_match, messages) = self.conn.add_match(rule).await?.msg_stream();
        debug!("Subscribed to property changes of {}", device_id);

        let device_id = device_id.to_string();
        let changes = messages
            .filter_map(move |msg| futures::future::ready(decode_change(&device_id, &msg)))
            .boxed();

        Ok(Box::pin(Subscription {
            _match: msg_match,
            changes,
        }))
    }

    async fn read_observation(&self, device_id: &str) -> Result<Observation> {
        let device = self.proxy(device_path(device_id)?);

        let percentage: f64 = read_property(&device, device_id, "Percentage").await?;
        let energy_rate: f64 = read_property(&device, device_id, "EnergyRate").await?;

        let observation = Observation::new(percentage, energy_rate);
        observation.validate()?;
        Ok(observation)
    }
}

/// Keeps the match registration alive for as long as the stream is.
struct Subscription {
    _match: MsgMatch,
    changes: BoxStream<'static, Result<PropertyChange>>,
}

impl Stream for Subscription {
    type Item = Result<PropertyChange>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.changes.poll_next_unpin(cx)
    }
}

fn device_path(device_id: &str) -> Result<dbus::Path<'static>> {
    dbus::Path::new(device_id.to_string())
        .map_err(|_| Error::InvalidDevicePath(device_id.to_string()))
}

async fn read_property<R>(
    device: &Proxy<'static, Arc<SyncConnection>>,
    device_id: &str,
    property: &'static str,
) -> Result<R>
where
    R: for<'b> dbus::arg::Get<'b> + Send + 'static,
{
    device
        .get(UPOWER_DEVICE_INTERFACE, property)
        .await
        .map_err(|e| Error::PropertyRead {
            device: device_id.to_string(),
            property,
            message: e.to_string(),
        })
}

async fn read_flag(
    device: &Proxy<'static, Arc<SyncConnection>>,
    device_id: &str,
    property: &'static str,
) -> bool {
    match read_property::<bool>(device, device_id, property).await {
        Ok(value) => value,
        Err(e) => {
            warn!("{}", e);
            false
        }
    }
}

/// Decode a `PropertiesChanged` signal.
///
/// Returns `None` for changes on interfaces other than the UPower device
/// interface.
fn decode_change(device_id: &str, msg: &Message) -> Option<Result<PropertyChange>> {
    let (interface, changed, _invalidated): (String, PropMap, Vec<String>) = match msg.read3() {
        Ok(body) => body,
        Err(e) => return Some(Err(ParseError::InvalidPayload(e.to_string()).into())),
    };

    if interface != UPOWER_DEVICE_INTERFACE {
        return None;
    }

    Some(parse_changed_properties(device_id, &changed))
}

fn parse_changed_properties(device_id: &str, changed: &PropMap) -> Result<PropertyChange> {
    let update_time = changed
        .get("UpdateTime")
        .ok_or(ParseError::MissingField("UpdateTime"))?;

    // UPower declares UpdateTime as uint64
    let update_time = dbus::arg::cast::<u64>(&*update_time.0)
        .copied()
        .ok_or_else(|| {
            ParseError::InvalidPayload(format!(
                "UpdateTime has signature {}, expected t",
                update_time.0.signature()
            ))
        })?;

    let mut names: Vec<String> = changed.keys().cloned().collect();
    names.sort();

    Ok(PropertyChange {
        device_id: device_id.to_string(),
        update_time,
        changed: names,
    })
}
