//! Transactional per-device time-series store for battery observations.
//!
//! This crate persists battery observations in a single SQLite file laid out
//! as a two-level hierarchy:
//!
//! ```text
//! device partition ("/org/freedesktop/UPower/devices/battery_BAT0")
//! └── child "1700000000"
//!     ├── percent    = "87.5"
//!     └── energyRate = "-3.2"
//! ```
//!
//! Each device is an independent append-only log keyed by timestamp. All
//! access goes through [`Store::read`] and [`Store::write`], which run a
//! closure inside one transaction; writes commit all-or-nothing.
//!
//! # Features
//!
//! - Enroll devices ([`Store::enroll`])
//! - Record observations, rejecting duplicate timestamps
//!   ([`Store::record_observation`])
//! - Reconstruct a device's full history ([`Store::collect`])
//!
//! # Example
//!
//! ```
//! use sparkline_store::Store;
//! use sparkline_types::Observation;
//!
//! let store = Store::open_in_memory()?;
//! store.enroll("BAT0")?;
//! store.record_observation("BAT0", 1000, &Observation::new(87.5, -3.2))?;
//!
//! let history = store.collect("BAT0")?;
//! assert_eq!(history.get("1000"), Some(&Observation::new(87.5, -3.2)));
//! # Ok::<(), sparkline_store::Error>(())
//! ```

mod error;
mod history;
mod ingest;
mod schema;
mod store;

pub use error::{Error, Result};
pub use store::{Child, Partition, ReadTxn, Store, WriteTxn};

/// Default database path following platform conventions.
///
/// - Linux: `$XDG_DATA_HOME/sparkline/sparkline.db`, falling back to
///   `~/.local/share/sparkline/sparkline.db`
/// - macOS: `~/Library/Application Support/sparkline/sparkline.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("sparkline")
        .join("sparkline.db")
}
