//! Battery history collector with D-Bus and HTTP query surfaces.
//!
//! This crate provides a service that:
//! - Enrolls every present, power-supplying UPower device
//! - Records each device's percentage and energy rate whenever UPower reports
//!   a change
//! - Answers `Collect` on the session bus and emits `Update` after each ingest
//! - Optionally exposes the same history over a small REST API
//!
//! # D-Bus Interface
//!
//! Name `party.sammyette.Sparkline`, object `/party/sammyette/Sparkline`:
//!
//! - `Collect(device: s) -> data: a{s(dd)}`
//! - signal `Update(percentage: d, energyRate: d)`
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/devices` - List enrolled devices
//! - `GET /api/devices/:id/history` - Full history, `?order=chronological` to sort
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/sparkline/config.toml`:
//!
//! ```toml
//! [storage]
//! path = "~/.local/share/sparkline/sparkline.db"
//!
//! [bus]
//! export = true
//!
//! [http]
//! enabled = true
//! bind = "127.0.0.1:8470"
//! ```

pub mod api;
pub mod bus;
pub mod collector;
pub mod config;
pub mod lifecycle;
pub mod state;

pub use collector::{Collector, CollectorError, Workers};
pub use config::{
    BusConfig, Config, ConfigError, HttpConfig, StorageConfig, UPowerConfig, ValidationError,
};
pub use lifecycle::run_until_stopped;
pub use state::{AppState, UpdateEvent};
