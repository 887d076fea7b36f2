//! Battery observation types and record codec for sparkline.
//!
//! This crate holds the data model shared by the store, the power-service
//! client and the daemon:
//!
//! - [`Observation`]: one battery sample (charge percentage and energy rate)
//! - [`History`]: every observation stored for one device
//! - [`codec`]: the text encoding used for stored records
//!
//! # Example
//!
//! ```
//! use sparkline_types::{Observation, codec};
//!
//! let observation = Observation::new(87.5, -3.2);
//! let fields = codec::encode(&observation);
//! assert_eq!(codec::decode(fields)?, observation);
//! # Ok::<(), sparkline_types::ParseError>(())
//! ```

pub mod codec;
pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{History, HistoryEntry, Observation};
