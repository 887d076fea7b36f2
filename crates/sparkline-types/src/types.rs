//! Core types for battery telemetry.

use core::cmp::Ordering;
use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// One battery reading.
///
/// Values are stored as reported by the power service. The percentage is
/// expected to be within 0-100 and the energy rate is signed (positive while
/// drawing power), but neither range is enforced here.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Observation {
    /// Charge level in percent.
    pub percentage: f64,
    /// Energy rate in watts.
    pub energy_rate: f64,
}

impl Observation {
    /// Create a new observation.
    #[must_use]
    pub fn new(percentage: f64, energy_rate: f64) -> Self {
        Self {
            percentage,
            energy_rate,
        }
    }

    /// Check that both fields are finite.
    ///
    /// Non-finite values could be written but never read back, so they are
    /// rejected before an observation reaches the store.
    pub fn validate(&self) -> ParseResult<()> {
        if !self.percentage.is_finite() {
            return Err(ParseError::NonFinite {
                field: "percentage",
                value: self.percentage,
            });
        }
        if !self.energy_rate.is_finite() {
            return Err(ParseError::NonFinite {
                field: "energy_rate",
                value: self.energy_rate,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}% @ {} W", self.percentage, self.energy_rate)
    }
}

/// A single stored observation keyed by its timestamp text.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Timestamp key as stored (base-10 text).
    pub timestamp: String,
    /// Decoded observation.
    pub observation: Observation,
}

impl HistoryEntry {
    /// Numeric value of the timestamp key, if it is one.
    #[must_use]
    pub fn timestamp_value(&self) -> Option<u64> {
        self.timestamp.parse().ok()
    }
}

/// Every observation recorded for one device.
///
/// Entries are kept in the order the store yields them, which is not
/// necessarily chronological. Use [`History::chronological`] when order
/// matters; timestamp keys are numeric text and must not be compared
/// lexically.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&mut self, timestamp: impl Into<String>, observation: Observation) {
        self.entries.push(HistoryEntry {
            timestamp: timestamp.into(),
            observation,
        });
    }

    /// Look up the observation stored under a timestamp key.
    #[must_use]
    pub fn get(&self, timestamp: &str) -> Option<&Observation> {
        self.entries
            .iter()
            .find(|e| e.timestamp == timestamp)
            .map(|e| &e.observation)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in store order.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Return a copy sorted by numeric timestamp.
    ///
    /// Keys that are not base-10 integers sort after all numeric keys, in
    /// lexical order among themselves.
    #[must_use]
    pub fn chronological(&self) -> Self {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| match (a.timestamp_value(), b.timestamp_value()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.timestamp.cmp(&b.timestamp),
        });
        Self { entries }
    }
}

impl IntoIterator for History {
    type Item = HistoryEntry;
    type IntoIter = std::vec::IntoIter<HistoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<HistoryEntry> for History {
    fn from_iter<I: IntoIterator<Item = HistoryEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Serialized as a map of timestamp text to observation, in entry order.
#[cfg(feature = "serde")]
impl Serialize for History {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|e| (&e.timestamp, &e.observation)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(keys: &[&str]) -> History {
        keys.iter()
            .enumerate()
            .map(|(i, k)| HistoryEntry {
                timestamp: k.to_string(),
                observation: Observation::new(i as f64, 0.0),
            })
            .collect()
    }

    #[test]
    fn test_observation_validate() {
        assert!(Observation::new(87.5, -3.2).validate().is_ok());
        assert!(matches!(
            Observation::new(f64::NAN, 0.0).validate(),
            Err(ParseError::NonFinite { field: "percentage", .. })
        ));
        assert!(matches!(
            Observation::new(50.0, f64::NEG_INFINITY).validate(),
            Err(ParseError::NonFinite { field: "energy_rate", .. })
        ));
    }

    #[test]
    fn test_history_get() {
        let h = history(&["1000", "1001"]);
        assert_eq!(h.len(), 2);
        assert_eq!(h.get("1001"), Some(&Observation::new(1.0, 0.0)));
        assert_eq!(h.get("999"), None);
    }

    #[test]
    fn test_chronological_is_numeric_not_lexical() {
        // Lexically "999" > "1000"
        let h = history(&["1000", "999", "20"]);
        let sorted: Vec<_> = h
            .chronological()
            .into_iter()
            .map(|e| e.timestamp)
            .collect();
        assert_eq!(sorted, vec!["20", "999", "1000"]);
    }

    #[test]
    fn test_chronological_non_numeric_last() {
        let h = history(&["b", "5", "a", "3"]);
        let sorted: Vec<_> = h
            .chronological()
            .into_iter()
            .map(|e| e.timestamp)
            .collect();
        assert_eq!(sorted, vec!["3", "5", "a", "b"]);
    }

    #[test]
    fn test_chronological_leaves_history_untouched() {
        let h = history(&["2", "1"]);
        let _ = h.chronological();
        assert_eq!(h.iter().next().map(|e| e.timestamp.as_str()), Some("2"));
    }

    #[test]
    fn test_observation_display() {
        assert_eq!(Observation::new(87.5, -3.2).to_string(), "87.5% @ -3.2 W");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_history_serializes_as_map() {
        let mut h = History::new();
        h.push("1000", Observation::new(87.5, -3.2));
        let json = serde_json::to_value(&h).unwrap();
        assert_eq!(json["1000"]["percentage"], 87.5);
        assert_eq!(json["1000"]["energy_rate"], -3.2);
    }
}
