//! Text encoding for stored observation records.
//!
//! A record is a flat set of `field -> text` pairs. Two fields are
//! recognized:
//!
//! | Field | Value |
//! |-------|-------|
//! | `percent` | [`Observation::percentage`] |
//! | `energyRate` | [`Observation::energy_rate`] |
//!
//! Values use the shortest text that parses back to the identical `f64`.
//! Unrecognized fields are ignored on decode so newer writers can add fields
//! without breaking older readers.

use crate::error::{ParseError, ParseResult};
use crate::types::Observation;

/// Field name for the charge percentage.
pub const PERCENT_FIELD: &str = "percent";

/// Field name for the energy rate.
pub const ENERGY_RATE_FIELD: &str = "energyRate";

/// Encode an observation into its stored fields.
///
/// # Example
///
/// ```
/// use sparkline_types::{Observation, codec};
///
/// let fields = codec::encode(&Observation::new(87.5, -3.2));
/// assert_eq!(fields[0], ("percent", "87.5".to_string()));
/// assert_eq!(fields[1], ("energyRate", "-3.2".to_string()));
/// ```
#[must_use]
pub fn encode(observation: &Observation) -> [(&'static str, String); 2] {
    [
        (PERCENT_FIELD, encode_float(observation.percentage)),
        (ENERGY_RATE_FIELD, encode_float(observation.energy_rate)),
    ]
}

/// Decode an observation from stored fields.
///
/// Both recognized fields must be present and hold finite floats.
pub fn decode<I, K, V>(fields: I) -> ParseResult<Observation>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut percentage = None;
    let mut energy_rate = None;

    for (key, value) in fields {
        match key.as_ref() {
            PERCENT_FIELD => percentage = Some(decode_float(PERCENT_FIELD, value.as_ref())?),
            ENERGY_RATE_FIELD => {
                energy_rate = Some(decode_float(ENERGY_RATE_FIELD, value.as_ref())?)
            }
            _ => {}
        }
    }

    Ok(Observation {
        percentage: percentage.ok_or(ParseError::MissingField(PERCENT_FIELD))?,
        energy_rate: energy_rate.ok_or(ParseError::MissingField(ENERGY_RATE_FIELD))?,
    })
}

/// `Display` for `f64` is the shortest representation that round-trips.
fn encode_float(value: f64) -> String {
    value.to_string()
}

fn decode_float(field: &'static str, text: &str) -> ParseResult<f64> {
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ParseError::InvalidField {
            field,
            value: text.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_shortest_form() {
        let fields = encode(&Observation::new(87.0, 0.1));
        assert_eq!(fields[0].1, "87");
        assert_eq!(fields[1].1, "0.1");
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let fields = vec![
            ("percent", "50"),
            ("voltage", "not a number"),
            ("energyRate", "-1.25"),
        ];
        assert_eq!(decode(fields).unwrap(), Observation::new(50.0, -1.25));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode(vec![("percent", "fifty"), ("energyRate", "0")]).unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidField {
                field: "percent",
                value: "fifty".to_string()
            }
        );
    }

    #[test]
    fn test_decode_rejects_non_finite() {
        for text in ["NaN", "inf", "-infinity"] {
            let result = decode(vec![("percent", "1"), ("energyRate", text)]);
            assert!(
                matches!(result, Err(ParseError::InvalidField { field: "energyRate", .. })),
                "accepted {text}"
            );
        }
    }

    #[test]
    fn test_decode_missing_field() {
        let err = decode(vec![("percent", "1")]).unwrap_err();
        assert_eq!(err, ParseError::MissingField("energyRate"));
    }

    #[test]
    fn test_negative_zero_preserved() {
        let fields = encode(&Observation::new(-0.0, 0.0));
        let decoded = decode(fields).unwrap();
        assert!(decoded.percentage.is_sign_negative());
    }

    #[test]
    fn test_extreme_values() {
        for x in [f64::MAX, f64::MIN, f64::MIN_POSITIVE, f64::EPSILON, 5e-324] {
            let decoded = decode(encode(&Observation::new(x, -x))).unwrap();
            assert_eq!(decoded.percentage.to_bits(), x.to_bits());
            assert_eq!(decoded.energy_rate.to_bits(), (-x).to_bits());
        }
    }
}
