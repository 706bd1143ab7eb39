//! Raw reading normalization.
//!
//! Converts the vendor-shaped [`RawReading`] maps handed over by drivers into
//! canonical [`TagEvent`]s. The conversion is a pure function of the reading,
//! the [`NormalizerConfig`] and the supplied "now" instant.
//!
//! # Field rules
//!
//! | Field     | Absent / null      | Accepted                                  |
//! |-----------|--------------------|-------------------------------------------|
//! | identity  | `Identity::Unknown`| string (blank maps to unknown)            |
//! | antenna   | `None`             | integer 0-65535, integer string           |
//! | signal    | `None`             | finite number, numeric string             |
//! | timestamp | `now`              | non-negative number, numeric string       |
//! | count     | `1`                | positive integer, integer string          |
//!
//! Anything else makes the reading malformed. [`normalize_batch`] logs and
//! skips malformed readings and keeps the rest of the batch.
//!
//! Some vendor libraries wrap scalar values in one-element arrays
//! (`"AntennaID": [1]`); those are unwrapped before the rules apply.
//!
//! # Timestamp units
//!
//! All timestamps are converted to epoch microseconds. The source unit is
//! declared at the boundary through [`TimestampUnit`]; with
//! [`TimestampUnit::Auto`] it is inferred from the magnitude of the value.
//!
//! ```
//! use taglink_core::{NormalizerConfig, ObservedAt, RawReading, normalize};
//!
//! let config = NormalizerConfig::default();
//! let now = ObservedAt::now();
//!
//! let seconds = RawReading::new().with("EPC-96", "E200").with("LastSeenTimestampUTC", 1_700_000_000);
//! let micros = RawReading::new().with("EPC-96", "E200").with("LastSeenTimestampUTC", 1_700_000_000_000_000i64);
//!
//! assert_eq!(
//!     normalize(&seconds, &config, now).unwrap().observed_at,
//!     normalize(&micros, &config, now).unwrap().observed_at,
//! );
//! ```

use crate::constants::{
    ANTENNA_KEYS, DEFAULT_SEEN_COUNT, IDENTITY_KEYS, MILLIS_MAGNITUDE_LIMIT,
    SECONDS_MAGNITUDE_LIMIT, SEEN_COUNT_KEYS, SIGNAL_KEYS, TIMESTAMP_KEYS,
};
use crate::error::Error;
use crate::types::{Identity, ObservedAt, RawReading, TagEvent};
use serde_json::Value;
use tracing::{trace, warn};

/// Unit of raw numeric timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampUnit {
    /// Infer the unit from the magnitude of each value.
    #[default]
    Auto,

    /// Epoch seconds.
    Seconds,

    /// Epoch milliseconds.
    Millis,

    /// Epoch microseconds.
    Micros,
}

impl TimestampUnit {
    /// Infer the unit of a raw value from its magnitude.
    ///
    /// # Examples
    ///
    /// ```
    /// use taglink_core::TimestampUnit;
    ///
    /// assert_eq!(TimestampUnit::detect(1_700_000_000.0), TimestampUnit::Seconds);
    /// assert_eq!(TimestampUnit::detect(1_700_000_000_000.0), TimestampUnit::Millis);
    /// assert_eq!(TimestampUnit::detect(1_700_000_000_000_000.0), TimestampUnit::Micros);
    /// ```
    pub fn detect(raw: f64) -> Self {
        let magnitude = raw.abs();
        if magnitude < SECONDS_MAGNITUDE_LIMIT {
            Self::Seconds
        } else if magnitude < MILLIS_MAGNITUDE_LIMIT {
            Self::Millis
        } else {
            Self::Micros
        }
    }

    fn resolve(self, raw: f64) -> Self {
        match self {
            Self::Auto => Self::detect(raw),
            unit => unit,
        }
    }

    fn micros_per_unit(self) -> i64 {
        match self {
            Self::Seconds => 1_000_000,
            Self::Millis => 1_000,
            Self::Micros | Self::Auto => 1,
        }
    }
}

/// Reasons a single reading cannot be normalized.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedReading {
    /// A field is present but has an unusable type or value.
    #[error("field '{key}' has unsupported value {value}")]
    InvalidField { key: String, value: String },

    /// The timestamp cannot be represented as a calendar instant.
    #[error("timestamp {0} is out of range")]
    TimestampOutOfRange(String),

    /// The seen count is zero or negative.
    #[error("seen count must be positive, got {0}")]
    NonPositiveSeenCount(i64),
}

impl From<MalformedReading> for Error {
    fn from(err: MalformedReading) -> Self {
        Error::MalformedReading(err.to_string())
    }
}

/// Normalizer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NormalizerConfig {
    /// Unit of numeric timestamps coming from the driver.
    pub timestamp_unit: TimestampUnit,
}

impl NormalizerConfig {
    /// Declare the timestamp unit used by the driver.
    pub fn timestamp_unit(mut self, unit: TimestampUnit) -> Self {
        self.timestamp_unit = unit;
        self
    }
}

/// Normalize one raw reading.
///
/// `now` substitutes a missing timestamp.
///
/// # Errors
///
/// Returns [`MalformedReading`] when a present field cannot be interpreted.
pub fn normalize(
    reading: &RawReading,
    config: &NormalizerConfig,
    now: ObservedAt,
) -> Result<TagEvent, MalformedReading> {
    let identity = match reading.first_of(IDENTITY_KEYS) {
        None => Identity::Unknown,
        Some((key, value)) => match unwrap_singleton(value) {
            Value::String(code) => Identity::new(code),
            other => return Err(invalid(key, other)),
        },
    };

    let antenna = match reading.first_of(ANTENNA_KEYS) {
        None => None,
        Some((key, value)) => {
            let value = unwrap_singleton(value);
            let antenna = as_integer(value)
                .and_then(|n| u16::try_from(n).ok())
                .ok_or_else(|| invalid(key, value))?;
            Some(antenna)
        }
    };

    let signal_strength = match reading.first_of(SIGNAL_KEYS) {
        None => None,
        Some((key, value)) => {
            let value = unwrap_singleton(value);
            let signal = as_float(value)
                .filter(|n| n.is_finite())
                .ok_or_else(|| invalid(key, value))?;
            Some(signal)
        }
    };

    let observed_at = match reading.first_of(TIMESTAMP_KEYS) {
        None => now,
        Some((key, value)) => timestamp_to_observed_at(key, unwrap_singleton(value), config)?,
    };

    let seen_count = match reading.first_of(SEEN_COUNT_KEYS) {
        None => DEFAULT_SEEN_COUNT,
        Some((key, value)) => {
            let value = unwrap_singleton(value);
            let count = as_integer(value).ok_or_else(|| invalid(key, value))?;
            if count <= 0 {
                return Err(MalformedReading::NonPositiveSeenCount(count));
            }
            u32::try_from(count).map_err(|_| invalid(key, value))?
        }
    };

    Ok(TagEvent {
        identity,
        name: None,
        antenna,
        signal_strength,
        observed_at,
        seen_count,
    })
}

/// Normalize a batch, skipping malformed readings.
///
/// Each skipped reading is logged at `warn` level; the remaining readings are
/// returned in their original order.
pub fn normalize_batch(
    readings: &[RawReading],
    config: &NormalizerConfig,
    now: ObservedAt,
) -> Vec<TagEvent> {
    let mut events = Vec::with_capacity(readings.len());

    for (index, reading) in readings.iter().enumerate() {
        match normalize(reading, config, now) {
            Ok(event) => {
                trace!(identity = %event.identity, "normalized reading");
                events.push(event);
            }
            Err(e) => {
                warn!(index, error = %e, "skipping malformed reading");
            }
        }
    }

    events
}

fn timestamp_to_observed_at(
    key: &str,
    value: &Value,
    config: &NormalizerConfig,
) -> Result<ObservedAt, MalformedReading> {
    let out_of_range = || MalformedReading::TimestampOutOfRange(value.to_string());

    let micros = if let Some(raw) = as_exact_integer(value) {
        if raw < 0 {
            return Err(out_of_range());
        }
        let unit = config.timestamp_unit.resolve(raw as f64);
        raw.checked_mul(unit.micros_per_unit()).ok_or_else(out_of_range)?
    } else if let Some(raw) = as_float(value) {
        if !raw.is_finite() || raw < 0.0 {
            return Err(out_of_range());
        }
        let unit = config.timestamp_unit.resolve(raw);
        let scaled = (raw * unit.micros_per_unit() as f64).round();
        if scaled >= i64::MAX as f64 {
            return Err(out_of_range());
        }
        scaled as i64
    } else {
        return Err(invalid(key, value));
    };

    ObservedAt::from_micros(micros).ok_or_else(out_of_range)
}

fn invalid(key: &str, value: &Value) -> MalformedReading {
    MalformedReading::InvalidField {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn unwrap_singleton(value: &Value) -> &Value {
    match value {
        Value::Array(items) if items.len() == 1 => &items[0],
        other => other,
    }
}

/// Integer value, accepting integral floats and integer strings.
fn as_integer(value: &Value) -> Option<i64> {
    as_exact_integer(value).or_else(|| match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64),
        _ => None,
    })
}

/// Integer value without going through floating point.
fn as_exact_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
