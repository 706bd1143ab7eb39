use crate::constants::UNKNOWN_IDENTITY;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Tag identity (EPC), the reconciliation key.
///
/// Readings that arrive without an identity are not dropped; they carry the
/// explicit [`Identity::Unknown`] marker so downstream stages can decide what
/// to do with them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// A tag code as reported by the reader (trimmed).
    Known(String),

    /// The reading carried no identity field.
    Unknown,
}

impl Identity {
    /// Build an identity from a raw string, mapping blank input to `Unknown`.
    pub fn new(code: &str) -> Self {
        let code = code.trim();
        if code.is_empty() {
            Self::Unknown
        } else {
            Self::Known(code.to_string())
        }
    }

    /// The identity as it appears on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(code) => code,
            Self::Unknown => UNKNOWN_IDENTITY,
        }
    }

    /// Whether this identity can be used as a reconciliation key.
    #[must_use]
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observation instant in microseconds since the Unix epoch.
///
/// Microseconds are the single time unit used across the pipeline. Values
/// are validated on construction so conversion to a calendar date never
/// fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObservedAt(i64);

impl ObservedAt {
    /// Create from epoch microseconds.
    ///
    /// Returns `None` when the value is outside the representable calendar range.
    pub fn from_micros(micros: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_micros(micros).map(|_| Self(micros))
    }

    /// Create from a UTC date-time, truncating to microsecond precision.
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime.timestamp_micros())
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Epoch microseconds.
    #[must_use]
    pub fn as_micros(&self) -> i64 {
        self.0
    }

    /// Calendar representation.
    #[must_use]
    pub fn to_datetime(&self) -> DateTime<Utc> {
        // Range checked in every constructor
        DateTime::<Utc>::from_timestamp_micros(self.0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// ISO-8601 (RFC 3339) UTC string with microsecond precision.
    ///
    /// # Examples
    ///
    /// ```
    /// use taglink_core::ObservedAt;
    ///
    /// let at = ObservedAt::from_micros(1_700_000_000_000_000).unwrap();
    /// assert_eq!(at.to_iso8601(), "2023-11-14T22:13:20.000000Z");
    /// ```
    #[must_use]
    pub fn to_iso8601(&self) -> String {
        self.to_datetime()
            .to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl fmt::Display for ObservedAt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl Serialize for ObservedAt {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso8601())
    }
}

impl<'de> Deserialize<'de> for ObservedAt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let datetime = DateTime::parse_from_rfc3339(&raw)
            .map_err(serde::de::Error::custom)?
            .with_timezone(&Utc);
        Ok(Self::from_datetime(datetime))
    }
}

/// One raw reading as handed over by a driver.
///
/// Keys and value types are vendor specific (see
/// [`constants`](crate::constants) for the recognised keys); normalization
/// into a [`TagEvent`] happens in [`normalize`](crate::normalize).
///
/// # Examples
///
/// ```
/// use taglink_core::RawReading;
///
/// let reading = RawReading::new()
///     .with("EPC-96", "E2000001")
///     .with("AntennaID", 1)
///     .with("PeakRSSI", -40);
///
/// assert_eq!(reading.len(), 3);
/// assert!(reading.first_of(&["EPC", "EPC-96"]).is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawReading(Map<String, Value>);

impl RawReading {
    /// Create an empty reading.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Get a field by exact key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Return the first non-null value among `keys`, along with the key that matched.
    pub fn first_of<'a>(&'a self, keys: &[&'a str]) -> Option<(&'a str, &'a Value)> {
        keys.iter()
            .find_map(|key| self.0.get(*key).filter(|v| !v.is_null()).map(|v| (*key, v)))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the reading has no fields at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for RawReading {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Canonical observation of a tag.
#[derive(Debug, Clone, PartialEq)]
pub struct TagEvent {
    /// Reconciliation key.
    pub identity: Identity,

    /// Display name resolved by the store, if any.
    pub name: Option<String>,

    /// Source antenna, `None` when unknown.
    pub antenna: Option<u16>,

    /// Peak received signal strength in dBm, `None` when unknown.
    pub signal_strength: Option<f64>,

    /// When the reader last saw the tag.
    pub observed_at: ObservedAt,

    /// Observations collapsed into this reading (at least 1).
    pub seen_count: u32,
}

impl TagEvent {
    /// Attach the store-resolved display name.
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// Convert into the wire representation delivered to subscribers.
    pub fn to_frame(&self) -> EventFrame {
        EventFrame {
            identity: self.identity.as_str().to_string(),
            name: self.name.clone(),
            antenna: self.antenna,
            signal_strength: self.signal_strength,
            observed_at: self.observed_at.to_iso8601(),
            seen_count: self.seen_count,
        }
    }
}

/// Event record as delivered to subscribers.
///
/// Timestamps are always ISO-8601 strings at this point, never raw epoch
/// numbers.
///
/// # Examples
///
/// ```
/// use taglink_core::{Identity, ObservedAt, TagEvent};
///
/// let event = TagEvent {
///     identity: Identity::new("E2000001"),
///     name: None,
///     antenna: Some(1),
///     signal_strength: Some(-40.0),
///     observed_at: ObservedAt::from_micros(1_700_000_000_000_000).unwrap(),
///     seen_count: 3,
/// };
///
/// let json = serde_json::to_string(&event.to_frame()).unwrap();
/// assert_eq!(
///     json,
///     r#"{"identity":"E2000001","antenna":1,"signalStrength":-40.0,"observedAt":"2023-11-14T22:13:20.000000Z","seenCount":3}"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFrame {
    pub identity: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub antenna: Option<u16>,

    pub signal_strength: Option<f64>,

    pub observed_at: String,

    pub seen_count: u32,
}
