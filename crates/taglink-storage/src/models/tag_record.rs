use taglink_core::{Identity, ObservedAt, TagEvent};

/// Mutable fields of a tag record, overwritten by every upsert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagFields {
    pub antenna: Option<u16>,
    pub signal_strength: Option<f64>,
    pub observed_at: ObservedAt,
    pub seen_count: u32,
}

impl From<&TagEvent> for TagFields {
    fn from(event: &TagEvent) -> Self {
        Self {
            antenna: event.antenna,
            signal_strength: event.signal_strength,
            observed_at: event.observed_at,
            seen_count: event.seen_count,
        }
    }
}

/// Current state of one identity as held by a reconciliation store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub id: i64,
    pub identity: String,

    /// Display name from the products table, if the identity is catalogued.
    pub name: Option<String>,

    pub antenna: Option<u16>,
    pub signal_strength: Option<f64>,
    pub observed_at: ObservedAt,
    pub seen_count: u32,

    /// Whether the upsert that produced this value created the record.
    ///
    /// Always `false` for records returned by listings.
    pub created: bool,
}

impl StoredEvent {
    /// Canonical event for broadcasting.
    pub fn to_event(&self) -> TagEvent {
        TagEvent {
            identity: Identity::new(&self.identity),
            name: self.name.clone(),
            antenna: self.antenna,
            signal_strength: self.signal_strength,
            observed_at: self.observed_at,
            seen_count: self.seen_count,
        }
    }
}

/// Raw `tag_readings` row as returned by SQLite.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TagRecordRow {
    pub id: i64,
    pub epc: String,
    pub name: Option<String>,
    pub antenna: Option<i64>,
    pub signal_strength: Option<f64>,
    pub observed_at: i64,
    pub seen_count: i64,
    pub created: bool,
}

impl TagRecordRow {
    /// Convert into a [`StoredEvent`], rejecting values the schema should
    /// never have let through.
    pub fn into_stored(self) -> crate::StorageResult<StoredEvent> {
        let invalid = |field: &str, value: i64| {
            crate::StorageError::Validation(format!(
                "tag_readings.{field} holds out-of-range value {value} for epc {}",
                self.epc
            ))
        };

        let antenna = match self.antenna {
            Some(a) => Some(u16::try_from(a).map_err(|_| invalid("antenna", a))?),
            None => None,
        };
        let observed_at =
            ObservedAt::from_micros(self.observed_at).ok_or_else(|| invalid("observed_at", self.observed_at))?;
        let seen_count = u32::try_from(self.seen_count).map_err(|_| invalid("seen_count", self.seen_count))?;

        Ok(StoredEvent {
            id: self.id,
            identity: self.epc,
            name: self.name,
            antenna,
            signal_strength: self.signal_strength,
            observed_at,
            seen_count,
            created: self.created,
        })
    }
}
