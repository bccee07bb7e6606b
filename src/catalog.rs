//! Event catalog types and supplier-record normalization.
//!
//! Suppliers hand over loosely typed records: coordinates may be JSON
//! numbers or numeric strings, and display fields vary per deployment.
//! Normalization happens once at this boundary so the monitor only ever
//! sees strictly typed [`GeoEvent`]s. A record that cannot be normalized
//! is excluded from monitoring and logged; it is never a fatal error.

use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::geo::Coordinate;

/// Opaque, stable identifier of a catalog event.
///
/// Supplier catalogs carry ids as JSON numbers or strings; both
/// deserialize into the same id, normalized to its text form, so the
/// notified set keys on a single stable representation.
///
/// # Examples
///
/// ```
/// use geofence::EventId;
///
/// let a: EventId = serde_json::from_str("1").unwrap();
/// let b: EventId = serde_json::from_str("\"1\"").unwrap();
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "IdRepr")]
pub struct EventId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Int(i64),
    Text(String),
}

impl From<IdRepr> for EventId {
    fn from(repr: IdRepr) -> Self {
        match repr {
            IdRepr::Int(v) => Self(v.to_string()),
            IdRepr::Text(v) => Self(v),
        }
    }
}

impl EventId {
    /// Creates an id from its text form.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyEventId`] if the id is empty or
    /// whitespace-only.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyEventId);
        }
        Ok(Self(id))
    }

    /// The id's text form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for EventId {
    fn from(v: i64) -> Self {
        Self(v.to_string())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A coordinate component the way suppliers provide it: a JSON number or
/// a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoordValue {
    /// Already numeric.
    Number(f64),
    /// Text to be parsed as decimal degrees.
    Text(String),
}

impl CoordValue {
    /// Resolves the component to decimal degrees, if it parses to a
    /// finite number.
    #[must_use]
    pub fn as_degrees(&self) -> Option<f64> {
        match self {
            Self::Number(v) => v.is_finite().then_some(*v),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }
}

impl From<f64> for CoordValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for CoordValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// A supplier-side catalog record, before normalization.
///
/// Every field is optional or defaulted so a sloppy record still
/// deserializes; normalization decides what is usable. Unrecognized
/// fields are kept verbatim in `extra` and travel with the event as its
/// display metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvent {
    /// Supplier id, number or string.
    #[serde(default)]
    pub id: Option<EventId>,

    /// Latitude, number or numeric string.
    #[serde(default)]
    pub latitude: Option<CoordValue>,

    /// Longitude, number or numeric string.
    #[serde(default)]
    pub longitude: Option<CoordValue>,

    /// Display title.
    #[serde(default)]
    pub title: String,

    /// Display address. Some suppliers send this as `location` instead;
    /// normalization lifts that out of `extra`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Everything else the supplier sent (organizer, category, date, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A validated, monitorable catalog event.
///
/// The monitor holds these as a read-only snapshot and passes the display
/// payload (`title`, `address`, `metadata`) through to notifications
/// unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoEvent {
    /// Unique, stable identifier.
    pub id: EventId,

    /// Validated event location.
    pub coordinate: Coordinate,

    /// Display title.
    pub title: String,

    /// Display address, if the supplier provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Opaque display fields passed through for rendering.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl GeoEvent {
    /// Creates an event with an empty display payload beyond the title.
    #[must_use]
    pub fn new(id: EventId, coordinate: Coordinate, title: impl Into<String>) -> Self {
        Self {
            id,
            coordinate,
            title: title.into(),
            address: None,
            metadata: serde_json::Map::new(),
        }
    }
}

/// Outcome of normalizing a supplier catalog.
#[derive(Debug, Clone, Default)]
pub struct NormalizedCatalog {
    /// Events that passed validation, in supplier order.
    pub events: Vec<GeoEvent>,
    /// Number of records excluded from monitoring.
    pub excluded: usize,
}

/// Normalizes supplier records into monitorable events.
///
/// Records lacking an id or either coordinate, or whose coordinates do
/// not parse to in-range decimal degrees, are excluded and logged. The
/// remaining records keep their supplier order.
#[must_use]
pub fn normalize_events(records: Vec<RawEvent>) -> NormalizedCatalog {
    let mut events = Vec::with_capacity(records.len());
    let mut excluded = 0;

    for record in records {
        match normalize_record(record) {
            Some(event) => events.push(event),
            None => excluded += 1,
        }
    }

    NormalizedCatalog { events, excluded }
}

fn normalize_record(record: RawEvent) -> Option<GeoEvent> {
    let id = match record.id {
        Some(id) if !id.as_str().trim().is_empty() => id,
        _ => {
            warn!("excluding catalog record without a usable id (title: {:?})", record.title);
            return None;
        }
    };

    let (Some(raw_lat), Some(raw_lon)) = (&record.latitude, &record.longitude) else {
        warn!("excluding event {id}: missing latitude/longitude");
        return None;
    };

    let (Some(lat), Some(lon)) = (raw_lat.as_degrees(), raw_lon.as_degrees()) else {
        warn!("excluding event {id}: coordinates did not parse");
        return None;
    };

    let coordinate = match Coordinate::new(lat, lon) {
        Ok(coordinate) => coordinate,
        Err(err) => {
            warn!("excluding event {id}: {err}");
            return None;
        }
    };

    let address = record.address.or_else(|| {
        record
            .extra
            .get("location")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    });

    Some(GeoEvent {
        id,
        coordinate,
        title: record.title,
        address,
        metadata: record.extra,
    })
}
