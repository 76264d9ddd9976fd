//! Core record types for patrolrecorder.
//!
//! A [`PatrolRecord`] is one timestamped, geolocated visit to a checkpoint.
//! Records are created by the scan controller after a successful decode and
//! GPS fix, and are never modified afterwards.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// Latitude, -90.0 to 90.0.
    pub latitude: f64,
    /// Longitude, -180.0 to 180.0.
    pub longitude: f64,
}

impl GeoLocation {
    /// Create a location, rejecting non-finite or out-of-range coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] if either coordinate is NaN, infinite,
    /// or outside its valid range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let location = Self {
            latitude,
            longitude,
        };
        location.validate()?;
        Ok(location)
    }

    /// Check that both coordinates are finite and in range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] describing the bad coordinate.
    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::invalid_record(format!(
                "latitude out of range: {}",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::invalid_record(format!(
                "longitude out of range: {}",
                self.longitude
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for GeoLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5}, {:.5}", self.latitude, self.longitude)
    }
}

/// One visit to a checkpoint.
///
/// Serialized field names follow the persisted history format
/// (`pointId`, `pointName`, `timestamp`, `location`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatrolRecord {
    /// Identifier assigned by the store when the record is saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The scanned checkpoint code.
    pub point_id: String,

    /// Display name resolved from the registry.
    pub point_name: String,

    /// When the visit was recorded. Millisecond precision.
    #[serde(with = "rfc3339_millis")]
    pub timestamp: DateTime<Utc>,

    /// Where the guard was when the visit was recorded.
    pub location: GeoLocation,
}

impl PatrolRecord {
    /// Create a new record stamped with the current time.
    #[must_use]
    pub fn new(
        point_id: impl Into<String>,
        point_name: impl Into<String>,
        location: GeoLocation,
    ) -> Self {
        Self::at(point_id, point_name, location, Utc::now())
    }

    /// Create a new record with an explicit timestamp.
    ///
    /// The timestamp is truncated to milliseconds, the precision of the
    /// persisted format, so a saved record reads back identical.
    #[must_use]
    pub fn at(
        point_id: impl Into<String>,
        point_name: impl Into<String>,
        location: GeoLocation,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            point_id: point_id.into(),
            point_name: point_name.into(),
            timestamp: timestamp.trunc_subsecs(3),
            location,
        }
    }

    /// Return a copy of this record carrying the given identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Check the invariants every persisted record must hold.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] if the point id is blank or the
    /// location is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.point_id.trim().is_empty() {
            return Err(Error::invalid_record("point id is empty"));
        }
        self.location.validate()
    }
}

/// RFC 3339 text with millisecond precision, always in UTC (`...Z`).
mod rfc3339_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
