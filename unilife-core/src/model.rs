use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinates are kept in micro-degrees so that keys compare exactly.
const MICRO_DEGREES: f64 = 1_000_000.0;

/// Identity of a place for deduplication and storage purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocationKey {
    Name(String),
    Coordinates { lat_e6: i64, lng_e6: i64 },
}

impl LocationKey {
    pub fn name(name: impl Into<String>) -> Self {
        LocationKey::Name(name.into())
    }

    pub fn coordinates(lat: f64, lng: f64) -> Self {
        LocationKey::Coordinates {
            lat_e6: (lat * MICRO_DEGREES).round() as i64,
            lng_e6: (lng * MICRO_DEGREES).round() as i64,
        }
    }

    /// Latitude/longitude in degrees, if this key is coordinate based.
    pub fn lat_lng(&self) -> Option<(f64, f64)> {
        match self {
            LocationKey::Name(_) => None,
            LocationKey::Coordinates { lat_e6, lng_e6 } => Some((
                *lat_e6 as f64 / MICRO_DEGREES,
                *lng_e6 as f64 / MICRO_DEGREES,
            )),
        }
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationKey::Name(name) => f.write_str(name),
            LocationKey::Coordinates { .. } => {
                let (lat, lng) = self.lat_lng().unwrap_or_default();
                write!(f, "{lat:.6},{lng:.6}")
            }
        }
    }
}

/// A point of interest that needs weather coverage.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub key: LocationKey,
    pub city: Option<String>,
}

impl Location {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self { key: LocationKey::Name(name.clone()), city: Some(name) }
    }

    pub fn at(lat: f64, lng: f64) -> Self {
        Self { key: LocationKey::coordinates(lat, lng), city: None }
    }

    /// A named place, keyed by coordinates when both are known.
    pub fn resolve(name: impl Into<String>, lat: Option<f64>, lng: Option<f64>) -> Self {
        match (lat, lng) {
            (Some(lat), Some(lng)) => Location::at(lat, lng).with_city(name),
            _ => Location::named(name),
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    /// Human-readable label: the city if known, otherwise the key.
    pub fn label(&self) -> String {
        self.city.clone().unwrap_or_else(|| self.key.to_string())
    }
}

/// One dated slot of a gateway forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSlot {
    pub timestamp: DateTime<Utc>,
    pub temp: f64,
    pub description: String,
}

/// Forecast returned by a gateway, slots in chronological order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastPayload {
    pub city: Option<String>,
    pub slots: Vec<ForecastSlot>,
}

/// A stored forecast slot for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    #[serde(skip)]
    pub location: Option<LocationKey>,
    pub city: Option<String>,
    pub temp: f64,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl WeatherObservation {
    pub fn from_slot(location: &Location, city: Option<&str>, slot: &ForecastSlot) -> Self {
        Self {
            location: Some(location.key.clone()),
            city: city.map(str::to_owned).or_else(|| location.city.clone()),
            temp: slot.temp,
            description: slot.description.clone(),
            timestamp: slot.timestamp,
        }
    }
}

/// Per-location report of one refresh attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshOutcome {
    pub location: String,
    pub success: bool,
    pub stored: usize,
    pub completed_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl RefreshOutcome {
    pub fn succeeded(location: &Location, stored: usize) -> Self {
        Self {
            location: location.label(),
            success: true,
            stored,
            completed_at: Utc::now(),
            error: None,
        }
    }

    pub fn failed(location: &Location, error: impl fmt::Display) -> Self {
        Self {
            location: location.label(),
            success: false,
            stored: 0,
            completed_at: Utc::now(),
            error: Some(error.to_string()),
        }
    }

    /// A tick that could not read its locations at all.
    pub fn registry_failed(error: impl fmt::Display) -> Self {
        Self {
            location: "location registry".to_string(),
            success: false,
            stored: 0,
            completed_at: Utc::now(),
            error: Some(error.to_string()),
        }
    }

    /// One-line summary used by notification sinks.
    pub fn summary(&self) -> String {
        match &self.error {
            None => format!(
                "{} weather data fetched at {} ({} slots)",
                self.location,
                self.completed_at.to_rfc3339(),
                self.stored
            ),
            Some(err) => format!(
                "{} weather refresh failed at {}: {}",
                self.location,
                self.completed_at.to_rfc3339(),
                err
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: Option<String>,
    pub name: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub joined_at: DateTime<Utc>,
}

impl User {
    /// Location implied by the user's last known coordinates.
    pub fn location(&self) -> Option<Location> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Location::at(lat, lng)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub username: Option<String>,
    pub name: String,
    pub token: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Weekly slot of a course. `start` and `end` are minutes from midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSlot {
    pub day: u8,
    pub start: u16,
    pub end: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub user_id: i64,
    pub name: String,
    pub semester: Option<u8>,
    pub professor: Option<String>,
    pub grade: Option<f64>,
    #[serde(default)]
    pub schedule: Vec<CourseSlot>,
}

/// A faculty, unique by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faculty {
    pub name: String,
    pub dean: Option<String>,
    pub city: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn coordinate_keys_compare_after_rounding() {
        let a = LocationKey::coordinates(39.6243, 19.9217);
        let b = LocationKey::coordinates(39.624_300_000_1, 19.921_700_000_2);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn key_display_is_stable() {
        assert_eq!(LocationKey::name("Corfu").to_string(), "Corfu");
        assert_eq!(
            LocationKey::coordinates(39.6243, 19.9217).to_string(),
            "39.624300,19.921700"
        );
    }

    #[test]
    fn name_and_coordinates_never_collide() {
        let by_name = LocationKey::name("39.624300,19.921700");
        let by_coords = LocationKey::coordinates(39.6243, 19.9217);
        assert_ne!(by_name, by_coords);
    }

    #[test]
    fn failed_outcome_summary_mentions_location_and_error() {
        let outcome = RefreshOutcome::failed(&Location::named("Thessaloniki"), "timed out");
        let summary = outcome.summary();
        assert!(!outcome.success);
        assert!(summary.starts_with("Thessaloniki weather refresh failed"));
        assert!(summary.ends_with("timed out"));
    }

    #[test]
    fn user_without_coordinates_has_no_location() {
        let user = User {
            id: 1,
            email: "test@mocha.com".into(),
            username: None,
            name: String::new(),
            token: "t".into(),
            lat: Some(39.6),
            lng: None,
            joined_at: Utc::now(),
        };
        assert!(user.location().is_none());
    }
}
