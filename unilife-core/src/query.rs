//! Read side: weather "now", users and courses, behind bearer tokens.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::{Arc, LazyLock};

use crate::error::ApiError;
use crate::model::{Course, Faculty, Location, NewUser, User, WeatherObservation};
use crate::provider::WeatherGateway;
use crate::store::{SqliteStore, WeatherStore};

/// Stored slots considered when answering "weather now". After a refresh the
/// earliest two slots bracket the current time.
const NOW_CANDIDATES: usize = 2;

/// Stored weather further than one forecast slot from `now` is stale and is
/// replaced by an on-demand fetch.
const MAX_STALENESS_SECS: i64 = 3 * 3600;

/// A user is relocated once they move this many degrees on either axis.
const RELOCATE_THRESHOLD_DEG: f64 = 0.04;

/// The candidate closest to `now`. Equidistant candidates resolve to the
/// earlier timestamp.
pub fn closest_to_now(
    candidates: &[WeatherObservation],
    now: DateTime<Utc>,
) -> Option<&WeatherObservation> {
    candidates
        .iter()
        .min_by_key(|obs| ((obs.timestamp - now).num_seconds().abs(), obs.timestamp))
}

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(([^<>()\[\]\\.,;:\s@"]+(\.[^<>()\[\]\\.,;:\s@"]+)*)|(".+"))@((\[[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\])|(([a-zA-Z\-0-9]+\.)+[a-zA-Z]{2,}))$"#,
    )
    .expect("email pattern compiles")
});

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(&email.to_lowercase())
}

/// Longer than 8 characters with at least one digit.
pub fn is_valid_password(password: &str) -> bool {
    password.chars().count() > 8 && password.chars().any(|c| c.is_ascii_digit())
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub struct QueryService {
    store: Arc<SqliteStore>,
    gateway: Arc<dyn WeatherGateway>,
}

impl QueryService {
    pub fn new(store: Arc<SqliteStore>, gateway: Arc<dyn WeatherGateway>) -> Self {
        Self { store, gateway }
    }

    /// Resolve the user behind an `Authorization` header.
    pub fn authorize(&self, header: Option<&str>) -> Result<User, ApiError> {
        let token = bearer_token(header).ok_or(ApiError::NoAuth)?;
        self.store.find_user_by_token(token)?.ok_or(ApiError::NoAuth)
    }

    /// Weather for `location` closest to `now`.
    ///
    /// Served from the stored window when a slot lies within one slot spacing
    /// of `now`. Otherwise the gateway is asked for current conditions, which
    /// replace whatever was stored for the location and are returned.
    pub async fn current_weather(
        &self,
        location: &Location,
        now: DateTime<Utc>,
    ) -> Result<WeatherObservation, ApiError> {
        let candidates = self.store.find_recent_for(&location.key, NOW_CANDIDATES)?;
        match closest_to_now(&candidates, now) {
            Some(obs) if (obs.timestamp - now).num_seconds().abs() <= MAX_STALENESS_SECS => {
                return Ok(obs.clone());
            }
            Some(obs) => log::info!(
                "[Query] stored weather for {} is stale (slot {}), fetching on demand",
                location.label(),
                obs.timestamp.to_rfc3339()
            ),
            None => {
                log::info!("[Query] no stored weather for {}, fetching on demand", location.label())
            }
        }

        let slot = self.gateway.fetch_current(location).await.map_err(|e| {
            log::warn!("[Query] on-demand fetch failed for {}: {}", location.label(), e);
            ApiError::NoWeather(location.label())
        })?;

        let mut observation = WeatherObservation::from_slot(location, None, &slot);
        observation.timestamp = now;
        if !candidates.is_empty() {
            self.store.delete_all_for(&location.key)?;
        }
        self.store.insert_batch(&location.key, std::slice::from_ref(&observation))?;
        Ok(observation)
    }

    /// Create a user from an email and password. The password is checked
    /// but not stored; the new user holds no token until one is issued.
    pub fn register(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(ApiError::InvalidEmail);
        }
        if !is_valid_password(password) {
            return Err(ApiError::InvalidPassword);
        }
        if self.store.find_user_by_email(email)?.is_some() {
            return Err(ApiError::DuplicateEmail);
        }

        let id = self.store.insert_user(&NewUser {
            email: email.to_string(),
            username: None,
            name: String::new(),
            token: String::new(),
            lat: None,
            lng: None,
        })?;
        log::info!("[Query] registered user {} ({})", id, email);
        self.store.find_user(id)?.ok_or(ApiError::UserDoesNotExist)
    }

    pub fn faculties(&self) -> Result<Vec<Faculty>, ApiError> {
        Ok(self.store.list_faculties()?)
    }

    pub fn users(&self) -> Result<Vec<User>, ApiError> {
        Ok(self.store.list_users()?)
    }

    pub fn courses(&self, user_id: i64) -> Result<Vec<Course>, ApiError> {
        if self.store.find_user(user_id)?.is_none() {
            return Err(ApiError::UserDoesNotExist);
        }
        Ok(self.store.courses_for_user(user_id)?)
    }

    /// Store the user's coordinates if unknown or if they moved significantly.
    /// Returns the user as stored afterwards.
    pub fn relocate(&self, user: &User, lat: f64, lng: f64) -> Result<User, ApiError> {
        let moved = match (user.lat, user.lng) {
            (Some(old_lat), Some(old_lng)) => {
                (old_lat - lat).abs() >= RELOCATE_THRESHOLD_DEG
                    || (old_lng - lng).abs() >= RELOCATE_THRESHOLD_DEG
            }
            _ => true,
        };

        if !moved {
            return Ok(user.clone());
        }

        self.store.update_user_location(user.id, lat, lng)?;
        self.store.find_user(user.id)?.ok_or(ApiError::UserDoesNotExist)
    }
}
