//! Error types shared across the crate.

use thiserror::Error;

/// Failures talking to a third-party weather service.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("weather gateway unavailable: {0}")]
    Unavailable(String),
    #[error("malformed weather payload: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Unavailable(err.to_string())
    }
}

/// Failures of the SQLite document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Why a single location could not be refreshed. All variants are
/// recovered by the next tick.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("store write failed: {0}")]
    StoreWriteFailure(#[from] StoreError),
}

impl From<GatewayError> for RefreshError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable(msg) => RefreshError::GatewayUnavailable(msg),
            GatewayError::Malformed(msg) => RefreshError::MalformedPayload(msg),
        }
    }
}

/// Errors surfaced to API clients. Each maps to a stable key and status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("You are not authorized to make this call")]
    NoAuth,
    #[error("The email address is not valid")]
    InvalidEmail,
    #[error("Password must be longer than 8 characters and contain a number")]
    InvalidPassword,
    #[error("This email is already in use")]
    DuplicateEmail,
    #[error("We did not find a user matching the credentials")]
    UserDoesNotExist,
    #[error("A location needs either a city or both lat and lng")]
    InvalidLocation,
    #[error("No weather data is available for this location: {0}")]
    NoWeather(String),
    #[error("Something went terribly wrong. We are working on it")]
    Unknown(#[from] StoreError),
}

impl ApiError {
    pub fn key(&self) -> &'static str {
        match self {
            ApiError::NoAuth => "NO_AUTH",
            ApiError::InvalidEmail => "INVALID_EMAIL",
            ApiError::InvalidPassword => "INVALID_PASSWORD",
            ApiError::DuplicateEmail => "DUPLICATE_EMAIL",
            ApiError::UserDoesNotExist => "USER_DOES_NOT_EXIST",
            ApiError::InvalidLocation => "INVALID_LOCATION",
            ApiError::NoWeather(_) => "NO_WEATHER",
            ApiError::Unknown(_) => "UKNOWN",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NoAuth => 401,
            ApiError::InvalidEmail | ApiError::InvalidPassword => 422,
            ApiError::DuplicateEmail => 409,
            ApiError::UserDoesNotExist => 404,
            ApiError::InvalidLocation => 422,
            ApiError::NoWeather(_) => 503,
            ApiError::Unknown(_) => 500,
        }
    }
}
