use crate::{
    Config,
    error::GatewayError,
    model::{ForecastPayload, ForecastSlot, Location, LocationKey},
    provider::{openweather::OpenWeatherProvider, weatherapi::WeatherApiProvider},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::{convert::TryFrom, fmt::Debug, sync::Arc, time::Duration};

pub mod openweather;
pub mod weatherapi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeather,
    WeatherApi,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::WeatherApi => "weatherapi",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeather, ProviderId::WeatherApi]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweather" => Ok(ProviderId::OpenWeather),
            "weatherapi" => Ok(ProviderId::WeatherApi),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openweather, weatherapi."
            )),
        }
    }
}

/// Third-party weather service. Calls may be slow or fail; callers treat
/// every error as isolated to the requested location.
#[async_trait]
pub trait WeatherGateway: Send + Sync + Debug {
    /// Multi-slot forecast for a location, slots in chronological order.
    async fn fetch_forecast(&self, location: &Location) -> Result<ForecastPayload, GatewayError>;

    /// Current conditions, stamped with the observation time.
    async fn fetch_current(&self, location: &Location) -> Result<ForecastSlot, GatewayError>;
}

/// Settings shared by every provider.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub api_key: String,
    pub api_url: Option<String>,
    pub units: String,
    pub timeout: Duration,
}

impl GatewaySettings {
    pub(crate) fn http_client(&self) -> Result<Client, GatewayError> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("failed to build HTTP client: {e}")))
    }
}

/// Construct a provider from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
) -> anyhow::Result<Arc<dyn WeatherGateway>> {
    let api_key = config.provider_api_key(id).ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured for provider '{id}'.\n\
                 Hint: run `unilife configure {id}` and enter your API key."
        )
    })?;

    let settings = GatewaySettings {
        api_key: api_key.to_owned(),
        api_url: config.gateway.api_url.clone(),
        units: config.gateway.units.clone(),
        timeout: Duration::from_millis(config.gateway.timeout_ms),
    };

    let provider: Arc<dyn WeatherGateway> = match id {
        ProviderId::OpenWeather => Arc::new(OpenWeatherProvider::new(settings)?),
        ProviderId::WeatherApi => Arc::new(WeatherApiProvider::new(settings)?),
    };

    Ok(provider)
}

/// Construct the default provider from config, using `default_provider` field.
pub fn default_provider_from_config(config: &Config) -> anyhow::Result<Arc<dyn WeatherGateway>> {
    let id = config.default_provider_id()?;
    provider_from_config(id, config)
}

/// Query value identifying a location: the name, or `"lat,lng"`.
pub(crate) fn location_query(key: &LocationKey) -> String {
    match key.lat_lng() {
        Some((lat, lng)) => format!("{lat},{lng}"),
        None => key.to_string(),
    }
}

pub(crate) fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn provider_id_as_str_roundtrip() {
        for id in ProviderId::all() {
            let parsed = ProviderId::try_from(id.as_str()).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
    }

    #[test]
    fn unknown_provider_error() {
        let err = ProviderId::try_from("doesnotexist").unwrap_err();
        assert!(err.to_string().contains("Unknown provider"));
    }

    #[test]
    fn provider_from_config_errors_when_missing_api_key() {
        let cfg = Config::default();
        let err = provider_from_config(ProviderId::OpenWeather, &cfg).unwrap_err();
        assert!(err.to_string().contains("No API key configured for provider"));
    }

    #[test]
    fn default_provider_from_config_works_when_set_and_configured() {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "KEY".to_string());

        assert!(default_provider_from_config(&cfg).is_ok());
    }

    #[test]
    fn location_query_uses_name_or_coordinates() {
        assert_eq!(location_query(&LocationKey::name("Corfu")), "Corfu");
        assert_eq!(
            location_query(&LocationKey::coordinates(39.6243, 19.9217)),
            "39.6243,19.9217"
        );
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let long = "é".repeat(300);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 203);
        assert_eq!(truncate_body("short"), "short");
    }
}
