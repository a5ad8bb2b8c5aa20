use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    error::GatewayError,
    model::{ForecastPayload, ForecastSlot, Location},
};

use super::{GatewaySettings, WeatherGateway, truncate_body, unix_to_utc};

const DEFAULT_API_URL: &str = "https://api.openweathermap.org/data/2.5";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    settings: GatewaySettings,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(settings: GatewaySettings) -> Result<Self, GatewayError> {
        let http = settings.http_client()?;
        Ok(Self { settings, http })
    }

    fn url(&self, endpoint: &str) -> String {
        let base = self.settings.api_url.as_deref().unwrap_or(DEFAULT_API_URL);
        format!("{}/{}", base.trim_end_matches('/'), endpoint)
    }

    fn query(&self, location: &Location) -> Vec<(&'static str, String)> {
        let mut query = match location.key.lat_lng() {
            Some((lat, lng)) => vec![("lat", lat.to_string()), ("lon", lng.to_string())],
            None => vec![("q", location.key.to_string())],
        };
        query.push(("units", self.settings.units.clone()));
        query.push(("appid", self.settings.api_key.clone()));
        query
    }

    async fn get(&self, endpoint: &str, location: &Location) -> Result<String, GatewayError> {
        let res = self
            .http
            .get(self.url(endpoint))
            .query(&self.query(location))
            .send()
            .await
            .map_err(|e| {
                GatewayError::Unavailable(format!("OpenWeather {endpoint} request failed: {e}"))
            })?;

        let status = res.status();
        let body = res.text().await.map_err(|e| {
            GatewayError::Unavailable(format!("Failed to read OpenWeather {endpoint} body: {e}"))
        })?;

        if !status.is_success() {
            return Err(GatewayError::Unavailable(format!(
                "OpenWeather {endpoint} request failed with status {status}: {}",
                truncate_body(&body),
            )));
        }

        Ok(body)
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwCity {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    city: Option<OwCity>,
    list: Vec<OwForecastEntry>,
}

fn to_slot(dt: i64, main: &OwMain, weather: &[OwWeather]) -> Result<ForecastSlot, GatewayError> {
    let timestamp = unix_to_utc(dt)
        .ok_or_else(|| GatewayError::Malformed(format!("invalid slot timestamp {dt}")))?;

    let description = weather
        .first()
        .map(|w| w.description.clone())
        .unwrap_or_else(|| "Unknown".to_string());

    Ok(ForecastSlot { timestamp, temp: main.temp, description })
}

/// Decode a `/forecast` body (5 days at 3-hour spacing).
pub(crate) fn parse_forecast(body: &str) -> Result<ForecastPayload, GatewayError> {
    let parsed: OwForecastResponse = serde_json::from_str(body)
        .map_err(|e| GatewayError::Malformed(format!("OpenWeather forecast JSON: {e}")))?;

    let mut slots = parsed
        .list
        .iter()
        .map(|entry| to_slot(entry.dt, &entry.main, &entry.weather))
        .collect::<Result<Vec<_>, _>>()?;
    slots.sort_by_key(|slot| slot.timestamp);

    Ok(ForecastPayload { city: parsed.city.and_then(|c| c.name), slots })
}

/// Decode a `/weather` body.
pub(crate) fn parse_current(body: &str) -> Result<ForecastSlot, GatewayError> {
    let parsed: OwCurrentResponse = serde_json::from_str(body)
        .map_err(|e| GatewayError::Malformed(format!("OpenWeather current JSON: {e}")))?;

    let mut slot = to_slot(parsed.dt, &parsed.main, &parsed.weather)?;
    if parsed.dt == 0 {
        slot.timestamp = Utc::now();
    }
    Ok(slot)
}

#[async_trait]
impl WeatherGateway for OpenWeatherProvider {
    async fn fetch_forecast(&self, location: &Location) -> Result<ForecastPayload, GatewayError> {
        let body = self.get("forecast", location).await?;
        parse_forecast(&body)
    }

    async fn fetch_current(&self, location: &Location) -> Result<ForecastSlot, GatewayError> {
        let body = self.get("weather", location).await?;
        parse_current(&body)
    }
}
