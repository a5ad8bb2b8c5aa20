use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    error::GatewayError,
    model::{ForecastPayload, ForecastSlot, Location},
};

use super::{GatewaySettings, WeatherGateway, location_query, truncate_body, unix_to_utc};

const DEFAULT_API_URL: &str = "http://api.weatherapi.com/v1";

/// Days of hourly forecast requested; enough to fill any short window.
const FORECAST_DAYS: &str = "3";

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    settings: GatewaySettings,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(settings: GatewaySettings) -> Result<Self, GatewayError> {
        let http = settings.http_client()?;
        Ok(Self { settings, http })
    }

    fn imperial(&self) -> bool {
        self.settings.units.eq_ignore_ascii_case("imperial")
    }

    async fn get(
        &self,
        endpoint: &str,
        location: &Location,
        extra: &[(&str, &str)],
    ) -> Result<String, GatewayError> {
        let base = self.settings.api_url.as_deref().unwrap_or(DEFAULT_API_URL);
        let url = format!("{}/{}", base.trim_end_matches('/'), endpoint);
        let q = location_query(&location.key);

        let res = self
            .http
            .get(url)
            .query(&[("key", self.settings.api_key.as_str()), ("q", q.as_str())])
            .query(extra)
            .send()
            .await
            .map_err(|e| {
                GatewayError::Unavailable(format!("WeatherAPI {endpoint} request failed: {e}"))
            })?;

        let status = res.status();
        let body = res.text().await.map_err(|e| {
            GatewayError::Unavailable(format!("Failed to read WeatherAPI {endpoint} body: {e}"))
        })?;

        if !status.is_success() {
            return Err(GatewayError::Unavailable(format!(
                "WeatherAPI {endpoint} request failed with status {status}: {}",
                truncate_body(&body),
            )));
        }

        Ok(body)
    }
}

#[derive(Debug, Deserialize)]
struct WaLocation {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: String,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    temp_f: f64,
    condition: WaCondition,
    last_updated_epoch: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    current: WaCurrent,
}

#[derive(Debug, Deserialize)]
struct WaForecastHour {
    time_epoch: i64,
    temp_c: f64,
    temp_f: f64,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaForecastDay {
    hour: Vec<WaForecastHour>,
}

#[derive(Debug, Deserialize)]
struct WaForecast {
    forecastday: Vec<WaForecastDay>,
}

#[derive(Debug, Deserialize)]
struct WaForecastResponse {
    location: WaLocation,
    forecast: WaForecast,
}

/// Decode a `forecast.json` body into hourly slots, dropping hours that
/// ended before `now`.
pub(crate) fn parse_forecast(
    body: &str,
    imperial: bool,
    now: DateTime<Utc>,
) -> Result<ForecastPayload, GatewayError> {
    let parsed: WaForecastResponse = serde_json::from_str(body)
        .map_err(|e| GatewayError::Malformed(format!("WeatherAPI forecast JSON: {e}")))?;

    let cutoff = now - Duration::hours(1);
    let mut slots = Vec::new();

    for hour in parsed.forecast.forecastday.iter().flat_map(|day| day.hour.iter()) {
        let timestamp = unix_to_utc(hour.time_epoch).ok_or_else(|| {
            GatewayError::Malformed(format!("invalid slot timestamp {}", hour.time_epoch))
        })?;
        if timestamp <= cutoff {
            continue;
        }
        slots.push(ForecastSlot {
            timestamp,
            temp: if imperial { hour.temp_f } else { hour.temp_c },
            description: hour.condition.text.clone(),
        });
    }
    slots.sort_by_key(|slot| slot.timestamp);

    Ok(ForecastPayload { city: Some(parsed.location.name), slots })
}

/// Decode a `current.json` body.
pub(crate) fn parse_current(body: &str, imperial: bool) -> Result<ForecastSlot, GatewayError> {
    let parsed: WaResponse = serde_json::from_str(body)
        .map_err(|e| GatewayError::Malformed(format!("WeatherAPI current JSON: {e}")))?;

    let timestamp = parsed
        .current
        .last_updated_epoch
        .and_then(unix_to_utc)
        .unwrap_or_else(Utc::now);

    Ok(ForecastSlot {
        timestamp,
        temp: if imperial { parsed.current.temp_f } else { parsed.current.temp_c },
        description: parsed.current.condition.text,
    })
}

#[async_trait]
impl WeatherGateway for WeatherApiProvider {
    async fn fetch_forecast(&self, location: &Location) -> Result<ForecastPayload, GatewayError> {
        let body = self.get("forecast.json", location, &[("days", FORECAST_DAYS)]).await?;
        parse_forecast(&body, self.imperial(), Utc::now())
    }

    async fn fetch_current(&self, location: &Location) -> Result<ForecastSlot, GatewayError> {
        let body = self.get("current.json", location, &[]).await?;
        parse_current(&body, self.imperial())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours(start: i64, count: usize) -> String {
        (0..count)
            .map(|i| {
                format!(
                    r#"{{"time_epoch": {}, "temp_c": {}.0, "temp_f": 50.0, "condition": {{"text": "Sunny"}}}}"#,
                    start + i as i64 * 3600,
                    i
                )
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    #[test]
    fn flattens_days_and_drops_past_hours() {
        let day = 1_700_000_000;
        let body = format!(
            r#"{{"location": {{"name": "Thessaloniki", "country": "Greece"}},
                "forecast": {{"forecastday": [{{"hour": [{}]}}, {{"hour": [{}]}}]}}}}"#,
            hours(day, 24),
            hours(day + 86_400, 24)
        );
        let now = unix_to_utc(day + 10 * 3600 + 1800).unwrap();

        let payload = parse_forecast(&body, false, now).unwrap();

        assert_eq!(payload.city.as_deref(), Some("Thessaloniki"));
        // hour 10 is still running, hours 0..=9 are gone
        assert_eq!(payload.slots.len(), 48 - 10);
        assert_eq!(payload.slots[0].timestamp.timestamp(), day + 10 * 3600);
        assert_eq!(payload.slots[0].temp, 10.0);
    }

    #[test]
    fn imperial_units_use_fahrenheit() {
        let body = format!(
            r#"{{"location": {{"name": "Corfu"}}, "forecast": {{"forecastday": [{{"hour": [{}]}}]}}}}"#,
            hours(1_700_000_000, 2)
        );
        let now = unix_to_utc(1_700_000_000).unwrap();
        let payload = parse_forecast(&body, true, now).unwrap();
        assert!(payload.slots.iter().all(|s| s.temp == 50.0));
    }

    #[test]
    fn error_body_is_malformed() {
        let err = parse_forecast(
            r#"{"error": {"code": 1006, "message": "No matching location found."}}"#,
            false,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::Malformed(_)));
    }

    #[test]
    fn parses_current_conditions() {
        let body = r#"{"location": {"name": "Corfu"}, "current": {"temp_c": 21.0, "temp_f": 69.8,
            "condition": {"text": "Partly cloudy"}, "last_updated_epoch": 1700000000}}"#;
        let slot = parse_current(body, false).unwrap();
        assert_eq!(slot.temp, 21.0);
        assert_eq!(slot.description, "Partly cloudy");
        assert_eq!(slot.timestamp.timestamp(), 1_700_000_000);
    }
}
