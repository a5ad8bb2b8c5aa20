use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::model::Location;
use crate::provider::ProviderId;

/// Configuration for a single provider (e.g., API key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
}

/// How the weather gateway is called.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Override of the provider's base URL.
    pub api_url: Option<String>,
    pub units: String,
    pub timeout_ms: u64,
    /// Number of forecast slots kept per location and refresh.
    pub window: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { api_url: None, units: "metric".to_string(), timeout_ms: 1000, window: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 5- or 6-field cron expression.
    pub cron: String,
    /// Run one tick as soon as the scheduler starts.
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { cron: "0 */3 * * *".to_string(), run_on_start: false }
    }
}

/// A configured point of interest. With coordinates the gateway is queried
/// by lat/lng, otherwise by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    pub name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl LocationConfig {
    pub fn to_location(&self) -> Location {
        Location::resolve(self.name.clone(), self.lat, self.lng)
    }
}

impl Default for LocationConfig {
    /// Corfu centre.
    fn default() -> Self {
        Self { name: "Corfu".to_string(), lat: Some(39.6243), lng: Some(19.9217) }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Discord-compatible webhook receiving `{ "content": ... }` posts.
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:4000".to_string() }
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Optional default provider id, e.g. "openweather" or "weatherapi".
    pub default_provider: Option<String>,

    /// Example TOML:
    /// [providers.openweather]
    /// api_key = "..."
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Used when no location is registered anywhere.
    #[serde(default)]
    pub default_location: LocationConfig,

    /// Explicit registry. When empty the store's registry is used instead.
    #[serde(default)]
    pub locations: Vec<LocationConfig>,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Return the default provider as a strongly-typed ProviderId.
    pub fn default_provider_id(&self) -> Result<ProviderId> {
        let s = self.default_provider.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "No default provider configured.\n\
                 Hint: run `unilife configure <provider>` (e.g. `unilife configure openweather`) first."
            )
        })?;

        ProviderId::try_from(s.as_str())
    }

    /// Store default provider as string.
    pub fn set_default_provider(&mut self, id: ProviderId) {
        self.default_provider = Some(id.as_str().to_string());
    }

    /// Load config from the platform location, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    /// Load config from an explicit path, or return defaults if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Path of the SQLite database, defaulting to the platform data dir.
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store.path {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.data_dir().join("unilife.db")),
        }
    }

    /// Set/replace a provider API key and make it the default if none is set.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers.insert(provider_id.as_str().to_string(), ProviderConfig { api_key });

        if self.default_provider.is_none() {
            self.default_provider = Some(provider_id.to_string());
        }
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers.get(provider_id.as_str()).map(|cfg| cfg.api_key.as_str())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        self.provider_api_key(provider_id).is_some()
    }

    pub fn configured_locations(&self) -> Vec<Location> {
        self.locations.iter().map(LocationConfig::to_location).collect()
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "unilife", "unilife")
        .ok_or_else(|| anyhow!("Could not determine platform config directory"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LocationKey;
    use crate::provider::ProviderId;

    #[test]
    fn default_provider_id_errors_when_not_set() {
        let cfg = Config::default();
        let err = cfg.default_provider_id().unwrap_err();

        assert!(err.to_string().contains("No default provider configured"));
    }

    #[test]
    fn upsert_does_not_override_existing_default() {
        let mut cfg = Config::default();

        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "OPEN_KEY".into());
        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "WEATHER_KEY".into());

        let default = cfg.default_provider_id().expect("default provider must exist");

        assert_eq!(default, ProviderId::OpenWeather);
        assert!(cfg.is_provider_configured(ProviderId::WeatherApi));

        cfg.set_default_provider(ProviderId::WeatherApi);
        assert_eq!(cfg.default_provider_id().unwrap(), ProviderId::WeatherApi);
    }

    #[test]
    fn sections_fall_back_to_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            default_provider = "openweather"

            [providers.openweather]
            api_key = "KEY"

            [scheduler]
            run_on_start = true
            "#,
        )
        .unwrap();

        assert_eq!(cfg.scheduler.cron, "0 */3 * * *");
        assert!(cfg.scheduler.run_on_start);
        assert_eq!(cfg.gateway.window, 8);
        assert_eq!(cfg.gateway.timeout_ms, 1000);
        assert_eq!(cfg.gateway.units, "metric");
        assert_eq!(cfg.server.bind, "0.0.0.0:4000");
        assert_eq!(cfg.default_location.name, "Corfu");
        assert!(cfg.locations.is_empty());
    }

    #[test]
    fn locations_with_coordinates_use_coordinate_keys() {
        let cfg: Config = toml::from_str(
            r#"
            [[locations]]
            name = "Corfu"
            lat = 39.6243
            lng = 19.9217

            [[locations]]
            name = "Thessaloniki"
            "#,
        )
        .unwrap();

        let locations = cfg.configured_locations();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].key, LocationKey::coordinates(39.6243, 19.9217));
        assert_eq!(locations[0].city.as_deref(), Some("Corfu"));
        assert_eq!(locations[1].key, LocationKey::name("Thessaloniki"));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let path = std::env::temp_dir().join("unilife-config-does-not-exist.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert!(cfg.default_provider.is_none());
    }

    #[test]
    fn save_then_load_keeps_api_keys() {
        let path = std::env::temp_dir()
            .join(format!("unilife-config-{}", std::process::id()))
            .join("config.toml");

        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "OPEN_KEY".into());
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.provider_api_key(ProviderId::OpenWeather), Some("OPEN_KEY"));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
