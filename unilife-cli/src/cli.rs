use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};

use unilife_core::{
    Config, Location, LocationRegistry, LogSink, OutcomeSink, ProviderId, QueryService,
    RefreshScheduler, RefreshSettings, SqliteStore, StaticRegistry, WebhookSink,
    provider::default_provider_from_config,
};

use crate::{seed, server};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "unilife", version, about = "University-life backend: weather, courses and users")]
pub struct Cli {
    /// Path to the TOML config file. Defaults to the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "openweather" or "weatherapi".
        provider: String,
    },

    /// Run the HTTP API together with the weather refresh scheduler.
    Serve,

    /// Run a single refresh tick now and print the outcomes.
    Refresh,

    /// Show the weather closest to now for a city or a coordinate pair.
    Show {
        #[arg(long, conflicts_with_all = ["lat", "lng"])]
        city: Option<String>,

        #[arg(long, requires = "lng", allow_negative_numbers = true)]
        lat: Option<f64>,

        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lng: Option<f64>,
    },

    /// Purge the database and insert demo users, courses and locations.
    Seed,
}

/// Everything a running command needs, wired from the config.
pub struct Services {
    pub scheduler: Arc<RefreshScheduler>,
    pub query: Arc<QueryService>,
}

impl Services {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = Arc::new(open_store(config)?);
        let gateway = default_provider_from_config(config)?;

        let registry: Arc<dyn LocationRegistry> = if config.locations.is_empty() {
            store.clone()
        } else {
            Arc::new(StaticRegistry::new(config.configured_locations()))
        };

        let sink: Arc<dyn OutcomeSink> = match &config.notify.webhook_url {
            Some(url) => Arc::new(
                WebhookSink::new(url.clone()).context("Failed to build webhook client")?,
            ),
            None => Arc::new(LogSink),
        };

        let scheduler = RefreshScheduler::new(
            registry,
            store.clone(),
            gateway.clone(),
            sink,
            RefreshSettings::from_config(config),
        )?;

        let query = QueryService::new(store, gateway);

        Ok(Self { scheduler: Arc::new(scheduler), query: Arc::new(query) })
    }
}

fn open_store(config: &Config) -> anyhow::Result<SqliteStore> {
    let path = config.store_path()?;
    SqliteStore::open(&path)
        .with_context(|| format!("Failed to open database: {}", path.display()))
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config_path = match &self.config {
            Some(path) => path.clone(),
            None => Config::config_file_path()?,
        };
        let config = Config::load_from(&config_path)?;

        match self.command {
            Command::Configure { provider } => configure(config, &config_path, &provider),
            Command::Serve => serve(&config).await,
            Command::Refresh => refresh(&config).await,
            Command::Show { city, lat, lng } => show(&config, city, lat, lng).await,
            Command::Seed => {
                let store = open_store(&config)?;
                let summary = seed::seed(&store)?;
                println!("{summary}");
                Ok(())
            }
        }
    }
}

fn configure(mut config: Config, path: &std::path::Path, provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;

    let api_key = inquire::Password::new(&format!("API key for {id}:"))
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    config.upsert_provider_api_key(id, api_key.trim().to_string());
    config.save_to(path)?;

    println!("Saved {id} credentials to {}", path.display());
    Ok(())
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let services = Services::from_config(config)?;
    let handle = services.scheduler.clone().start();

    let state = server::AppState { query: services.query, scheduler: services.scheduler };
    let result = server::run_http_server(&config.server.bind, state).await;

    handle.stop().await;
    result
}

async fn refresh(config: &Config) -> anyhow::Result<()> {
    let services = Services::from_config(config)?;

    let outcomes = services.scheduler.tick().await;
    for outcome in &outcomes {
        let mark = if outcome.success { "ok  " } else { "FAIL" };
        println!("{mark} {}", outcome.summary());
    }

    if outcomes.iter().any(|o| !o.success) {
        bail!("{} location(s) failed to refresh", outcomes.iter().filter(|o| !o.success).count());
    }
    Ok(())
}

fn location_from_args(
    city: Option<String>,
    lat: Option<f64>,
    lng: Option<f64>,
) -> anyhow::Result<Location> {
    match (city, lat, lng) {
        (Some(city), _, _) => Ok(Location::named(city)),
        (None, Some(lat), Some(lng)) => Ok(Location::at(lat, lng)),
        _ => bail!("Pass either --city <name> or both --lat and --lng"),
    }
}

async fn show(
    config: &Config,
    city: Option<String>,
    lat: Option<f64>,
    lng: Option<f64>,
) -> anyhow::Result<()> {
    let location = location_from_args(city, lat, lng)?;
    let services = Services::from_config(config)?;

    let weather = services.query.current_weather(&location, Utc::now()).await?;

    println!(
        "{}: {:.1}°, {} ({})",
        weather.city.clone().unwrap_or_else(|| location.label()),
        weather.temp,
        weather.description,
        weather.timestamp.format("%Y-%m-%d %H:%M UTC"),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_accepts_negative_coordinates() {
        let cli = Cli::try_parse_from(["unilife", "show", "--lat", "40.4", "--lng", "-3.7"]).unwrap();
        match cli.command {
            Command::Show { city, lat, lng } => {
                assert!(city.is_none());
                assert_eq!(lat, Some(40.4));
                assert_eq!(lng, Some(-3.7));
            }
            other => panic!("expected show, got {other:?}"),
        }
    }

    #[test]
    fn show_rejects_city_with_coordinates() {
        let err = Cli::try_parse_from(["unilife", "show", "--city", "Corfu", "--lat", "1", "--lng", "2"]);
        assert!(err.is_err());
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["unilife", "refresh", "--config", "/tmp/u.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/u.toml")));
    }

    #[test]
    fn location_arguments_resolve_to_keys() {
        let by_city = location_from_args(Some("Corfu".into()), None, None).unwrap();
        assert_eq!(by_city, Location::named("Corfu"));

        let by_coords = location_from_args(None, Some(39.6243), Some(19.9217)).unwrap();
        assert_eq!(by_coords, Location::at(39.6243, 19.9217));

        assert!(location_from_args(None, Some(1.0), None).is_err());
    }

    #[test]
    fn services_need_a_configured_provider() {
        let mut config = Config::default();
        config.store.path = Some(std::env::temp_dir().join(format!("unilife-cli-{}.db", std::process::id())));

        let err = Services::from_config(&config).err().expect("no provider configured");
        assert!(err.to_string().contains("No default provider configured"));

        config.upsert_provider_api_key(ProviderId::OpenWeather, "KEY".into());
        assert!(Services::from_config(&config).is_ok());

        let _ = std::fs::remove_file(config.store.path.unwrap());
    }
}
