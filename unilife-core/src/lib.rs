//! Core library for the `unilife` campus backend.
//!
//! This crate defines:
//! - Configuration handling
//! - Abstraction over third-party weather providers
//! - The SQLite document store and location registries
//! - The cron-driven weather refresh scheduler and its outcome sinks
//! - The read-side query service used by the HTTP API
//!
//! It is used by `unilife-cli`, but can also be reused by other binaries or services.

pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod query;
pub mod registry;
pub mod scheduler;
pub mod sink;
pub mod store;

pub use config::{Config, LocationConfig, ProviderConfig};
pub use error::{ApiError, GatewayError, RefreshError, StoreError};
pub use model::{
    Course, CourseSlot, Faculty, ForecastPayload, ForecastSlot, Location, LocationKey, NewUser,
    RefreshOutcome, User, WeatherObservation,
};
pub use provider::{ProviderId, WeatherGateway};
pub use query::QueryService;
pub use registry::{LocationRegistry, StaticRegistry};
pub use scheduler::{RefreshScheduler, RefreshSettings, SchedulerHandle, TickContext};
pub use sink::{LogSink, MemorySink, OutcomeSink, WebhookSink};
pub use store::{SqliteStore, WeatherStore};
