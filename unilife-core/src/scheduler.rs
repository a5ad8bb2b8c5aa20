//! Cron-driven weather refresh.
//!
//! Every tick re-reads the location registry and refreshes each distinct
//! location at most once: evict its stored observations, fetch a forecast,
//! keep the first `window` slots and report the outcome. Failures stay
//! isolated to their location; the next tick is the retry.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{RefreshError, StoreError};
use crate::model::{Location, LocationKey, RefreshOutcome, WeatherObservation};
use crate::provider::WeatherGateway;
use crate::registry::LocationRegistry;
use crate::sink::OutcomeSink;
use crate::store::WeatherStore;

/// Errors from scheduler setup.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid cron expression: {0}")]
    CronParse(String),
}

/// Compute the next cron occurrence strictly after `after`.
///
/// The `cron` crate expects 6-field expressions (sec min hr dom month dow);
/// standard 5-field expressions get a `0` seconds field prepended.
pub fn next_run_after(
    cron_expr: &str,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, SchedulerError> {
    let expr = normalize_cron_expr(cron_expr);

    let schedule = cron::Schedule::from_str(&expr)
        .map_err(|e| SchedulerError::CronParse(format!("{}: {}", cron_expr, e)))?;

    schedule
        .after(&after)
        .next()
        .ok_or_else(|| SchedulerError::CronParse(format!("{}: no next occurrence", cron_expr)))
}

fn normalize_cron_expr(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Locations whose refresh was initiated during one tick.
#[derive(Debug)]
pub struct TickContext {
    started_at: DateTime<Utc>,
    served: HashSet<LocationKey>,
}

impl TickContext {
    pub fn new() -> Self {
        Self { started_at: Utc::now(), served: HashSet::new() }
    }

    /// Mark `key` served. Returns false if it already was during this tick.
    pub fn mark_served(&mut self, key: &LocationKey) -> bool {
        self.served.insert(key.clone())
    }

    pub fn is_served(&self, key: &LocationKey) -> bool {
        self.served.contains(key)
    }

    pub fn served_count(&self) -> usize {
        self.served.len()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

impl Default for TickContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub cron: String,
    pub run_on_start: bool,
    /// Forecast slots kept per location.
    pub window: usize,
    pub fetch_timeout: Duration,
    /// Refreshed when the registry has no locations at all.
    pub default_location: Location,
}

impl RefreshSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cron: config.scheduler.cron.clone(),
            run_on_start: config.scheduler.run_on_start,
            window: config.gateway.window,
            fetch_timeout: Duration::from_millis(config.gateway.timeout_ms),
            default_location: config.default_location.to_location(),
        }
    }
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct RefreshScheduler {
    registry: Arc<dyn LocationRegistry>,
    store: Arc<dyn WeatherStore>,
    gateway: Arc<dyn WeatherGateway>,
    sink: Arc<dyn OutcomeSink>,
    settings: RefreshSettings,
    // serializes ticks so the timer and manual triggers never overlap
    tick_lock: Mutex<()>,
}

impl RefreshScheduler {
    pub fn new(
        registry: Arc<dyn LocationRegistry>,
        store: Arc<dyn WeatherStore>,
        gateway: Arc<dyn WeatherGateway>,
        sink: Arc<dyn OutcomeSink>,
        settings: RefreshSettings,
    ) -> Result<Self, SchedulerError> {
        next_run_after(&settings.cron, Utc::now())?;
        Ok(Self { registry, store, gateway, sink, settings, tick_lock: Mutex::new(()) })
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    /// Run one refresh cycle over every known location.
    pub async fn tick(&self) -> Vec<RefreshOutcome> {
        let _running = self.tick_lock.lock().await;
        let mut ctx = TickContext::new();

        let locations = match self.locations_for_tick() {
            Ok(locations) => locations,
            Err(e) => {
                log::error!("[Scheduler] failed to read location registry: {}", e);
                let outcome = RefreshOutcome::registry_failed(&e);
                self.sink.report(&outcome).await;
                return vec![outcome];
            }
        };
        log::info!("[Scheduler] tick started: {} location(s)", locations.len());

        let mut outcomes = Vec::with_capacity(locations.len());
        for location in &locations {
            if let Some(outcome) = self.refresh_one(&mut ctx, location).await {
                outcomes.push(outcome);
            }
        }

        let failed = outcomes.iter().filter(|o| !o.success).count();
        log::info!(
            "[Scheduler] tick finished: {} refreshed, {} failed, {} skipped as duplicates",
            outcomes.len() - failed,
            failed,
            locations.len() - ctx.served_count()
        );
        outcomes
    }

    /// Refresh a single location unless it was already served in `ctx`.
    ///
    /// Returns `None` for a skipped duplicate, otherwise the outcome that was
    /// also sent to the sink.
    pub async fn refresh_one(
        &self,
        ctx: &mut TickContext,
        location: &Location,
    ) -> Option<RefreshOutcome> {
        if !ctx.mark_served(&location.key) {
            log::debug!("[Scheduler] {} already refreshed this tick", location.label());
            return None;
        }

        let outcome = match self.replace_observations(location).await {
            Ok(stored) => RefreshOutcome::succeeded(location, stored),
            Err(e) => {
                log::warn!("[Scheduler] refresh failed for {}: {}", location.label(), e);
                RefreshOutcome::failed(location, &e)
            }
        };

        self.sink.report(&outcome).await;
        Some(outcome)
    }

    fn locations_for_tick(&self) -> Result<Vec<Location>, StoreError> {
        let locations = self.registry.list_locations()?;
        if !locations.is_empty() {
            return Ok(locations);
        }

        log::info!(
            "[Scheduler] no registered locations, using default {}",
            self.settings.default_location.label()
        );
        Ok(vec![self.settings.default_location.clone()])
    }

    /// Evict, fetch, keep the window, persist. Eviction happens first so a
    /// failed refresh leaves no stale slots behind.
    async fn replace_observations(&self, location: &Location) -> Result<usize, RefreshError> {
        let evicted = self.store.delete_all_for(&location.key)?;
        log::debug!("[Scheduler] evicted {} observation(s) for {}", evicted, location.label());

        let timeout = self.settings.fetch_timeout;
        let payload = tokio::time::timeout(timeout, self.gateway.fetch_forecast(location))
            .await
            .map_err(|_| RefreshError::GatewayUnavailable(format!("timed out after {timeout:?}")))??;

        let window = self.settings.window;
        if payload.slots.len() < window {
            return Err(RefreshError::MalformedPayload(format!(
                "expected at least {} forecast slots, got {}",
                window,
                payload.slots.len()
            )));
        }

        let observations: Vec<WeatherObservation> = payload
            .slots
            .iter()
            .take(window)
            .map(|slot| WeatherObservation::from_slot(location, payload.city.as_deref(), slot))
            .collect();

        self.store.insert_batch(&location.key, &observations)?;
        Ok(observations.len())
    }

    /// Spawn the timer loop on the current tokio runtime.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown, shutdown_rx) = watch::channel(());
        let task = tokio::spawn(self.run(shutdown_rx));
        SchedulerHandle { shutdown, task }
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<()>) {
        log::info!("[Scheduler] starting weather refresh loop ({})", self.settings.cron);

        if self.settings.run_on_start {
            self.tick().await;
        }

        loop {
            let now = Utc::now();
            let next = match next_run_after(&self.settings.cron, now) {
                Ok(next) => next,
                Err(e) => {
                    log::error!("[Scheduler] {}", e);
                    break;
                }
            };
            let wait = (next - now).to_std().unwrap_or_default();
            log::debug!("[Scheduler] next tick at {}", next.to_rfc3339());

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    log::info!("[Scheduler] shutdown signal received, exiting");
                    break;
                }
            }
        }
    }
}

/// Owner's handle on a running scheduler loop.
pub struct SchedulerHandle {
    shutdown: watch::Sender<()>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop and wait for it to exit. A tick in progress finishes first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            log::error!("[Scheduler] refresh loop panicked: {}", e);
        }
    }
}
