//! Fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use unilife_core::error::{GatewayError, StoreError};
use unilife_core::{
    ForecastPayload, ForecastSlot, Location, LocationKey, LocationRegistry, MemorySink,
    RefreshScheduler, RefreshSettings, SqliteStore, StaticRegistry, WeatherGateway,
    WeatherObservation, WeatherStore,
};

pub const BASE_TS: i64 = 1_700_000_000;
pub const SLOT_SPACING: i64 = 3 * 3600;

#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Respond with this many 3-hourly slots starting at `BASE_TS`.
    Slots(usize),
    Fail,
    Hang,
}

/// Scripted gateway counting calls per location.
#[derive(Debug, Default)]
pub struct FakeGateway {
    behaviours: Mutex<HashMap<LocationKey, Behaviour>>,
    calls: AtomicUsize,
    calls_by_key: Mutex<HashMap<LocationKey, usize>>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, key: LocationKey, behaviour: Behaviour) {
        self.behaviours.lock().unwrap().insert(key, behaviour);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, key: &LocationKey) -> usize {
        self.calls_by_key.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    fn record(&self, key: &LocationKey) -> Behaviour {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.calls_by_key.lock().unwrap().entry(key.clone()).or_default() += 1;
        self.behaviours.lock().unwrap().get(key).cloned().unwrap_or(Behaviour::Fail)
    }
}

pub fn slot_time(i: usize) -> DateTime<Utc> {
    DateTime::from_timestamp(BASE_TS + i as i64 * SLOT_SPACING, 0).unwrap()
}

pub fn slots(count: usize) -> Vec<ForecastSlot> {
    (0..count)
        .map(|i| ForecastSlot {
            timestamp: slot_time(i),
            temp: 10.0 + i as f64,
            description: format!("slot {i}"),
        })
        .collect()
}

#[async_trait]
impl WeatherGateway for FakeGateway {
    async fn fetch_forecast(&self, location: &Location) -> Result<ForecastPayload, GatewayError> {
        match self.record(&location.key) {
            Behaviour::Slots(count) => Ok(ForecastPayload { city: location.city.clone(), slots: slots(count) }),
            Behaviour::Fail => Err(GatewayError::Unavailable("503 Service Unavailable".into())),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(GatewayError::Unavailable("unreachable".into()))
            }
        }
    }

    async fn fetch_current(&self, location: &Location) -> Result<ForecastSlot, GatewayError> {
        match self.record(&location.key) {
            Behaviour::Slots(_) => Ok(ForecastSlot {
                timestamp: Utc::now(),
                temp: 21.5,
                description: "few clouds".into(),
            }),
            _ => Err(GatewayError::Unavailable("503 Service Unavailable".into())),
        }
    }
}

/// Store that evicts normally but refuses every insert.
pub struct FailingInsertStore(pub Arc<SqliteStore>);

impl WeatherStore for FailingInsertStore {
    fn delete_all_for(&self, key: &LocationKey) -> Result<usize, StoreError> {
        self.0.delete_all_for(key)
    }

    fn insert_batch(&self, _key: &LocationKey, _observations: &[WeatherObservation]) -> Result<(), StoreError> {
        Err(StoreError::Poisoned)
    }

    fn find_recent_for(&self, key: &LocationKey, limit: usize) -> Result<Vec<WeatherObservation>, StoreError> {
        self.0.find_recent_for(key, limit)
    }
}

/// Registry whose backing store cannot be read.
pub struct BrokenRegistry;

impl LocationRegistry for BrokenRegistry {
    fn list_locations(&self) -> Result<Vec<Location>, StoreError> {
        Err(StoreError::Poisoned)
    }
}

pub fn settings() -> RefreshSettings {
    RefreshSettings {
        cron: "0 */3 * * *".into(),
        run_on_start: false,
        window: 8,
        fetch_timeout: Duration::from_millis(200),
        default_location: Location::named("Corfu"),
    }
}

pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub gateway: Arc<FakeGateway>,
    pub sink: MemorySink,
    pub scheduler: Arc<RefreshScheduler>,
}

pub fn harness_with(
    registry: Arc<dyn LocationRegistry>,
    store: Arc<SqliteStore>,
    weather_store: Arc<dyn WeatherStore>,
    settings: RefreshSettings,
) -> Harness {
    let gateway = FakeGateway::new();
    let sink = MemorySink::new();
    let scheduler = RefreshScheduler::new(
        registry,
        weather_store,
        gateway.clone(),
        Arc::new(sink.clone()),
        settings,
    )
    .expect("valid cron");

    Harness { store, gateway, sink, scheduler: Arc::new(scheduler) }
}

pub fn harness(locations: Vec<Location>) -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    harness_with(
        Arc::new(StaticRegistry::new(locations)),
        store.clone(),
        store,
        settings(),
    )
}

pub fn stored(store: &SqliteStore, key: &LocationKey) -> Vec<WeatherObservation> {
    store.find_recent_for(key, 1_000).unwrap()
}

pub fn observation(key: &LocationKey, ts: i64) -> WeatherObservation {
    WeatherObservation {
        location: Some(key.clone()),
        city: None,
        temp: -1.0,
        description: "stale".into(),
        timestamp: DateTime::from_timestamp(ts, 0).unwrap(),
    }
}
