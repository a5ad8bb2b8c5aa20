//! HTTP JSON API
//!
//! Serves weather, users, courses and faculties to the campus clients. Every
//! route except `/health` and `/register` needs an `Authorization: Bearer
//! <token>` header.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use unilife_core::{
    ApiError, Course, Faculty, Location, QueryService, RefreshOutcome, RefreshScheduler, User,
    WeatherObservation,
};

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub query: Arc<QueryService>,
    pub scheduler: Arc<RefreshScheduler>,
}

/// JSON body for every failed request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub status_code: u16,
}

pub struct HttpError(ApiError);

impl From<ApiError> for HttpError {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            log::error!("[Http] {}: {:?}", self.0.key(), self.0);
        }

        let body = ErrorBody {
            error: self.0.key(),
            message: self.0.to_string(),
            status_code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, HttpError>;

/// Query params for `/weather`
#[derive(Debug, Deserialize)]
pub struct WeatherParams {
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl WeatherParams {
    fn location(&self) -> Result<Location, ApiError> {
        match (&self.city, self.lat, self.lng) {
            (Some(city), lat, lng) if !city.trim().is_empty() => {
                Ok(Location::resolve(city.trim(), lat, lng))
            }
            (_, Some(lat), Some(lng)) => Ok(Location::at(lat, lng)),
            _ => Err(ApiError::InvalidLocation),
        }
    }
}

/// JSON request for `/me/location`
#[derive(Debug, Deserialize)]
pub struct LocationUpdate {
    pub lat: f64,
    pub lng: f64,
}

/// JSON request for `/register`
#[derive(Debug, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok())
}

async fn health_check() -> &'static str {
    "ok"
}

async fn register(
    State(state): State<AppState>,
    Json(registration): Json<Registration>,
) -> Result<(StatusCode, Json<User>), HttpError> {
    let user = state.query.register(&registration.email, &registration.password)?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn weather(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<WeatherParams>,
) -> ApiResult<WeatherObservation> {
    state.query.authorize(authorization(&headers))?;
    let location = params.location()?;
    let weather = state.query.current_weather(&location, Utc::now()).await?;
    Ok(Json(weather))
}

async fn courses(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
) -> ApiResult<Vec<Course>> {
    state.query.authorize(authorization(&headers))?;
    Ok(Json(state.query.courses(user_id)?))
}

async fn faculties(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Vec<Faculty>> {
    state.query.authorize(authorization(&headers))?;
    Ok(Json(state.query.faculties()?))
}

async fn users(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Vec<User>> {
    state.query.authorize(authorization(&headers))?;
    Ok(Json(state.query.users()?))
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<User> {
    Ok(Json(state.query.authorize(authorization(&headers))?))
}

async fn update_location(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<LocationUpdate>,
) -> ApiResult<User> {
    let user = state.query.authorize(authorization(&headers))?;
    Ok(Json(state.query.relocate(&user, update.lat, update.lng)?))
}

async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Vec<RefreshOutcome>> {
    let user = state.query.authorize(authorization(&headers))?;
    log::info!("[Http] manual refresh requested by {}", user.email);
    Ok(Json(state.scheduler.tick().await))
}

/// Create the HTTP router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/register", post(register))
        .route("/weather", get(weather))
        .route("/courses/{user_id}", get(courses))
        .route("/users", get(users))
        .route("/faculties", get(faculties))
        .route("/me", get(me))
        .route("/me/location", post(update_location))
        .route("/refresh", post(refresh))
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP server until Ctrl-C.
pub async fn run_http_server(bind: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    log::info!("HTTP server listening on {}", bind);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    log::info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", e);
    }
}
