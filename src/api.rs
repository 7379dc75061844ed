// src/api.rs
//! Operator HTTP surface: manual triggers, cache admin, subscribers, status.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shuttle_axum::axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::dispatch::Dispatcher;
use crate::error::{PipelineError, StoreError};
use crate::fleet::FleetCollector;
use crate::store::Stores;
use crate::types::{normalize_city_name, DataType};

#[derive(Clone)]
pub struct AppState {
    pub fleet: Arc<FleetCollector>,
    pub dispatcher: Arc<Dispatcher>,
    pub stores: Stores,
    /// Manual collection without a date targets today + this many days.
    pub collection_day_offset: i64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/collect", post(collect_all))
        .route("/collect/city", post(collect_city))
        .route("/dispatch", post(dispatch_all))
        .route("/dispatch/city", post(dispatch_city))
        .route("/data", get(read_data))
        .route("/cache", delete(clear_cache))
        .route("/status", get(status))
        .route("/subscribe", post(subscribe))
        .route("/subscribers", get(list_subscribers).delete(delete_subscribers))
        .route("/cities", get(list_cities))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// JSON error body with a status code.
pub struct ApiError(StatusCode, String);

impl ApiError {
    fn bad_request(msg: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "store error in handler");
        Self(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn required_city(city: Option<&str>) -> ApiResult<String> {
    let city = normalize_city_name(city.unwrap_or_default());
    if city.is_empty() {
        return Err(ApiError::bad_request("city is required"));
    }
    Ok(city)
}

#[derive(Deserialize)]
struct CityQuery {
    city: Option<String>,
    date: Option<NaiveDate>,
}

#[derive(Serialize)]
struct Triggered {
    status: &'static str,
    date: NaiveDate,
}

async fn collect_all(State(st): State<AppState>, Query(q): Query<CityQuery>) -> Response {
    let date = q
        .date
        .unwrap_or_else(|| today() + Duration::days(st.collection_day_offset));
    if st.fleet.is_running() {
        let body = Triggered { status: "already_running", date };
        return (StatusCode::CONFLICT, Json(body)).into_response();
    }
    let fleet = st.fleet.clone();
    tokio::spawn(async move {
        fleet.run_daily_collection(date).await;
    });
    let body = Triggered { status: "started", date };
    (StatusCode::ACCEPTED, Json(body)).into_response()
}

async fn collect_city(
    State(st): State<AppState>,
    Query(q): Query<CityQuery>,
) -> ApiResult<Response> {
    let city = required_city(q.city.as_deref())?;
    let date = q
        .date
        .unwrap_or_else(|| today() + Duration::days(st.collection_day_offset));
    match st.fleet.aggregator().collect_and_cache(&city, date).await {
        Ok(report) => Ok(Json(report).into_response()),
        Err(PipelineError::EmptyCity) => Err(ApiError::bad_request("city is required")),
        Err(PipelineError::Total { city, failures }) => Ok((
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": format!("all data types failed for {city}"), "failures": failures })),
        )
            .into_response()),
    }
}

async fn dispatch_all(State(st): State<AppState>, Query(q): Query<CityQuery>) -> Response {
    let date = q.date.unwrap_or_else(today);
    if st.dispatcher.is_running() {
        let body = Triggered { status: "already_running", date };
        return (StatusCode::CONFLICT, Json(body)).into_response();
    }
    let dispatcher = st.dispatcher.clone();
    tokio::spawn(async move {
        dispatcher.run_daily_dispatch(date).await;
    });
    let body = Triggered { status: "started", date };
    (StatusCode::ACCEPTED, Json(body)).into_response()
}

async fn dispatch_city(
    State(st): State<AppState>,
    Query(q): Query<CityQuery>,
) -> ApiResult<Response> {
    let city = required_city(q.city.as_deref())?;
    let date = q.date.unwrap_or_else(today);
    let out = st.dispatcher.send_for_city(&city, date).await?;
    Ok(Json(out).into_response())
}

async fn read_data(State(st): State<AppState>, Query(q): Query<CityQuery>) -> ApiResult<Response> {
    let city = required_city(q.city.as_deref())?;
    let date = q.date.unwrap_or_else(today);
    let entries = st.stores.cache.entries_for(&city, date).await?;
    if entries.is_empty() {
        return Err(ApiError(
            StatusCode::NOT_FOUND,
            format!("no cached data for {city} on {date}"),
        ));
    }
    let data: BTreeMap<DataType, Value> = entries.into_iter().map(|e| (e.kind, e.payload)).collect();
    Ok(Json(json!({ "city": city, "date": date, "data": data })).into_response())
}

#[derive(Deserialize)]
struct ClearQuery {
    city: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

async fn clear_cache(State(st): State<AppState>, Query(q): Query<ClearQuery>) -> ApiResult<Json<Value>> {
    let city = q
        .city
        .as_deref()
        .map(normalize_city_name)
        .filter(|c| !c.is_empty());
    let kind = match q.kind.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(k) => Some(k.parse::<DataType>().map_err(ApiError::bad_request)?),
        None => None,
    };
    let deleted = st.stores.cache.clear(city.as_deref(), kind).await?;
    tracing::info!(city = ?city, kind = ?kind, deleted, "cache cleared");
    Ok(Json(json!({ "deleted": deleted })))
}

async fn status(State(st): State<AppState>) -> Json<Value> {
    Json(json!({
        "collection": {
            "running": st.fleet.is_running(),
            "last": st.fleet.last_summary(),
        },
        "dispatch": {
            "running": st.dispatcher.is_running(),
            "last": st.dispatcher.last_summary(),
        },
    }))
}

static RE_EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Deserialize)]
struct SubscribeReq {
    email: String,
    city: String,
}

async fn subscribe(
    State(st): State<AppState>,
    Json(req): Json<SubscribeReq>,
) -> ApiResult<Response> {
    let email = req.email.trim().to_lowercase();
    if !RE_EMAIL.is_match(&email) {
        return Err(ApiError::bad_request("a valid email is required"));
    }
    let city = required_city(Some(req.city.as_str()))?;
    let sub = st.stores.subscribers.subscribe(&email, &city).await?;
    tracing::info!(city = %city, "new subscriber");
    Ok((StatusCode::CREATED, Json(sub)).into_response())
}

#[derive(Deserialize)]
struct SubscriberQuery {
    id: Option<String>,
    city: Option<String>,
    #[serde(default)]
    all: bool,
}

async fn list_subscribers(
    State(st): State<AppState>,
    Query(q): Query<SubscriberQuery>,
) -> ApiResult<Response> {
    let subs = match q.city.as_deref() {
        Some(c) => st.stores.subscribers.list_by_city(&required_city(Some(c))?).await?,
        None => st.stores.subscribers.list_all().await?,
    };
    Ok(Json(subs).into_response())
}

async fn delete_subscribers(
    State(st): State<AppState>,
    Query(q): Query<SubscriberQuery>,
) -> ApiResult<Json<Value>> {
    let subs = &st.stores.subscribers;
    let deleted = if let Some(id) = q.id.as_deref().filter(|s| !s.is_empty()) {
        subs.delete_by_id(id).await?
    } else if let Some(c) = q.city.as_deref() {
        subs.delete_by_city(&required_city(Some(c))?).await?
    } else if q.all {
        subs.delete_all().await?
    } else {
        return Err(ApiError::bad_request("one of id, city or all=true is required"));
    };
    Ok(Json(json!({ "deleted": deleted })))
}

async fn list_cities(State(st): State<AppState>) -> ApiResult<Response> {
    Ok(Json(st.stores.cities.list_active().await?).into_response())
}
