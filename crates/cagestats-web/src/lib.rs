//! Read-only JSON API over the stored collections.

mod params;

use std::sync::Arc;

use axum::{
    extract::{Path, RawQuery, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use cagestats_core::Collection;
use cagestats_storage::{
    DocumentStore, Filter, FindQuery, PgDocumentStore, StoreError, DEFAULT_DATABASE_URL,
};
use serde_json::{json, Value as JsonValue};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::params::Params;
pub use crate::params::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

pub const CRATE_NAME: &str = "cagestats-web";

/// Cursor for the next page: the id of the last item returned.
pub const NEXT_AFTER: HeaderName = HeaderName::from_static("x-next-after");
const CACHE_CONTROL: &str = "public, max-age=30";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub port: u16,
    pub database_url: String,
}

impl WebConfig {
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("CAGESTATS_WEB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/fights", get(fights_handler))
        .route("/fights/search", get(fights_search_handler))
        .route("/fighters", get(fighters_handler))
        .route("/fighters/search", get(fighters_search_handler))
        .route("/events", get(events_handler))
        .route("/events/search", get(events_search_handler))
        .route("/upcomingEvents", get(upcoming_events_handler))
        .route("/upcomingEvents/search", get(upcoming_events_search_handler))
        .route("/upcomingFights", get(upcoming_fights_handler))
        .route("/{collection}/{id}", get(document_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = WebConfig::from_env();
    let store = PgDocumentStore::connect(&config.database_url).await?;
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, "serving read api");
    axum::serve(listener, app(AppState::new(Arc::new(store)))).await?;
    Ok(())
}

async fn health_handler() -> &'static str {
    "ok"
}

fn equals(params: &Params, key: &'static str, path: &'static str) -> Option<Filter> {
    params.get(key).map(|value| Filter::Equals {
        path,
        value: value.to_string(),
    })
}

fn contains(needle: &str, paths: &[&'static str]) -> Filter {
    Filter::Contains {
        paths: paths.to_vec(),
        needle: needle.to_string(),
    }
}

fn date_range(params: &Params, path: &'static str) -> Vec<Filter> {
    let start = params.date("start").map(|date| Filter::OnOrAfter { path, date });
    let end = params.date("end").map(|date| Filter::OnOrBefore { path, date });
    start.into_iter().chain(end).collect()
}

/// Every `fighter_name` given must match some participant.
fn participant_names(params: &Params, path: &'static str) -> Vec<Filter> {
    params
        .all("fighter_name")
        .map(|name| contains(name, &[path]))
        .collect()
}

fn search(params: &Params, paths: &[&'static str]) -> Vec<Filter> {
    params.get("q").map(|q| contains(q, paths)).into_iter().collect()
}

async fn fights_handler(State(state): State<Arc<AppState>>, RawQuery(raw): RawQuery) -> Response {
    let params = Params::parse(raw.as_deref());
    let mut filters = [
        equals(&params, "event_id", "event_id"),
        equals(&params, "referee", "referee"),
        equals(&params, "method", "method"),
        equals(&params, "fighter_id", "participants.fighter_id"),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();
    filters.extend(participant_names(&params, "participants.fighter_name"));
    list(&state, Collection::Fights, &params, filters).await
}

async fn fights_search_handler(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> Response {
    let params = Params::parse(raw.as_deref());
    let filters = search(&params, &["fight_detail", "method", "method_detail", "referee"]);
    list(&state, Collection::Fights, &params, filters).await
}

async fn fighters_handler(State(state): State<Arc<AppState>>, RawQuery(raw): RawQuery) -> Response {
    let params = Params::parse(raw.as_deref());
    let mut filters = Vec::new();
    if let Some(name) = params.get("name") {
        filters.push(contains(name, &["name"]));
    }
    filters.extend(equals(&params, "stance", "stance"));
    if let Some(value) = params.number("min_slpm") {
        filters.push(Filter::AtLeast {
            path: "career_stats.slpm",
            value,
        });
    }
    filters.extend(date_range(&params, "dob"));
    list(&state, Collection::Fighters, &params, filters).await
}

async fn fighters_search_handler(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> Response {
    let params = Params::parse(raw.as_deref());
    let filters = search(&params, &["name", "nickname"]);
    list(&state, Collection::Fighters, &params, filters).await
}

fn event_filters(params: &Params) -> Vec<Filter> {
    let mut filters = Vec::new();
    if let Some(name) = params.get("name") {
        filters.push(contains(name, &["name"]));
    }
    filters.extend(date_range(params, "date"));
    filters
}

async fn events_handler(State(state): State<Arc<AppState>>, RawQuery(raw): RawQuery) -> Response {
    let params = Params::parse(raw.as_deref());
    let filters = event_filters(&params);
    list(&state, Collection::Events, &params, filters).await
}

async fn events_search_handler(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> Response {
    let params = Params::parse(raw.as_deref());
    let filters = search(&params, &["name", "location"]);
    list(&state, Collection::Events, &params, filters).await
}

async fn upcoming_events_handler(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> Response {
    let params = Params::parse(raw.as_deref());
    let filters = event_filters(&params);
    list(&state, Collection::UpcomingEvents, &params, filters).await
}

async fn upcoming_events_search_handler(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> Response {
    let params = Params::parse(raw.as_deref());
    let filters = search(&params, &["name", "location"]);
    list(&state, Collection::UpcomingEvents, &params, filters).await
}

async fn upcoming_fights_handler(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> Response {
    let params = Params::parse(raw.as_deref());
    let mut filters = equals(&params, "upcoming_event_id", "upcoming_event_id")
        .into_iter()
        .collect::<Vec<_>>();
    filters.extend(participant_names(&params, "participants.name"));
    list(&state, Collection::UpcomingFights, &params, filters).await
}

async fn document_handler(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
) -> Response {
    let Some(collection) = Collection::from_name(&collection) else {
        return not_found("unknown collection");
    };
    match state.store.get(collection, &id).await {
        Ok(Some(doc)) => ([(header::CACHE_CONTROL, CACHE_CONTROL)], Json(doc)).into_response(),
        Ok(None) => not_found("not found"),
        Err(err) => server_error(collection, err),
    }
}

async fn list(
    state: &AppState,
    collection: Collection,
    params: &Params,
    filters: Vec<Filter>,
) -> Response {
    let mut query = FindQuery::new(params.limit()).after(params.after());
    query.filters = filters;
    debug!(collection = collection.name(), ?query, "list query");

    let items = match state.store.find(collection, &query).await {
        Ok(items) => items,
        Err(err) => return server_error(collection, err),
    };
    let next_after = items
        .last()
        .and_then(|doc| doc.get("id"))
        .and_then(JsonValue::as_str)
        .and_then(|id| HeaderValue::from_str(id).ok());

    let mut resp = (
        [(header::CACHE_CONTROL, CACHE_CONTROL)],
        Json(json!({ "items": items })),
    )
        .into_response();
    if let Some(next_after) = next_after {
        resp.headers_mut().insert(NEXT_AFTER, next_after);
    }
    resp
}

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
}

fn server_error(collection: Collection, err: StoreError) -> Response {
    error!(collection = collection.name(), error = %err, "store query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Server error: document store unavailable",
    )
        .into_response()
}
