//! ==============================================================================
//! server.rs - http api and router
//! ==============================================================================
//!
//! routes:
//!     GET    /                  dashboard page
//!     GET    /get_data          most recent readings, newest first
//!     POST   /add_data          {value} -> stamp now, insert
//!     PUT    /edit_data/:id     {value} -> overwrite value (no-op if absent)
//!     DELETE /delete_data/:id   remove, 404 if absent, then one inline tick
//!     GET    /ws                websocket push channel (see ws.rs)
//!
//! ==============================================================================

use crate::broadcast::{BroadcastSettings, Broadcaster};
use crate::clock::Clock;
use crate::config::DashboardConfig;
use crate::domain::{Reading, SharedView, ValuePayload, ViewSettings};
use crate::error::ApiError;
use crate::store::{ReadingQuery, Store};
use crate::ws;

use axum::{
    extract::{Path, State},
    response::{Html, Json},
    routing::{delete, get, post, put},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const DASHBOARD_HTML: &str = include_str!("../assets/index.html");

// ==============================================================================
// shared state
// ==============================================================================
// handed to every handler. all members are cheap clones of shared handles:
// - store: sqlite connection behind a mutex
// - view: process-wide sort/filter, last writer wins
// - broadcaster: push loop + fan-out channel

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub view: SharedView,
    pub clock: Clock,
    pub broadcaster: Broadcaster,
    pub max_rows: u32,
}

impl AppState {
    pub fn new(store: Store, config: &DashboardConfig) -> Self {
        let view: SharedView = Arc::new(RwLock::new(ViewSettings::default()));
        let clock = Clock::with_offset_minutes(config.clock.utc_offset_minutes);
        let settings = BroadcastSettings {
            interval: config.broadcast.interval(),
            batch_size: config.broadcast.batch_size,
            log_payloads: config.logging.show_broadcasts,
        };
        let broadcaster = Broadcaster::new(
            store.clone(),
            view.clone(),
            clock,
            settings,
            config.broadcast.channel_capacity,
        );

        Self {
            store,
            view,
            clock,
            broadcaster,
            max_rows: config.api.max_rows,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl MessageResponse {
    fn new(message: &'static str) -> Self {
        Self { message, id: None }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/get_data", get(get_data_handler))
        .route("/add_data", post(add_data_handler))
        .route("/edit_data/:id", put(edit_data_handler))
        .route("/delete_data/:id", delete(delete_data_handler))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn dashboard_handler() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

async fn get_data_handler(State(state): State<AppState>) -> Result<Json<Vec<Reading>>, ApiError> {
    let query = ReadingQuery::latest(state.max_rows);
    let readings = state.store.call(move |store| store.query(&query)).await?;
    Ok(Json(readings))
}

async fn add_data_handler(
    State(state): State<AppState>,
    Json(payload): Json<ValuePayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    let stamp = state.clock.now();
    let reading = state
        .store
        .call(move |store| store.insert(payload.value, &stamp))
        .await?;

    tracing::info!(id = reading.id, value = reading.value, date = %reading.date, "reading added");
    Ok(Json(MessageResponse {
        message: "Sensor data added successfully",
        id: Some(reading.id),
    }))
}

async fn edit_data_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ValuePayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    let changed = state
        .store
        .call(move |store| store.update_value(id, payload.value))
        .await?;

    if changed == 0 {
        tracing::debug!(id, "edit of unknown reading ignored");
    } else {
        tracing::info!(id, value = payload.value, "reading updated");
    }
    Ok(Json(MessageResponse::new("Sensor data updated successfully")))
}

async fn delete_data_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let removed = state
        .store
        .call(move |store| {
            let existing = store.get(id)?;
            if existing.is_some() {
                store.delete(id)?;
            }
            Ok(existing)
        })
        .await?;
    let Some(reading) = removed else {
        return Err(ApiError::NotFound);
    };
    tracing::info!(id, value = reading.value, date = %reading.date, "reading deleted");

    // push the removal now instead of waiting for the next tick
    if let Err(e) = state.broadcaster.tick().await {
        tracing::warn!(error = %e, "post-delete broadcast failed");
    }

    Ok(Json(MessageResponse::new("Sensor data deleted successfully")))
}
