use super::state::ControlState;
use crate::error::{TrackerError, TrackerResult};
use crate::lifecycle::persist_usage;
use crate::models::TopAppEntry;
use crate::tracker::EngineStatus;
use axum::extract::{Query, State};
use axum::Json;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusResponse {
    fn new(status: &'static str) -> Self {
        Self {
            status,
            message: None,
        }
    }

    fn with_message(status: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SavedResponse {
    pub status: &'static str,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveQuery {
    #[serde(default)]
    pub archive: bool,
}

/// Sample data for UI development; never touches the engine.
const MOCK_USAGE: &[(&str, u64)] = &[
    ("VS Code", 120),
    ("Chrome", 85),
    ("Slack", 45),
    ("Spotify", 30),
    ("Terminal", 25),
];

pub async fn app_usage(State(state): State<ControlState>) -> Json<Vec<TopAppEntry>> {
    let limit = state.engine.config().top_app_limit;
    Json(state.engine.top_apps(limit))
}

pub async fn health() -> Json<StatusResponse> {
    Json(StatusResponse::new("ok"))
}

pub async fn mock_app_usage() -> Json<Vec<TopAppEntry>> {
    Json(
        MOCK_USAGE
            .iter()
            .map(|(name, minutes)| TopAppEntry {
                name: (*name).to_string(),
                time_used: *minutes,
            })
            .collect(),
    )
}

pub async fn reset_app_usage(
    State(state): State<ControlState>,
) -> TrackerResult<Json<StatusResponse>> {
    state.engine.reset()?;
    Ok(Json(StatusResponse::with_message(
        "success",
        "Tracking data reset.",
    )))
}

pub async fn pause_tracking(
    State(state): State<ControlState>,
) -> TrackerResult<Json<StatusResponse>> {
    state.engine.pause()?;
    Ok(Json(StatusResponse::new("paused")))
}

/// Resuming queries the foreground window, so it runs on the blocking pool.
pub async fn resume_tracking(
    State(state): State<ControlState>,
) -> TrackerResult<Json<StatusResponse>> {
    let engine = Arc::clone(&state.engine);
    tokio::task::spawn_blocking(move || engine.resume())
        .await
        .map_err(|e| TrackerError::Task(e.to_string()))??;
    Ok(Json(StatusResponse::new("resumed")))
}

pub async fn tracking_status(State(state): State<ControlState>) -> Json<EngineStatus> {
    Json(state.engine.status())
}

pub async fn save_app_usage(
    State(state): State<ControlState>,
    Query(query): Query<SaveQuery>,
) -> TrackerResult<Json<SavedResponse>> {
    let path = persist_usage(
        Arc::clone(&state.engine),
        Arc::clone(&state.store),
        query.archive,
    )
    .await?;
    Ok(Json(SavedResponse {
        status: "saved",
        path: path.display().to_string(),
    }))
}

pub async fn shutdown(State(state): State<ControlState>) -> Json<MessageResponse> {
    info!("Shutdown requested over HTTP");
    state.shutdown.cancel();
    Json(MessageResponse {
        message: "Server is shutting down...",
    })
}
