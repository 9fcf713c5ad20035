//! Status Routes

use axum::{extract::State, Json};
use event_log::LogSummary;
use std::sync::Arc;

use crate::hub::{DrowsinessStatus, SystemStatus};
use crate::AppState;

/// Latest drowsiness snapshot
pub async fn get_drowsiness(State(state): State<Arc<AppState>>) -> Json<DrowsinessStatus> {
    Json(state.hub.drowsiness())
}

/// Latest system snapshot
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    Json(state.hub.system())
}

/// Latest 30-day log summary
pub async fn get_log_summary(State(state): State<Arc<AppState>>) -> Json<LogSummary> {
    Json(state.hub.log_summary())
}
