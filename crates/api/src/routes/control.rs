//! Control Routes
//!
//! Requests only raise a flag; the frame loop consumes it on its next cycle.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// Driver acknowledged the emergency alert from the UI
pub async fn post_user_response(State(state): State<Arc<AppState>>) -> Json<AcceptedResponse> {
    info!("User response received from UI");
    state.hub.request_user_response();
    Json(AcceptedResponse {
        status: "ok",
        message: "User response recorded",
    })
}

/// UI asked to silence the alarm speaker
pub async fn post_stop_speaker(State(state): State<Arc<AppState>>) -> Json<AcceptedResponse> {
    info!("Stop speaker request received from UI");
    state.hub.request_stop_speaker();
    Json(AcceptedResponse {
        status: "ok",
        message: "Stop speaker request recorded",
    })
}
