use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::websocket::validate_channel_id;

/// Users connected to a project on this instance
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResponse {
    pub online_users: Vec<String>,
    pub count: usize,
}

/// GET /api/v1/projects/{project_id}/presence
pub async fn online_users(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<PresenceResponse>> {
    if !validate_channel_id(&project_id) {
        return Err(AppError::Validation(format!(
            "Invalid project id: {}",
            project_id
        )));
    }

    let online_users = state.registry.online_users(&project_id).await;
    Ok(Json(PresenceResponse {
        count: online_users.len(),
        online_users,
    }))
}
