use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::{AppError, Result};
use crate::event::BoardEvent;
use crate::hub::BroadcastReport;
use crate::server::AppState;
use crate::websocket::validate_channel_id;

/// POST /api/v1/projects/{project_id}/events
///
/// Entry point for the services that own board mutations.
#[tracing::instrument(name = "api.publish_event", skip(state, event), fields(event_type = event.kind()))]
pub async fn publish_event(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(event): Json<BoardEvent>,
) -> Result<Json<BroadcastReport>> {
    if !validate_channel_id(&project_id) {
        return Err(AppError::Validation(format!(
            "Invalid project id: {}",
            project_id
        )));
    }
    if event.board_id().is_empty() {
        return Err(AppError::Validation("boardId must not be empty".to_string()));
    }

    let report = state.broadcaster.broadcast(&project_id, &event).await?;
    Ok(Json(report))
}
