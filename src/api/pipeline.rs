use crate::error::{AppError, Result};
use crate::services::pipeline::{PipelineCommand, PipelineSnapshot};
use crate::types::{Resolution, RESOLUTION_CATALOG};
use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use tokio::sync::oneshot;

/// Current pipeline status, answered by the pipeline task itself.
async fn get_pipeline(State(state): State<AppState>) -> Result<Json<PipelineSnapshot>> {
    let (tx, rx) = oneshot::channel();
    state
        .pipeline
        .commands
        .send(PipelineCommand::Snapshot(tx))
        .await
        .map_err(|_| AppError::Internal("Pipeline task is not running".to_string()))?;
    let snapshot = rx
        .await
        .map_err(|_| AppError::Internal("Pipeline task dropped the request".to_string()))?;
    Ok(Json(snapshot))
}

/// Resolutions a client may switch to.
async fn get_resolutions() -> Json<&'static [Resolution]> {
    Json(RESOLUTION_CATALOG)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pipeline", get(get_pipeline))
        .route("/resolutions", get(get_resolutions))
}
