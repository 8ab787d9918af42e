use super::ApiError;
use crate::{history::HistorySummary, server::SharedState};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use tracing::instrument;

pub async fn list_history(
    State(state): State<SharedState>,
) -> Result<Json<Vec<HistorySummary>>, ApiError> {
    state.metrics.record_request("/history");
    let summaries = state.history.list_summaries().await?;
    Ok(Json(summaries))
}

#[instrument(skip(state))]
pub async fn delete_history(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.metrics.record_request("/history/{id}");
    state.history.delete_by_id(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn history_image(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    state.metrics.record_request("/history/{id}/image");
    let image = state
        .history
        .get(id)
        .await?
        .and_then(|record| record.image)
        .ok_or_else(|| ApiError::NotFound(format!("Image for history entry {id}")))?;

    let content_type = image::guess_format(&image)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");

    Ok(([(header::CONTENT_TYPE, content_type)], image).into_response())
}
