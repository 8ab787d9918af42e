use super::ApiError;
use crate::{reports::ReportImage, server::SharedState};
use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Json, Response},
};

pub async fn list_reports(State(state): State<SharedState>) -> Json<Vec<ReportImage>> {
    state.metrics.record_request("/reports");
    Json(state.reports.list().await)
}

pub async fn report_image(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    state.metrics.record_request("/reports/{name}");
    let (bytes, content_type) = state
        .reports
        .read(&name)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Report {name}")))?;

    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}
