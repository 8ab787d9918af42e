use super::ApiError;
use crate::{
    model_service::ModelStatus,
    prediction::UploadedImage,
    server::SharedState,
};
use axum::{
    extract::{Multipart, State},
    response::Json,
};
use serde::Serialize;
use std::time::Instant;
use tracing::instrument;

const ROUTE: &str = "/predict";

#[derive(Serialize)]
pub struct PredictResponse {
    pub label: String,
    pub confidence: f64,
    pub confidence_display: String,
    pub history_id: Option<i64>,
    pub history_error: Option<String>,
}

#[derive(Serialize)]
pub struct ClassesResponse {
    pub class_names: Vec<String>,
    pub model: ModelStatus,
}

pub async fn classes(State(state): State<SharedState>) -> Json<ClassesResponse> {
    Json(ClassesResponse {
        class_names: state.prediction_service.class_names().to_vec(),
        model: state.prediction_service.model_status(),
    })
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadedImage, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or("upload")
            .to_string();
        let data = field.bytes().await?.to_vec();
        return Ok(UploadedImage { filename, data });
    }
    Err(ApiError::MissingFile)
}

#[instrument(skip(state, multipart))]
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    state.metrics.record_request(ROUTE);
    let image = read_upload(multipart).await?;

    let start = Instant::now();
    let outcome = state.prediction_service.predict(image).await;
    state
        .metrics
        .record_prediction_duration(start.elapsed().as_millis() as u64, ROUTE);

    let outcome = outcome?;
    state.metrics.record_prediction(&outcome.result.label);

    let (history_id, history_error) = match outcome.history {
        Ok(id) => (Some(id), None),
        Err(e) => {
            state.metrics.record_history_write_failure();
            (None, Some(e.to_string()))
        }
    };

    Ok(Json(PredictResponse {
        confidence_display: outcome.result.confidence_display(),
        label: outcome.result.label,
        confidence: outcome.result.confidence,
        history_id,
        history_error,
    }))
}
