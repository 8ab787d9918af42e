mod health;
mod history;
mod metrics;
mod predict;
mod reports;

use crate::{
    history::HistoryError,
    prediction::PredictionError,
    server::SharedState,
};
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde_json::json;
use thiserror::Error;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/classes", get(predict::classes))
        .route("/predict", post(predict::predict))
        .route("/history", get(history::list_history))
        .route("/history/{id}", delete(history::delete_history))
        .route("/history/{id}/image", get(history::history_image))
        .route("/reports", get(reports::list_reports))
        .route("/reports/{name}", get(reports::report_image))
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Prediction(#[from] PredictionError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("Invalid upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Upload has no `file` field")]
    MissingFile,
    #[error("{0} not found")]
    NotFound(String),
    #[error("Failed to encode metrics: {0}")]
    Metrics(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Prediction(PredictionError::Preprocess(_)) => StatusCode::BAD_REQUEST,
            ApiError::Prediction(PredictionError::ModelLoad(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Prediction(PredictionError::Scoring(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::History(HistoryError::StorageUnavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Multipart(e) => e.status(),
            ApiError::MissingFile => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
