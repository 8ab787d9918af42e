use crate::{model_service::ModelStatus, server::SharedState};
use axum::{extract::State, response::IntoResponse, response::Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    model: ModelStatus,
}

/// The service stays available when the model failed to load; only
/// predictions are disabled.
pub async fn healthcheck(State(state): State<SharedState>) -> impl IntoResponse {
    Json(Health {
        status: "Available",
        model: state.prediction_service.model_status(),
    })
}
