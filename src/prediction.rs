use crate::{
    history::{HistoryError, HistoryStore},
    model_service::{LazyModel, ModelLoadError, ModelStatus, ScoringError},
    preprocess::{transform_image, InputShape, PreprocessError},
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
}

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub label: String,
    /// Percentage in [0, 100], rounded to two decimals.
    pub confidence: f64,
}

impl PredictionResult {
    pub fn confidence_display(&self) -> String {
        format!("{:.2}", self.confidence)
    }
}

/// A prediction and what became of its history row. Persisting is best
/// effort: a storage failure does not undo the prediction.
#[derive(Debug)]
pub struct PredictionOutcome {
    pub result: PredictionResult,
    pub history: Result<i64, HistoryError>,
}

pub struct PredictionService {
    model: Arc<LazyModel>,
    input_shape: InputShape,
    class_names: Vec<String>,
    history: HistoryStore,
    store_images: bool,
}

impl PredictionService {
    pub fn new(
        model: Arc<LazyModel>,
        input_shape: InputShape,
        class_names: Vec<String>,
        history: HistoryStore,
        store_images: bool,
    ) -> Self {
        Self {
            model,
            input_shape,
            class_names,
            history,
            store_images,
        }
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn model_status(&self) -> ModelStatus {
        self.model.status()
    }

    #[instrument(skip(self, image), fields(filename = %image.filename, bytes = image.data.len()))]
    pub async fn predict(&self, image: UploadedImage) -> Result<PredictionOutcome, PredictionError> {
        let tensor = transform_image(&image.data, self.input_shape)?;
        let scorer = self.model.get().await?;
        let probabilities = tokio::task::spawn_blocking(move || scorer.score(&tensor))
            .await
            .map_err(|e| ScoringError::Inference(format!("scoring task failed: {e}")))??;
        let result = classify(&probabilities, &self.class_names)?;

        tracing::info!(
            "Predicted {} ({}%)",
            result.label,
            result.confidence_display()
        );

        let stored_image = self.store_images.then_some(image.data.as_slice());
        let history = self
            .history
            .append(&image.filename, &result.label, stored_image)
            .await;
        if let Err(e) = &history {
            tracing::error!("Failed to record prediction for {}: {}", image.filename, e);
        }

        Ok(PredictionOutcome { result, history })
    }
}

/// Picks the most probable class. Ties go to the class listed first.
///
/// Every score must be a probability in [0, 1]; NaN, infinities and raw
/// logits are rejected rather than mapped to a class.
pub fn classify(
    probabilities: &[f32],
    class_names: &[String],
) -> Result<PredictionResult, ScoringError> {
    if probabilities.len() != class_names.len() || probabilities.is_empty() {
        return Err(ScoringError::ClassCountMismatch {
            expected: class_names.len(),
            got: probabilities.len(),
        });
    }

    if let Some((index, p)) = probabilities
        .iter()
        .enumerate()
        .find(|(_, p)| !(0.0..=1.0).contains(*p))
    {
        return Err(ScoringError::Inference(format!(
            "score {} for class {} is not a probability",
            p, class_names[index]
        )));
    }

    let (best_index, best_probability) = probabilities
        .iter()
        .copied()
        .enumerate()
        .reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best })
        .ok_or_else(|| ScoringError::Inference("empty probability vector".into()))?;

    let confidence = (best_probability as f64 * 100.0 * 100.0).round() / 100.0;

    Ok(PredictionResult {
        label: class_names[best_index].clone(),
        confidence,
    })
}
