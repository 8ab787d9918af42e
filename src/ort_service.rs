use crate::{
    config::ModelConfig,
    fetch::ensure_artifact,
    model_service::{LazyModel, ModelLoadError, Scorer, ScoringError},
    preprocess::PreprocessedTensor,
};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use parking_lot::Mutex;
use std::{path::Path, sync::Arc};

pub struct OrtScorer {
    session: Mutex<Session>,
    output_name: String,
    apply_softmax: bool,
}

fn build_session(model_path: &Path) -> ort::Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_file(model_path)?;
    Ok(session)
}

impl OrtScorer {
    pub fn load(model_path: &Path, apply_softmax: bool) -> Result<Self, ModelLoadError> {
        let session = build_session(model_path)
            .map_err(|e| ModelLoadError::Corrupt(format!("{}: {}", model_path.display(), e)))?;

        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| {
                ModelLoadError::Corrupt(format!("{} declares no outputs", model_path.display()))
            })?;

        tracing::info!(
            inputs = session.inputs.len(),
            output = %output_name,
            "Created ONNX session from {}",
            model_path.display()
        );

        Ok(Self {
            session: Mutex::new(session),
            output_name,
            apply_softmax,
        })
    }
}

impl Scorer for OrtScorer {
    fn score(&self, input: &PreprocessedTensor) -> Result<Vec<f32>, ScoringError> {
        let tensor_ref = TensorRef::from_array_view(input.as_batch().view())
            .map_err(|e| ScoringError::Inference(format!("failed to build tensor: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ScoringError::Inference(e.to_string()))?;

        let (_shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| ScoringError::Inference(format!("failed to extract tensor: {}", e)))?;

        if self.apply_softmax {
            softmax(data)
        } else {
            Ok(data.to_vec())
        }
    }
}

/// Lazily fetches (when configured) and loads the ONNX artifact on first use.
pub fn lazy_ort_model(model_config: &ModelConfig) -> LazyModel {
    let model_config = model_config.clone();
    LazyModel::new(move || {
        let model_config = model_config.clone();
        async move {
            let path = model_config.get_path();
            ensure_artifact(&path, model_config.remote_url.as_deref()).await?;
            let scorer = tokio::task::spawn_blocking(move || {
                OrtScorer::load(&path, model_config.apply_softmax)
            })
            .await
            .map_err(|e| ModelLoadError::Corrupt(format!("model loading task failed: {e}")))??;
            Ok(Arc::new(scorer) as Arc<dyn Scorer>)
        }
    })
}

fn softmax(logits: &[f32]) -> Result<Vec<f32>, ScoringError> {
    if let Some(logit) = logits.iter().find(|x| !x.is_finite()) {
        return Err(ScoringError::Inference(format!(
            "model emitted non-finite logit {logit}"
        )));
    }
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return Err(ScoringError::Inference(format!("softmax normaliser is {sum}")));
    }
    Ok(exps.into_iter().map(|x| x / sum).collect())
}
