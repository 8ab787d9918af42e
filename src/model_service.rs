use crate::preprocess::PreprocessedTensor;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::{
    future::Future,
    sync::{Arc, OnceLock},
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelLoadError {
    #[error("Model artifact not found: {0}")]
    Missing(String),
    #[error("Failed to fetch model artifact: {0}")]
    Fetch(String),
    #[error("Model artifact could not be loaded: {0}")]
    Corrupt(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoringError {
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Model returned {got} scores but {expected} classes are configured")]
    ClassCountMismatch { expected: usize, got: usize },
}

/// A pretrained classifier: one probability per class, in training order.
pub trait Scorer: Send + Sync + 'static {
    fn score(&self, input: &PreprocessedTensor) -> Result<Vec<f32>, ScoringError>;
}

pub type LoadResult = Result<Arc<dyn Scorer>, ModelLoadError>;

type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    NotLoaded,
    Ready,
    Failed,
}

/// Loads the scorer on first use and hands out the same instance afterwards.
///
/// The outcome of the first load is kept for the lifetime of the value,
/// failures included: a missing artifact is not fetched a second time.
/// The load runs on its own task, so it completes even if every caller
/// waiting on it goes away.
pub struct LazyModel {
    load: OnceLock<SharedLoad>,
    loader: Box<dyn Fn() -> BoxFuture<'static, LoadResult> + Send + Sync>,
}

impl LazyModel {
    pub fn new<F, Fut>(loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LoadResult> + Send + 'static,
    {
        Self {
            load: OnceLock::new(),
            loader: Box::new(move || loader().boxed()),
        }
    }

    /// Wraps an already constructed scorer.
    pub fn ready(scorer: Arc<dyn Scorer>) -> Self {
        Self::new(move || {
            let scorer = scorer.clone();
            async move { Ok(scorer) }
        })
    }

    /// Must be called from within a tokio runtime.
    pub async fn get(&self) -> LoadResult {
        let load = self.load.get_or_init(|| {
            tracing::info!("Loading classifier");
            let task = tokio::spawn((self.loader)());
            async move {
                task.await.unwrap_or_else(|e| {
                    Err(ModelLoadError::Corrupt(format!("model loading task failed: {e}")))
                })
            }
            .boxed()
            .shared()
        });
        load.clone().await
    }

    pub fn status(&self) -> ModelStatus {
        match self.load.get().and_then(|load| load.peek()) {
            None => ModelStatus::NotLoaded,
            Some(Ok(_)) => ModelStatus::Ready,
            Some(Err(_)) => ModelStatus::Failed,
        }
    }
}
