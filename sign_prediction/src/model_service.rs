use crate::landmarks::LandmarkVector;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("inference failed: {0}")]
    Inference(#[from] ort::Error),
    #[error("model returned no label")]
    EmptyOutput,
    #[error("label cannot be read as a class index: {0}")]
    UnconvertibleLabel(String),
    #[error("prediction task failed: {0}")]
    TaskFailed(String),
}

impl PredictionError {
    /// Short label used when counting failures.
    pub fn reason(&self) -> &'static str {
        match self {
            PredictionError::Inference(_) => "inference",
            PredictionError::EmptyOutput => "empty_output",
            PredictionError::UnconvertibleLabel(_) => "unconvertible_label",
            PredictionError::TaskFailed(_) => "task_failed",
        }
    }
}

#[async_trait]
pub trait ModelService: Send + Sync + Clone + 'static {
    async fn predict(&self, landmarks: LandmarkVector) -> Result<i64, PredictionError>;
}
