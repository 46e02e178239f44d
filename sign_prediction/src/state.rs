use crate::{model_service::ModelService, telemetry::Metrics};
use std::sync::Arc;

/// State shared by every handler. The model is set once at startup and
/// only read afterwards; `None` means loading failed and predictions are
/// disabled.
pub struct SharedState<M: ModelService> {
    model: Option<Arc<M>>,
    pub metrics: Arc<Metrics>,
}

impl<M: ModelService> SharedState<M> {
    pub fn new(model: Option<M>, metrics: Arc<Metrics>) -> Self {
        Self {
            model: model.map(Arc::new),
            metrics,
        }
    }

    pub fn model(&self) -> Option<&Arc<M>> {
        self.model.as_ref()
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_some()
    }
}

impl<M: ModelService> Clone for SharedState<M> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            metrics: self.metrics.clone(),
        }
    }
}
