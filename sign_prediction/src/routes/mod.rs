mod metrics;
pub(crate) mod predict;
pub(crate) mod status;

use crate::{landmarks::LandmarkError, model_service::ModelService, state::SharedState};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Modelo no disponible")]
    ModelUnavailable,
    #[error("{0}")]
    InvalidLandmarks(#[from] LandmarkError),
    #[error("Failed to encode metrics: {0}")]
    Metrics(String),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::ModelUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InvalidLandmarks(_) => StatusCode::BAD_REQUEST,
            ApiError::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn api_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route("/", get(status::status::<M>))
        .route("/predecir", post(predict::predict::<M>))
        .route("/health", get(status::healthcheck::<M>))
        .route("/metrics", get(metrics::metrics_handler::<M>))
}
