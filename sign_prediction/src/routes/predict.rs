use crate::{
    landmarks::LandmarkVector, model_service::ModelService, routes::ApiError,
    state::SharedState,
};
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::instrument;

const ROUTE: &str = "/predecir";

/// Returned in `indice` when the model could not produce a label.
pub const FAILED_PREDICTION: i64 = -1;

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub puntos: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PredictionResponse {
    pub indice: i64,
}

#[instrument(skip_all)]
pub async fn predict<M: ModelService>(
    State(state): State<SharedState<M>>,
    Json(request): Json<PredictionRequest>,
) -> Result<Json<PredictionResponse>, ApiError> {
    state.metrics.record_request(ROUTE);

    let model = state.model().ok_or(ApiError::ModelUnavailable)?;
    let landmarks = LandmarkVector::try_from(request.puntos)?;

    let start = Instant::now();
    let result = model.predict(landmarks).await;
    state
        .metrics
        .record_prediction_duration(start.elapsed().as_millis() as u64, ROUTE);

    let indice = match result {
        Ok(label) => {
            tracing::info!("Prediction made: index {}", label);
            label
        }
        Err(err) => {
            tracing::error!("Prediction failed: {}", err);
            state.metrics.record_prediction_failure(err.reason());
            FAILED_PREDICTION
        }
    };

    Ok(Json(PredictionResponse { indice }))
}
