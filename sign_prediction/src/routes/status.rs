use crate::{model_service::ModelService, state::SharedState};
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

const STATUS_MESSAGE: &str = "API de SeñIA funcionando";

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub mensaje: String,
    pub modelo_cargado: bool,
}

/// Liveness answer. The process is up either way; `Degraded` means it is
/// serving without a model.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum Availability {
    Available,
    Degraded,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: Availability,
}

pub async fn status<M: ModelService>(State(state): State<SharedState<M>>) -> Json<ServiceStatus> {
    state.metrics.record_request("/");

    Json(ServiceStatus {
        mensaje: STATUS_MESSAGE.to_string(),
        modelo_cargado: state.model_loaded(),
    })
}

pub async fn healthcheck<M: ModelService>(State(state): State<SharedState<M>>) -> Json<Health> {
    let status = if state.model_loaded() {
        Availability::Available
    } else {
        Availability::Degraded
    };

    Json(Health { status })
}
