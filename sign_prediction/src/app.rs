use crate::{
    config::Config, ort_service::OrtModelService, server::HttpServer, state::SharedState,
    telemetry::Metrics,
};
use std::sync::Arc;

fn load_model(config: &Config) -> Option<OrtModelService> {
    match OrtModelService::new(&config.model) {
        Ok(service) => {
            tracing::info!("Model loaded from {:?}", config.model.get_path());
            Some(service)
        }
        Err(e) => {
            tracing::error!("Failed to load model, predictions are disabled: {}", e);
            None
        }
    }
}

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let metrics = Arc::new(Metrics::new()?);
    let service_state = SharedState::new(load_model(&config), metrics);

    let server = HttpServer::new(service_state, &config.server).await?;
    server.run().await?;

    Ok(())
}
