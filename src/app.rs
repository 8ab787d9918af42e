use crate::{
    config::Config,
    history::HistoryStore,
    ort_service::lazy_ort_model,
    prediction::PredictionService,
    preprocess::InputShape,
    reports::ReportCatalog,
    server::{HttpServer, SharedState},
    telemetry::Metrics,
};
use std::sync::Arc;
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let history = HistoryStore::new(&config.history.database_path);
    // History is optional for serving predictions; failures resurface per request.
    if let Err(e) = history.init().await {
        tracing::error!(
            "Failed to initialize history store at {}: {}",
            config.history.database_path.display(),
            e
        );
    }

    let model = Arc::new(lazy_ort_model(&config.model));
    if config.model.preload {
        if let Err(e) = model.get().await {
            tracing::error!("Model unavailable, predictions are disabled: {}", e);
        }
    }

    let prediction_service = Arc::new(PredictionService::new(
        model,
        InputShape::new(config.model.input_width, config.model.input_height),
        config.model.class_names.clone(),
        history.clone(),
        config.history.store_images,
    ));
    tracing::info!(
        classes = ?config.model.class_names,
        "Prediction service ready for {}x{} inputs",
        config.model.input_width,
        config.model.input_height
    );

    let app_state = SharedState {
        prediction_service,
        history,
        reports: ReportCatalog::new(&config.reports),
        metrics: Arc::new(Metrics::new()?),
    };

    let server = HttpServer::new(app_state, &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    server_handle.await??;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
