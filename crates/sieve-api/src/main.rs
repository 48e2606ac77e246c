use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use sieve_api::{logging, router, AppState, ServerConfig};
use sieve_db::{log_pool_metrics, Database};
use sieve_inference::OpenAIBackend;
use sieve_jobs::{AnalysisConfig, OrchestratorConfig, Sieve};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env();
    let _log_guard = logging::init(&config);
    info!(
        log_format = ?config.log_format,
        log_file = config.log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;
    log_pool_metrics(&db.pool);

    let backend = OpenAIBackend::from_env()?;
    info!(
        model = backend.config().gen_model.as_str(),
        base_url = backend.config().base_url.as_str(),
        "Generation backend configured"
    );

    let sieve = Sieve::with_config(
        db,
        Arc::new(backend),
        AnalysisConfig::from_env(),
        OrchestratorConfig::from_env(),
    );
    let app = router(AppState::new(sieve), config.origin_headers());

    let addr: SocketAddr = config.bind_addr().parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
