use spike::{
    audit::TracingAuditSink,
    config::NexusConfig,
    nexus::{nexus_router, Nexus},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging first
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spike=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting SPIKE Nexus v{}", env!("CARGO_PKG_VERSION"));

    let config = NexusConfig::load()?;
    info!(
        keepers = config.keepers.len(),
        identity = %config.identity,
        "Configuration loaded"
    );

    let nexus = Arc::new(Nexus::connect(&config, Arc::new(TracingAuditSink))?);

    // Recovery completes before any request is served
    let cancel = CancellationToken::new();
    let tasks = nexus.start(&cancel).await?;

    let listener = TcpListener::bind(&config.listen).await?;
    info!("Nexus listening on http://{}", config.listen);

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        shutdown.cancel();
    });

    let serve_cancel = cancel.clone();
    axum::serve(listener, nexus_router(nexus))
        .with_graceful_shutdown(async move { serve_cancel.cancelled().await })
        .await?;

    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            error!("Background task failed: {}", e);
        }
    }

    info!("Nexus stopped");
    Ok(())
}
