use spike::{
    config::KeeperConfig,
    keeper::{keeper_router, KeeperState},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spike=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting SPIKE Keeper v{}", env!("CARGO_PKG_VERSION"));

    let config = KeeperConfig::load()?;
    if config.trusted_nexus.is_empty() {
        error!("No trusted Nexus identity configured!");
        error!("Set trusted_nexus in config/keeper.toml or SPIKE_KEEPER__TRUSTED_NEXUS");
        return Err(anyhow::anyhow!("trusted_nexus is empty"));
    }

    let state = Arc::new(KeeperState::new(config.trusted_nexus.clone()));
    let listener = TcpListener::bind(&config.listen).await?;
    info!("Keeper listening on http://{}", config.listen);

    axum::serve(listener, keeper_router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await?;

    // Held key is zeroized as the state drops
    info!("Keeper stopped");
    Ok(())
}
