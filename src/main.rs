use anyhow::anyhow;
use tokio::net::TcpListener;
use tracing::info;

use ringdown::{AppState, ServerConfig, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ringdown=info,tower_http=info".into()),
        )
        .init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // Load configuration; a missing required key is a fatal startup error
    let config = ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?;
    let address = config.address();

    // Create application state
    let app_state = AppState::new(config).map_err(|e| anyhow!(e.to_string()))?;

    info!(
        %address,
        provider = app_state.config.provider.as_str(),
        "Starting call orchestrator"
    );

    let app = routes::create_router().with_state(app_state);

    let listener = TcpListener::bind(&address).await?;

    info!(%address, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
