use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use http::{Method, header::CONTENT_TYPE};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use voice_relay::{
    ServerConfig,
    core::{
        realtime::OpenAIRealtimeConnector,
        session::SessionManager,
        tools::{HttpRetrievalEngine, RetrievalEngine},
        transport::{LiveKitTokenIssuer, LiveKitTransport, TokenIssuer},
    },
    routes,
    state::AppState,
};

/// Voice relay - LiveKit room audio to the OpenAI Realtime model
#[derive(Parser, Debug)]
#[command(name = "voice-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    // Must be installed before any TLS connection is attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let config = if let Some(config_path) = cli.config {
        println!("Loading configuration from {}", config_path.display());
        ServerConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    let (api_key, api_secret) = config.livekit_credentials().map_err(|e| anyhow!(e))?;
    let tokens: Arc<dyn TokenIssuer> = Arc::new(
        LiveKitTokenIssuer::new(api_key, api_secret).map_err(|e| anyhow!(e.to_string()))?,
    );

    let model = OpenAIRealtimeConnector::new(config.openai_api_key().map_err(|e| anyhow!(e))?)
        .map_err(|e| anyhow!(e.to_string()))?
        .with_event_queue_warn_depth(config.relay.event_queue_warn_depth);

    let retrieval: Arc<dyn RetrievalEngine> = Arc::new(
        HttpRetrievalEngine::new(config.retrieval_url.clone())
            .map_err(|e| anyhow!(e.to_string()))?
            .with_timeout(config.retrieval_timeout()),
    );

    let transport = LiveKitTransport::new(config.transport_config());

    let sessions = Arc::new(SessionManager::new(
        Arc::new(transport),
        Arc::new(model),
        retrieval.clone(),
        tokens.clone(),
        config.relay_config(),
    ));

    info!(
        livekit_url = %config.livekit_url,
        model = %config.openai_model,
        voice = %config.openai_voice,
        profile = %config.relay.profile,
        retrieval_url = %config.retrieval_url,
        "Relay configured"
    );

    let address = config.address();
    println!("Starting server on {address}");

    let app_state = AppState::new(config, sessions.clone(), tokens, retrieval);

    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(false);

    let app = routes::create_router(app_state).layer(cors_layer);

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    println!("Server listening on http://{}", socket_addr);

    let listener = TcpListener::bind(&socket_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sessions.shutdown().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
