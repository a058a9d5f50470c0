use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use moviemaster_api::auth::Verifier;
use moviemaster_api::config::AppConfig;
use moviemaster_api::database::ConnectionManager;
use moviemaster_api::AppState;

#[derive(Parser, Debug)]
#[command(name = "moviemaster-api", version, about = "MovieMaster API server")]
struct Args {
    /// Address to bind (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, FIREBASE_SERVICE_ACCOUNT, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = AppConfig::from_env();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    tracing::info!("Starting MovieMaster API in {:?} mode", config.environment);

    let verifier = Verifier::initialize(&config).context("failed to initialize token verifier")?;

    let connections = ConnectionManager::from_url(config.database.url.clone());
    if config.is_production() {
        connections
            .get()
            .await
            .context("failed to connect to the document store")?;
    }

    let state = AppState::new(connections, verifier);
    let app = moviemaster_api::app(state, &config.security);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Server: http://{}", bind_addr);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
