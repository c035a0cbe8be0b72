use relay_server::app;
use relay_server::config::ServerConfig;
use relay_server::error::ServerError;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        eprintln!("Relay server failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ServerError> {
    let config = ServerConfig::from_env()?;

    // Validate configuration before binding
    config.validate()?;

    let listen_addr = config.listen_addr();
    let listener = TcpListener::bind(&listen_addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: listen_addr.clone(),
            source,
        })?;

    tracing::info!("Starting relay server on {}", listen_addr);
    println!("Relay server listening on {}", listen_addr);

    app::run(listener, config, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
