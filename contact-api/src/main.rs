use contact_api::config::Config;
use std::net::Ipv4Addr;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            warn!("Ignoring unreadable .env file: {error}");
        }
    }

    let config = Config::from_env()?;
    info!("Starting API server on port {}", config.port);
    info!("Allowed origins: {:?}", config.allowed_origins);
    if config.turnstile.secret.is_none() {
        warn!("TURNSTILE_SECRET_KEY not set, skipping bot verification");
    }
    if let Err(error) = config.postmark.delivery() {
        warn!("Contact form submissions will fail until email is configured: {error}");
    }

    let router = contact_api::router(&config)?;
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.port)).await?;
    contact_api::serve(listener, router).await
}
