pub mod config;
pub mod contact;
pub mod email;
pub mod postmark;
pub mod turnstile;
pub mod validation;

use axum::{
    http::{header, Method, StatusCode},
    routing::get,
    Json, Router,
};
use config::Config;
use contact::ContactFormHandler;
use reqwest::Client;
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Builds the complete HTTP application: routes, CORS and request tracing.
pub fn router(config: &Config) -> anyhow::Result<Router> {
    let client = Client::builder().user_agent(USER_AGENT).build()?;
    let handler = Arc::new(ContactFormHandler::new(config, client));
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(config.origin_header_values()?))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);
    Ok(Router::new()
        .route("/api/health", get(health).options(accept_options))
        .merge(contact::router(handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

/// Serves `router` on `listener` until Ctrl-C or SIGTERM.
pub async fn serve(listener: TcpListener, router: Router) -> anyhow::Result<()> {
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Answers `OPTIONS` requests that are not CORS preflights, which `CorsLayer` leaves to the routes.
async fn accept_options() -> StatusCode {
    StatusCode::OK
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutting down");
}
