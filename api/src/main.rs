use std::net::SocketAddr;

use shieldwall_core::assets::LibraryAssetResolver;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod middleware;
mod routes;
mod state;

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shieldwall_api=debug,shieldwall_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let settings = config::Settings::from_env();

    let libraries = match &settings.libraries_path {
        Some(path) => std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("Failed to read {}: {e}", path.display())),
        None => config::DEFAULT_LIBRARIES.to_string(),
    };
    let resolver =
        LibraryAssetResolver::from_json(&libraries).expect("Library definitions must be valid JSON");

    tracing::info!(
        libraries = resolver.len(),
        csp_enabled = settings.csp_enabled,
        nonce_policy = ?settings.nonce_policy,
        asset_root = %settings.asset_root.display(),
        "CSP policy configured"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let app = routes::app(state::AppState::new(settings, resolver));

    tracing::info!("Shieldwall listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
