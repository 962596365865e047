// Controle Financeiro - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use controle_financeiro::api::{router, AppState};
use controle_financeiro::{setup_database, Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    // Open database
    let conn = Connection::open(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path))?;
    setup_database(&conn)?;
    info!(path = %config.database_path, "database ready");

    let port = config.port;
    let state = AppState::new(Arc::new(Mutex::new(conn)), config);

    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("server running on http://{}", addr);
    info!("API: http://localhost:{}/api/health", port);

    axum::serve(listener, app).await.context("server stopped")?;
    Ok(())
}
