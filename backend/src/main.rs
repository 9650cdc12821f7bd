mod api;
mod clock;
mod db;
mod errors;
mod jobs;
mod models;
mod registry;
mod state;
mod store;
mod verifier;

use crate::clock::SystemClock;
use crate::errors::ApiError;
use crate::state::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // Local state under backend/data (ignored by git). Only commitments,
    // proof bundles and the activity log land here; plaintext records
    // stay in memory, in holder custody.
    let data_dir = PathBuf::from("data");
    std::fs::create_dir_all(&data_dir).map_err(|_| ApiError::Internal)?;

    let db_path = data_dir.join("registry.sqlite");
    let db_url = format!("sqlite:{}", db_path.to_string_lossy());

    let db = db::connect(&db_url).await?;
    db::init_schema(&db).await?;

    let state = AppState::new(db, data_dir, Arc::new(SystemClock::new()));

    // Run the trusted setup up front so the first issuance doesn't pay
    // for it.
    state.ensure_keys().await?;

    let app = api::router(state);

    let addr = std::env::var("BACKEND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|_| ApiError::Internal)?;

    tracing::info!(%addr, "proof engine listening");

    axum::serve(listener, app).await.map_err(|_| ApiError::Internal)?;

    Ok(())
}
