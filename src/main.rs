use axum::http::{self, header};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tripsplit::{
    ServiceOptions, TripsplitService,
    api::app,
    config::CONFIG,
    infrastructure::{blob::local::LocalBlobStore, cache::in_memory::InMemoryCache, storage::sqlite::SqliteStorage},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&CONFIG.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!(config = ?*CONFIG, "Starting tripsplit");

    // Initialize storage, cache and attachment store
    let storage = SqliteStorage::open(&CONFIG.database_url)?;
    let cache = InMemoryCache::new();
    let blobs = LocalBlobStore::new(&CONFIG.blob_dir);
    let service = Arc::new(TripsplitService::new(
        storage,
        cache,
        blobs,
        CONFIG.jwt_secret.clone(),
        ServiceOptions::from_config(&CONFIG),
    ));

    let app = app(service)
        .layer(CompressionLayer::new()) // Gzip compression
        .layer(TimeoutLayer::new(Duration::from_secs(30))) // 30-second timeout
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    http::Method::GET,
                    http::Method::POST,
                    http::Method::PATCH,
                    http::Method::DELETE,
                ])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        )
        .layer(TraceLayer::new_for_http()); // Request tracing

    // Start server
    let addr = SocketAddr::from(([127, 0, 0, 1], CONFIG.port));
    info!("Server running at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
