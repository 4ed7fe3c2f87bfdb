//! Cadex API server entry point.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use cadex_api::config::ServerConfig;
use cadex_api::error::AppError;
use cadex_api::state::AppState;
use cadex_api::{build_router, telemetry};
use cadex_core::rng::{DeterministicRng, SystemRng};
use cadex_core::store::DocumentStore;
use cadex_store::memory::InMemoryDocumentStore;
use cadex_store::pg_document_store::PgDocumentStore;
use cadex_story::application::reconciler::spawn_reconciler;
use cadex_story::domain::codec::PrivacyCodec;

async fn open_store(config: &ServerConfig) -> Result<Arc<dyn DocumentStore>, AppError> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::info!("DATABASE_URL not set; using the in-memory store");
        return Ok(Arc::new(InMemoryDocumentStore::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    let store = PgDocumentStore::new(pool);
    store.ensure_schema().await?;
    tracing::info!("connected to PostgreSQL document store");
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = ServerConfig::from_env()?;
    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    tracing::info!(?config, "Starting Cadex API server");

    let store = open_store(&config).await?;
    let codec = Arc::new(PrivacyCodec::new(config.secret.clone()));
    let rng: Arc<Mutex<dyn DeterministicRng + Send>> = Arc::new(Mutex::new(SystemRng::new()));
    let reconciler = spawn_reconciler(Arc::clone(&store), Arc::clone(&codec));

    let app_state = AppState::new(store, codec, rng, config.retry_policy());

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = build_router(app_state)
        .layer(TraceLayer::new_for_http().make_span_with(telemetry::request_span::<Body>))
        .layer(CorsLayer::permissive());

    let addr = config.socket_addr()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app).await;

    reconciler.abort();
    telemetry.shutdown();
    served?;
    Ok(())
}
