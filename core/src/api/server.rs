//! API server initialization (§6)

use std::net::SocketAddr;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::routes::{conversations, health, indexing};
use super::types::ApiError;
use crate::core::app::AppState;
use crate::core::constants::INGEST_BODY_LIMIT;
use crate::core::shutdown::ShutdownService;

pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router and serve until `shutdown` fires, draining
    /// in-flight requests within the grace window (§5 Concurrency model).
    pub async fn serve(self, host: &str, port: u16, shutdown: ShutdownService) -> Result<()> {
        let addr = SocketAddr::new(host.parse()?, port);

        let router = Router::new()
            .route("/v1/health", get(health::health))
            .route("/v1/indexing/batch/start", post(indexing::start_batch))
            .route(
                "/v1/indexing/batch/status/{repository}",
                get(indexing::batch_status),
            )
            .route(
                "/v1/conversations/queue",
                post(conversations::queue_conversation),
            )
            .route(
                "/v1/conversations/metrics",
                get(conversations::conversation_metrics),
            )
            .fallback(handle_404)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(DefaultBodyLimit::max(INGEST_BODY_LIMIT))
            .with_state(self.state);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        Ok(())
    }
}

async fn handle_404() -> ApiError {
    ApiError::not_found("NOT_FOUND", "the requested resource does not exist")
}
