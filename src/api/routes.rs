//! REST API routes configuration

use crate::api::handlers::{self, ApiState};
use crate::api::websocket::ws_handler;
use axum::{
    body::Body,
    http::{header, StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Fallback handler: JSON 404 for unknown routes
async fn fallback_handler(uri: Uri) -> impl IntoResponse {
    log::debug!("No route for {}", uri.path());
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "application/json")],
        Body::from(r#"{"error":"Not Found"}"#),
    )
        .into_response()
}

/// Create the API router with all routes
pub fn create_router(state: ApiState) -> Router {
    // Configure CORS for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // WebSocket for real-time events
        .route("/ws", get(ws_handler))
        // Accounts
        .route(
            "/api/accounts/{address}/fund",
            post(handlers::fund_account),
        )
        .route(
            "/api/accounts/{address}/balance",
            get(handlers::get_balance),
        )
        // Factories
        .route("/api/factories", post(handlers::deploy_factory))
        .route("/api/factories/{address}", get(handlers::get_factory))
        .route(
            "/api/factories/{address}/wallets",
            post(handlers::create_wallet),
        )
        // Wallets
        .route("/api/wallets", get(handlers::list_wallets))
        .route("/api/wallets/{address}", get(handlers::get_wallet))
        .route("/api/wallets/{address}/propose", post(handlers::propose))
        .route("/api/wallets/{address}/confirm", post(handlers::confirm))
        .route("/api/wallets/{address}/execute", post(handlers::execute))
        .route(
            "/api/wallets/{address}/transactions/{id}",
            get(handlers::get_transaction),
        )
        .route("/api/wallets/{address}/events", get(handlers::get_events))
        .fallback(fallback_handler)
        // Add state and middleware
        .with_state(state)
        .layer(cors)
}
