use crate::api::handlers::{health, telemetry};
use crate::api::SharedState;
use axum::{extract::Request, routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing::Level;

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/telemetry", get(telemetry::get_latest))
        .route("/api/telemetry/weekly", get(telemetry::get_weekly))
        .route("/api/telemetry/monthly", get(telemetry::get_monthly))
        .with_state(state)
        // The dashboard is served from a different origin.
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    tracing::span!(
                        Level::INFO,
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(
                    |response: &axum::response::Response,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::event!(
                            Level::INFO,
                            status = response.status().as_u16(),
                            latency = ?latency,
                            "request completed"
                        );
                    },
                ),
        )
}
