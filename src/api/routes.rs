use axum::{
    extract::Request,
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::Level;

use crate::api::handlers::{dormitories, fleet, health, scrape, AppState};

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/api/dormitories",
            get(dormitories::list_dormitories).post(dormitories::register_dormitory),
        )
        .route("/api/dormitories/{id}/latest", get(dormitories::get_latest))
        .route("/api/dormitories/{id}/history", get(dormitories::get_history))
        .route("/api/dormitories/{id}/hourly", get(dormitories::get_hourly))
        .route("/api/dormitories/{id}/daily", get(dormitories::get_daily))
        .route("/api/dormitories/{id}/summary", get(dormitories::get_summary))
        .route(
            "/api/dormitories/{id}/credentials",
            put(dormitories::update_credentials),
        )
        .route("/api/comparison", get(fleet::get_comparison))
        .route("/api/stats", get(fleet::get_stats))
        .route("/api/scrape", post(scrape::trigger_scrape))
        .route("/api/health", get(health::health));

    api_routes
        .with_state(state)
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
                .on_request(|_request: &Request, _span: &tracing::Span| {
                    tracing::event!(Level::DEBUG, "received request");
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
                )
                .on_failure(
                    |_error: tower_http::classify::ServerErrorsFailureClass,
                     _latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::event!(Level::ERROR, "request failed");
                    },
                ),
        )
}
