use crate::state::AppState;
use crate::{api, gateway, logging};
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};

pub fn build_http_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/health", get(api::get_health))
        .route("/v1/alerts/active", get(api::get_active_alerts))
        .route("/v1/alerts/:id/acknowledge", post(api::acknowledge_alert))
        .route("/v1/trends", get(api::get_trends))
        .route("/v1/forecasts", get(api::get_forecasts))
        .route(
            "/v1/operations/:operation/metrics",
            get(api::get_operation_metrics),
        )
        .route("/v1/sessions/:session_id/metrics", get(api::get_session_metrics))
        .route("/v1/stream", get(gateway::ws_handler))
        .with_state(state)
        .layer(cors)
        .layer(middleware::from_fn(logging::request_logging))
}
