use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{blueprints, health, sessions, studio_ws};

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/studio/health", get(health::health_endpoint))
        .route(
            "/api/studio/sessions",
            get(sessions::list_sessions_endpoint).post(sessions::create_session_endpoint),
        )
        .route(
            "/api/studio/sessions/{session_id}",
            get(sessions::get_session_endpoint),
        )
        .route(
            "/api/studio/sessions/{session_id}/executions",
            get(sessions::list_executions_endpoint),
        )
        .route(
            "/api/studio/sessions/{session_id}/start",
            post(sessions::start_session_endpoint),
        )
        .route(
            "/api/studio/blueprints/{blueprint_id}",
            get(blueprints::get_blueprint_endpoint),
        )
        .route("/api/studio/analytics", get(sessions::analytics_endpoint))
        .route(
            "/api/studio/ws/{session_id}",
            get(studio_ws::studio_ws_endpoint),
        )
        .route("/api/logs", get(super::sse_logs_endpoint))
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(state.api_port))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'self'"),
    );
    response
}
