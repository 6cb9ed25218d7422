//! Router assembly: mounts the health, ticket, and WebSocket routers and
//! applies the global layer stack.

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::post;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::http::ticket;
use crate::state::AppState;
use crate::ws;

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

pub fn build(state: AppState) -> Router {
    let ticket_body_limit = state.config.ws.ticket_max_kubeconfig_bytes + 16 * 1024;

    let router = Router::new()
        .merge(crate::http::health::router())
        .route("/ws-ticket", post(ticket::create_ticket))
        .layer(DefaultBodyLimit::max(ticket_body_limit))
        .merge(ws::router());

    apply_global_layers(router, &state)
}

/// The HTTP surface's CORS policy is unconditionally
/// `Access-Control-Allow-Origin: *`, independent of `ws.allowed_origins`
/// (which governs the *WebSocket* origin check in `ws::origin_allowed`, a
/// separate concern). `/ws-ticket` carries no credentials cookie-side, so a
/// wildcard origin is the intended policy here.
fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(600))
}

fn apply_global_layers(router: Router<AppState>, state: &AppState) -> Router {
    router
        .layer(build_cors_layer())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone())
}
