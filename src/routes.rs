use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::{handlers, middleware_layer, state::AppState};

/// Largest request body accepted on any route.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Builds the HTTP surface of the identity service.
pub fn router(state: AppState) -> Router {
    let authorize_routes = Router::new()
        .route("/api/v1/user/wxapp/authorize", post(handlers::auth::authorize))
        .route("/api/v1/user/wxapp/login", post(handlers::auth::authorize))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_authorize,
        ))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/v1/user/check-token", get(handlers::auth::check_token))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_token,
        ))
        .with_state(state.clone());

    Router::new()
        .merge(authorize_routes)
        .merge(protected_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
