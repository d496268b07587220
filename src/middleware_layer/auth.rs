use axum::{
    body::Body,
    extract::{Query, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{
    error::{AppError, MSG_INVALID_TOKEN},
    models::subject::Subject,
    state::AppState,
};

/// Header carrying the bearer token.
pub const TOKEN_HEADER: &str = "x-token";

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Extracts the token from the `X-Token` header, falling back to the
/// `token` query parameter.
///
/// # Arguments
///
/// * `request` - The incoming request.
///
/// # Returns
///
/// An `Option` containing the token if one was presented.
fn extract_token(request: &Request<Body>) -> Option<String> {
    if let Some(value) = request.headers().get(TOKEN_HEADER) {
        return value
            .to_str()
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
    }

    Query::<TokenQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

/// A middleware that requires a token resolving to a subject id.
///
/// On success the `Subject` is inserted into the request extensions. Every
/// failure yields the same 401 response.
pub async fn require_token(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    tracing::debug!("🔐 Checking token...");

    let Some(token) = extract_token(&request) else {
        tracing::warn!("❌ No token presented");
        return AppError::Authentication(MSG_INVALID_TOKEN.to_string()).into_response();
    };

    let subject_id = match state.identity.resolve_token(&token).await {
        Ok(subject_id) => subject_id,
        Err(e) => return e.into_response(),
    };

    request.extensions_mut().insert(Subject(subject_id));

    next.run(request).await
}
