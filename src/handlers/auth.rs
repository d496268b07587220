use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result, CODE_SUCCESS},
    models::subject::Subject,
    state::AppState,
};

/// The request payload for mini-program authorization.
#[derive(Deserialize, Debug, Validate)]
pub struct AuthorizeRequest {
    /// One-time login code from `wx.login()`.
    #[garde(length(min = 1, max = 128))]
    pub code: String,
}

/// The storefront response envelope.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: &'static str,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: CODE_SUCCESS,
            msg: "success",
            data,
        }
    }
}

/// The payload returned by a successful authorization.
#[derive(Serialize)]
pub struct AuthorizeData {
    pub token: String,
    pub uid: String,
}

/// The payload returned for a valid token.
#[derive(Serialize)]
pub struct CheckTokenData {
    pub uid: String,
}

/// Exchanges a mini-program login code for a bearer token.
///
/// Body rejections are reported in the storefront envelope like any other
/// parameter error.
#[axum::debug_handler]
pub async fn authorize(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AuthorizeRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(payload) = payload?;

    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    tracing::info!("🔐 Authorize attempt");

    let session = state.wechat.code_to_session(&payload.code).await?;
    let token = state
        .identity
        .issue_token(&session.openid, &session.session_key)
        .await?;

    tracing::info!("✅ Subject authorized: {}", session.openid);

    let response = ApiResponse::success(AuthorizeData {
        token,
        uid: session.openid,
    });

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Confirms the presented token resolves; runs behind `require_token`.
#[axum::debug_handler]
pub async fn check_token(Extension(subject): Extension<Subject>) -> Result<Response> {
    tracing::debug!("✅ Token check passed for {}", subject.as_str());

    let response = ApiResponse::success(CheckTokenData { uid: subject.0 });

    Ok((StatusCode::OK, Json(response)).into_response())
}
