use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;

use crate::{error::AppError, state::AppState};

/// Length of one authorize rate-limit window, in seconds.
const AUTHORIZE_WINDOW_SECS: i64 = 60;

/// Extracts the real IP address from the request extensions.
///
/// # Arguments
///
/// * `req` - The incoming request.
///
/// # Returns
///
/// The IP address as a string, or "unknown" if not found.
fn extract_real_ip(req: &Request<Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Counts one attempt against `key` and returns `(attempts, ttl_secs)`.
///
/// `INCR` and `TTL` run as one atomic pipeline. A counter without an expiry,
/// whether just created or left behind by an earlier failed `EXPIRE`, gets
/// a fresh `window_secs` window.
pub async fn count_attempt(
    conn: &mut ConnectionManager,
    key: &str,
    window_secs: i64,
) -> redis::RedisResult<(i64, i64)> {
    let (count, ttl): (i64, i64) = redis::pipe()
        .atomic()
        .cmd("INCR")
        .arg(key)
        .cmd("TTL")
        .arg(key)
        .query_async(conn)
        .await?;

    if ttl < 0 {
        let _: () = redis::cmd("EXPIRE")
            .arg(key)
            .arg(window_secs)
            .query_async(conn)
            .await?;
        return Ok((count, window_secs));
    }

    Ok((count, ttl))
}

/// A middleware that rate limits authorize attempts per client IP.
///
/// Counters live in Redis under `rate_limit:authorize:<ip>` with a one-minute
/// window. Redis failures are logged and let the request through.
pub async fn rate_limit_authorize(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(conn) = state.redis.as_ref() else {
        return next.run(req).await;
    };

    let ip = extract_real_ip(&req);
    let key = format!("rate_limit:authorize:{}", ip);

    match count_attempt(&mut conn.clone(), &key, AUTHORIZE_WINDOW_SECS).await {
        Ok((attempts, ttl)) if attempts > i64::from(state.config.authorize_rate_limit) => {
            tracing::warn!("🚫 Authorize rate limit hit for {}", ip);
            return AppError::RateLimitExceeded(format!(
                "Too many authorize attempts. Try again in {} seconds",
                ttl.max(1)
            ))
            .into_response();
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!("⚠️  Authorize rate limit check failed for {}: {}", ip, e);
        }
    }

    next.run(req).await
}
