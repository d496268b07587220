use std::time::Duration;

use serde::Deserialize;
use zeroize::Zeroizing;

use crate::config::Config;
use crate::error::{AppError, Result};

/// Upper bound on a single code2session round trip.
const WX_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct Code2SessionResponse {
    openid: Option<String>,
    session_key: Option<String>,
    #[serde(default)]
    errcode: i64,
    errmsg: Option<String>,
}

/// The identity WeChat vouched for.
pub struct WxSession {
    /// Subject id of the user within this mini-program.
    pub openid: String,
    /// Short-lived provider session secret.
    pub session_key: Zeroizing<String>,
}

/// Client for the WeChat mini-program `code2session` exchange.
#[derive(Clone)]
pub struct WechatClient {
    http: reqwest::Client,
    url: String,
    app_id: String,
    app_secret: Zeroizing<String>,
}

impl WechatClient {
    /// Creates a new `WechatClient` from the app credentials in `config`.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(WX_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http,
            url: config.wx_app_url.clone(),
            app_id: config.wx_app_id.clone(),
            app_secret: config.wx_app_secret.clone(),
        })
    }

    /// Exchanges a login `code` from the mini-program for the user's openid
    /// and session key.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `WxSession`, or `AppError::WxFailed` for any
    /// transport failure, non-200 status, non-zero `errcode`, or missing field.
    pub async fn code_to_session(&self, code: &str) -> Result<WxSession> {
        let response = self
            .http
            .get(&self.url)
            .query(&[
                ("appid", self.app_id.as_str()),
                ("secret", self.app_secret.as_str()),
                ("js_code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::WxFailed(format!("request failed: {}", e.without_url())))?;

        if !response.status().is_success() {
            return Err(AppError::WxFailed(format!("unexpected status {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::WxFailed(format!("body read failed: {}", e.without_url())))?;

        let parsed: Code2SessionResponse = sonic_rs::from_str(&body)
            .map_err(|e| AppError::WxFailed(format!("invalid response body: {}", e)))?;

        if parsed.errcode != 0 {
            return Err(AppError::WxFailed(format!(
                "errcode {}: {}",
                parsed.errcode,
                parsed.errmsg.unwrap_or_default()
            )));
        }

        match (parsed.openid, parsed.session_key) {
            (Some(openid), Some(session_key)) if !openid.is_empty() && !session_key.is_empty() => {
                tracing::debug!("✅ code2session succeeded for {}", openid);
                Ok(WxSession {
                    openid,
                    session_key: Zeroizing::new(session_key),
                })
            }
            _ => Err(AppError::WxFailed("missing openid or session_key".to_string())),
        }
    }
}
