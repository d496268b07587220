use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

/// Default WeChat code2session endpoint.
pub const DEFAULT_WX_APP_URL: &str = "https://api.weixin.qq.com/sns/jscode2session";

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// The WeChat code2session endpoint.
    pub wx_app_url: String,
    /// The mini-program app id.
    pub wx_app_id: String,
    /// The mini-program app secret.
    pub wx_app_secret: Zeroizing<String>,
    /// Maximum token age. `None` means tokens stay valid while the key is unchanged.
    pub token_max_age: Option<Duration>,
    /// Authorize attempts allowed per client IP per minute.
    pub authorize_rate_limit: u32,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let token_max_age = match env::var("TOKEN_MAX_AGE_SECS") {
            Ok(raw) if !raw.trim().is_empty() => {
                let secs: u64 = raw.trim().parse().context("Invalid TOKEN_MAX_AGE_SECS")?;
                if secs == 0 {
                    anyhow::bail!("TOKEN_MAX_AGE_SECS must be greater than zero when set");
                }
                Some(Duration::from_secs(secs))
            }
            _ => None,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
                .parse()
                .context("Invalid BIND_ADDR")?,
            wx_app_url: env::var("WX_APP_URL")
                .unwrap_or_else(|_| DEFAULT_WX_APP_URL.to_string()),
            wx_app_id: env::var("WX_APP_ID")
                .context("WX_APP_ID must be set")?,
            wx_app_secret: Zeroizing::new(
                env::var("WX_APP_SECRET").context("WX_APP_SECRET must be set")?,
            ),
            token_max_age,
            authorize_rate_limit: env::var("AUTHORIZE_RATE_LIMIT")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("Invalid AUTHORIZE_RATE_LIMIT")?,
        })
    }
}
