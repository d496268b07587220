use std::sync::Arc;

use redis::aio::ConnectionManager;

use crate::config::Config;
use crate::crypto::key_store::{KeyBackend, PgKeyStore};
use crate::crypto::token::TokenCodec;
use crate::error::Result;
use crate::repositories::session_record::{PgSessionRecordStore, RecordBackend};
use crate::services::identity::{AppIdentity, IdentityService};
use crate::services::wechat::WechatClient;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// Token issuing and resolution.
    pub identity: Arc<AppIdentity>,
    /// The WeChat code2session client.
    pub wechat: WechatClient,
    /// The Redis connection manager. Rate limiting is skipped without it.
    pub redis: Option<ConnectionManager>,
}

impl AppState {
    /// Creates a new `AppState` backed by PostgreSQL and Redis.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        crate::db::ensure_schema(&db).await?;
        tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("✅ Redis Connection Manager initialized");

        let codec = TokenCodec::new(KeyBackend::Postgres(PgKeyStore::new(db.clone())))
            .with_max_age(config.token_max_age);
        let identity = IdentityService::new(
            codec,
            RecordBackend::Postgres(PgSessionRecordStore::new(db)),
        );
        tracing::info!("✅ Identity service initialized");

        let wechat = WechatClient::new(config)?;

        Ok(Self::from_parts(config.clone(), identity, wechat, Some(redis)))
    }

    /// Assembles an `AppState` from already-built parts.
    pub fn from_parts(
        config: Config,
        identity: AppIdentity,
        wechat: WechatClient,
        redis: Option<ConnectionManager>,
    ) -> Self {
        Self {
            config,
            identity: Arc::new(identity),
            wechat,
            redis,
        }
    }
}
