use std::net::SocketAddr;
use std::sync::Arc;

use tower_governor::governor::GovernorConfigBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_identity::{
    config::Config,
    crypto::key_store::KeyProvider,
    routes,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");
    match config.token_max_age {
        Some(max_age) => tracing::info!("⌛ Tokens expire after {}s", max_age.as_secs()),
        None => tracing::info!("⌛ Token expiry disabled"),
    }

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    // Make sure the token key exists before the first request races for it
    match state.identity.codec().keys().get_or_create_key().await {
        Ok(key) => {
            tracing::info!("✅ Token key ready - fingerprint: {}", key.fingerprint());
        }
        Err(e) => {
            tracing::error!("❌ Failed to ensure token key exists: {}", e);
            return Err(e.into());
        }
    }

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(20)
            .burst_size(200)
            .use_headers()
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
    );

    let app = routes::router(state.clone())
        .layer(tower_governor::GovernorLayer::new(governor_conf));

    let addr = config.bind_addr;
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
