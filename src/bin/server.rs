use std::{sync::Arc, time::Duration};

use anyhow::Result;
use dotenvy::dotenv;
use entitled::{
    access::{policy::SpecialAccessPolicy, resolver::Resolver},
    backend::{AppState, identity::RemoteIdentityProvider, router::build_router},
    db::{create_pool, repository::Repository, run_migrations},
    utils::config::ServerConfig,
};
use tokio::{net::TcpListener, signal};
use tower_http::timeout::TimeoutLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let cfg = ServerConfig::load()?;

    let (writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,entitled=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if cfg.log_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(writer),
            )
            .init();
    }

    info!("Starting entitlement verification server");

    let pool = create_pool(&cfg.database_url).await?;
    run_migrations(&pool).await?;

    let repo = Arc::new(Repository::new(Arc::new(pool)));
    let policy = Arc::new(SpecialAccessPolicy::from_config(&cfg.access));
    if policy.is_development() {
        info!("Development mode: every principal resolves to the dev tier");
    }

    let identity = Arc::new(RemoteIdentityProvider::new(
        &cfg.auth_url,
        cfg.auth_api_key.clone(),
        Duration::from_secs(cfg.identity_cache_ttl_secs),
        cfg.identity_cache_max_entries,
    )?);

    let state = Arc::new(AppState::new(Resolver::new(repo, policy), identity));
    let app = build_router(state).layer(TimeoutLayer::new(Duration::from_millis(
        cfg.request_timeout_ms,
    )));

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await?;

    info!("Shutting down gracefully...");

    Ok(())
}
