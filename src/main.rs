use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scoring_api::auth::Authenticator;
use scoring_api::config::Config;
use scoring_api::db::PgBackend;
use scoring_api::handlers::{self, AppState};
use scoring_api::store::ResilientStore;

/// Installs the tracing subscriber, writing to `log_file` when one is configured.
fn init_tracing(log_file: Option<&str>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "scoring_api=info,tower_http=info".into());

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
    Ok(())
}

/// Builds the store handle once; it lives for the whole process.
async fn build_store(config: &Config) -> anyhow::Result<ResilientStore> {
    let settings = config.store_settings();

    if config.store_url.is_none() {
        tracing::warn!("STORE_URL not set, using in-process memory store");
        let store = ResilientStore::in_memory(settings);
        store.connect().await?;
        return Ok(store);
    }

    let backend = PgBackend::new(&settings)?;
    let store = ResilientStore::new(Arc::new(backend.clone()), settings);
    store.connect().await?;
    backend.migrate().await?;
    Ok(store)
}

/// Main entry point for the application.
///
/// Loads configuration, initializes logging, connects the store and serves
/// the API until the process is stopped.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;
    init_tracing(config.log_file.as_deref())?;
    tracing::info!("Configuration loaded successfully");

    let store = build_store(&config).await?;

    let app_state = Arc::new(AppState {
        store: Arc::new(store),
        auth: Authenticator::new(config.auth_salt.clone(), config.admin_salt.clone()),
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
    );

    let app: Router = handlers::router(app_state).layer(
        ServiceBuilder::new()
            // Request size limit: 1MB max payload
            .layer(RequestBodyLimitLayer::new(1024 * 1024))
            // Rate limiting: 10 req/sec per IP, burst of 20
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Starting server at {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutting down");
    })
    .await?;

    Ok(())
}
