use anyhow::Context;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use app_config::{AppConfig, LoggingConfig, SentryConfig};
use app_database::db_connect::initialize_user_db;
use app_error::{AppError, AppErrorExt};
use micro_user::{AppState, create_routes};

fn init_sentry(config: &SentryConfig) -> Option<sentry::ClientInitGuard> {
    if config.dsn.trim().is_empty() {
        return None;
    }

    Some(sentry::init((
        config.dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(config.environment.clone().into()),
            sample_rate: config.sample_rate,
            traces_sample_rate: config.traces_sample_rate,
            ..Default::default()
        },
    )))
}

fn init_tracing(config: &LoggingConfig) -> Result<(), AppError> {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Invalid log filter")
        .config_err()?;

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(sentry_tracing::layer());

    let initialized = if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    initialized
        .context("Failed to set tracing subscriber")
        .config_err()
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::load()?;

    let _sentry = init_sentry(&config.monitoring.sentry);
    init_tracing(&config.monitoring.logging)?;

    info!(
        environment = %config.environment,
        "Starting user service at {}",
        chrono::Utc::now()
    );

    let db = initialize_user_db(&config.database).await?;

    let address = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::initialize(config, db).await?;
    state.bootstrap().await?;

    let app = create_routes(state);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to address: {}", address))
        .server_err()?;

    info!("Listening on http://{}", address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")
    .server_err()?;

    Ok(())
}
