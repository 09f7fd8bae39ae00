use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mindhaven::api::rate_limit::spawn_cleanup_task;
use mindhaven::config::Config;
use mindhaven::AppState;

#[derive(Parser, Debug)]
#[command(name = "mindhaven")]
#[command(author, version, about = "Counselling bookings and self-assessments API", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "MINDHAVEN_CONFIG", default_value = "mindhaven.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long, env = "MINDHAVEN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Override the listen address
    #[arg(long, env = "MINDHAVEN_HOST")]
    host: Option<String>,

    /// Override the listen port
    #[arg(short, long, env = "MINDHAVEN_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting MindHaven v{}", env!("CARGO_PKG_VERSION"));

    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.server.data_dir.display()
        )
    })?;

    let db = mindhaven::db::init(&config.server.data_dir).await?;

    mindhaven::api::auth::ensure_admin_user(
        &db,
        &config.auth.admin_email,
        config.auth.admin_password.as_deref(),
    )
    .await?;

    let metrics_handle =
        mindhaven::api::metrics::init_metrics().context("Failed to install metrics recorder")?;

    let state = AppState::new(config.clone(), db).with_metrics(metrics_handle);
    let state = Arc::new(state);

    if config.rate_limit.enabled {
        spawn_cleanup_task(state.rate_limiter.clone(), config.rate_limit.cleanup_interval);
    }

    let app = mindhaven::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("API server listening on http://{}", addr);
    tracing::info!("Admin token: {}", config.auth.admin_token);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
