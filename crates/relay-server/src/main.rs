//! relayd - Alertmanager webhook receiver with threaded Google Chat delivery.

mod config;
mod server;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use metrics_exporter_prometheus::PrometheusBuilder;
use relay::{metrics::describe_metrics, DispatchMetrics, Notifier};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::server::{build_router, AppState};

/// relayd - Relay Alertmanager alerts to chat rooms, one thread per alert.
#[derive(Parser)]
#[command(name = "relayd")]
#[command(about = "Alertmanager webhook receiver with threaded Google Chat delivery")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, env = "RELAY_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let config = Config::load(&cli.config)?;

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    describe_metrics();

    let metrics = Arc::new(DispatchMetrics::new());
    let providers = config.build_providers(&metrics)?;
    let notifier = Arc::new(Notifier::new(providers));
    info!(rooms = ?notifier.rooms(), "Providers ready");

    let state = Arc::new(AppState {
        notifier: Arc::clone(&notifier),
        prometheus,
    });
    let app = build_router(state, config.app.body_limit_bytes);

    let listener = TcpListener::bind(&config.app.address)
        .await
        .with_context(|| format!("Failed to bind {}", config.app.address))?;
    info!(address = %config.app.address, "Listening for alert webhooks");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    notifier.shutdown();
    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_filter = if verbose {
        "relay=debug,relayd=debug,tower_http=debug,info"
    } else {
        "relay=info,relayd=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
