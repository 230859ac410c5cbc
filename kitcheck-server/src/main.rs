//! kitcheck-server - checklist audit service
//!
//! Records submitted equipment checklists, notifies supervisors, and serves
//! the dashboard and export.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use kitcheck_common::config::{resolve_database_path, ConfigOverrides, TomlConfig};
use kitcheck_common::db::init_database;
use kitcheck_common::Settings;
use kitcheck_server::{build_router, AppState};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for kitcheck-server
#[derive(Parser, Debug)]
#[command(name = "kitcheck-server")]
#[command(about = "Equipment checklist audit service")]
#[command(version)]
struct Args {
    /// Bootstrap TOML configuration file
    #[arg(short, long, default_value = "kitcheck.toml", env = "KITCHECK_CONFIG")]
    config: PathBuf,

    /// Port to listen on (overrides TOML)
    #[arg(short, long, env = "KITCHECK_PORT")]
    port: Option<u16>,

    /// SQLite database file (overrides TOML)
    #[arg(short, long, env = "KITCHECK_DATABASE")]
    database: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            database_path: self.database.clone(),
            port: self.port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Read before tracing starts so the TOML log level can seed the filter
    let config_found = args.config.exists();
    let toml = TomlConfig::load_or_default(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    let default_filter = format!(
        "kitcheck_server={level},kitcheck_common={level},tower_http={level}",
        level = toml.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Build identification first, before any database delay
    info!(
        "Starting kitcheck-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if config_found {
        info!("Configuration: {}", args.config.display());
    } else {
        warn!(
            "Config file {} not found, using built-in defaults",
            args.config.display()
        );
    }

    let overrides = args.overrides();
    let db_path = resolve_database_path(overrides.database_path.as_deref(), &toml);
    info!("Database path: {}", db_path.display());

    let db = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let settings = Settings::load(&db)
        .await
        .context("Failed to load runtime settings")?;
    if settings.notification.destinations.is_empty() {
        warn!("No email_destination configured; notifications will be skipped");
    }

    let state = AppState::new(db, settings).context("Failed to build application state")?;
    let app = build_router(state);

    let port = overrides.port.unwrap_or(toml.port);
    let addr: SocketAddr = format!("{}:{}", toml.bind_addr, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", toml.bind_addr, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("kitcheck-server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
