//! storymap HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storymap_api::{config::ServerConfig, router, AppState};
use storymap_core::{Classifier, KeywordTable, MapStore, StaticStore, StoryMap};
use storymap_db::{Database, PoolConfig};

/// PostgreSQL when reachable, otherwise the static fallback store.
async fn open_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn MapStore>> {
    if let Some(url) = config.database_url.as_deref() {
        match Database::connect_with_config(url, PoolConfig::from_env()).await {
            Ok(db) => {
                if config.run_migrations {
                    info!("Running database migrations...");
                    db.migrate().await?;
                    info!("Database migrations complete");
                }
                let report = db.describe().await?;
                info!(
                    subsystem = "db",
                    shape = %report.shape,
                    stories = report.story_count,
                    pins = report.pin_count,
                    "Database connected"
                );
                if !report.missing_columns.is_empty() {
                    warn!(
                        subsystem = "db",
                        missing = ?report.missing_columns,
                        "Database lacks optional columns; serving legacy shape"
                    );
                }
                return Ok(Arc::new(db));
            }
            Err(e) => {
                warn!(
                    subsystem = "db",
                    error = %e,
                    "Database unavailable; serving static fallback store"
                );
            }
        }
    }

    let store = match config.fallback_data_path.as_deref() {
        Some(path) => StaticStore::from_json_file(path)?,
        None => StaticStore::builtin(),
    };
    info!(
        subsystem = "static",
        origin = store.origin(),
        "Static store selected"
    );
    Ok(Arc::new(store))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "storymap=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "storymap_api=debug,storymap_core=debug,storymap_db=debug,tower_http=debug".into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("storymap-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false)); // no ANSI in files by default
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = ServerConfig::from_env();
    if config.admin_token.is_none() {
        warn!("ADMIN_TOKEN not set; administrator routes will refuse every request");
    }

    let store = open_store(&config).await?;

    let mut map = StoryMap::new(store);
    if let Some(path) = config.keyword_table_path.as_deref() {
        let table = KeywordTable::from_path(path)?;
        info!(
            path = %path.display(),
            rules = table.rules().len(),
            "Keyword table loaded"
        );
        map = map.with_classifier(Classifier::new(table));
    }

    let mut state = AppState::new(map).with_allowed_origins(config.allowed_origins.clone());
    if let Some(token) = config.admin_token.clone() {
        state = state.with_admin_token(token);
    }
    let app = router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
