use std::sync::Arc;

use tracing::{info, info_span, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatvault_db::{
    Database, FilesystemObjectStore, PgConversationRepository, PgMessageRepository,
    PgParticipantRepository, PoolConfig, StorageConfig,
};
use chatvault_core::env::require_env;
use chatvault_ingest::{Cancellation, Collaborators, IngestConfig, IngestionDriver};
use chatvault_jobs::{MediaIngestHandler, MediaIngestionPool, MediaPoolConfig};
use chatvault_remote::HttpMessagingClient;

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
    //   RUST_LOG    - standard env filter (default: "chatvault=info,chatvault_ingest=info,chatvault_jobs=info")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "chatvault=info,chatvault_ingest=info,chatvault_jobs=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("chatvault.log");
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
            let mut layer = tracing_subscriber::fmt::layer().with_writer(non_blocking);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            } else {
                layer = layer.with_ansi(false); // no ANSI in files
            }
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

    let root = info_span!("chatvault");

    // Configuration
    let ingest_config = IngestConfig::from_env()?;
    let pool_config = MediaPoolConfig::from_env()?;
    let db_config = PoolConfig::from_env()?;
    let database_url = require_env("DATABASE_URL")?;

    // Persistence
    let db = Database::connect_with_config(&database_url, db_config).await?;
    db.migrate().await?;
    info!(subsystem = "db", "Database ready");

    let store = FilesystemObjectStore::new(StorageConfig::from_env()?);
    store.validate().await?;
    info!(subsystem = "storage", bucket = store.bucket(), "Object store ready");

    let remote = Arc::new(HttpMessagingClient::from_env()?);
    let messages = Arc::new(PgMessageRepository::new(db.pool.clone()));

    // Media pool
    let handler = Arc::new(MediaIngestHandler::new(
        remote.clone(),
        messages.clone(),
        Arc::new(store),
    ));
    let media = Arc::new(MediaIngestionPool::start(pool_config, handler, &root)?);

    let collaborators = Collaborators {
        remote,
        conversations: Arc::new(PgConversationRepository::new(db.pool.clone())),
        participants: Arc::new(PgParticipantRepository::new(db.pool.clone())),
        messages,
        media: media.clone(),
    };

    let driver = match IngestionDriver::start(collaborators, ingest_config, &root).await {
        Ok(driver) => driver,
        Err(e) => {
            media.shutdown().await;
            return Err(e.into());
        }
    };

    // Cancel on Ctrl+C
    let (stop, cancel) = Cancellation::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                let _ = stop.send(true);
            }
            Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    let result = driver.run(cancel).await;

    // No new jobs after this point; in-flight ones finish.
    media.shutdown().await;
    db.pool.close().await;
    info!("chatvault stopped");

    result.map_err(Into::into)
}
