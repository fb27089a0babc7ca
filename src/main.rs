use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{
    guestbook::GuestbookService,
    health::{self, HealthState, PROBE_INTERVAL},
    object_store::ObjectStore,
    record_store::RecordStore,
};
use state::AppState;

/// Startup budget for reaching the object store. Exhausting it is fatal:
/// the process exits rather than serving with no store behind it.
const BUCKET_RETRY_ATTEMPTS: u32 = 5;
const BUCKET_RETRY_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;
    tracing::info!("Starting guestbook-media with config: {:?}", cfg);

    // --- Ensure object storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    // SQLx will not create the database file itself.
    match fs::OpenOptions::new().create(true).write(true).open(db_path) {
        Ok(_) => tracing::debug!("database file ready at {}", db_path),
        Err(err) => tracing::warn!("failed to touch database file: {}", err),
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?,
    );

    // --- Record store: idempotent schema setup ---
    let records = RecordStore::new(db.clone());
    records.ensure_schema().await?;

    // --- Object store: bucket must exist before serving ---
    let store = ObjectStore::new(cfg.storage_dir.clone());
    ensure_bucket(&store, &cfg.bucket).await?;

    // --- Health monitor: fail closed until the first probe succeeds ---
    let health_state = HealthState::new();
    tokio::spawn(health::run_monitor(
        store.clone(),
        health_state.clone(),
        PROBE_INTERVAL,
    ));

    // --- Build router ---
    let service = GuestbookService::new(store, records, health_state, cfg.bucket.clone());
    let cfg = Arc::new(cfg);
    let app = routes::routes::routes(AppState {
        service,
        config: cfg.clone(),
    });

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop accepting work, then close the record store before exit.
    db.close().await;
    tracing::info!("record store closed; exiting");

    Ok(())
}

/// Make sure the media bucket exists, creating it if absent, with a fixed
/// retry budget for a store that is still coming up.
async fn ensure_bucket(store: &ObjectStore, bucket: &str) -> Result<()> {
    for attempt in 1..=BUCKET_RETRY_ATTEMPTS {
        let result = match store.bucket_exists(bucket).await {
            Ok(true) => Ok(()),
            Ok(false) => store
                .make_bucket(bucket)
                .await
                .map(|()| tracing::info!("created bucket `{}`", bucket)),
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::warn!(
                    "bucket check attempt {}/{} failed: {}",
                    attempt,
                    BUCKET_RETRY_ATTEMPTS,
                    err
                );
                if attempt < BUCKET_RETRY_ATTEMPTS {
                    tokio::time::sleep(BUCKET_RETRY_DELAY).await;
                }
            }
        }
    }
    anyhow::bail!(
        "object store bucket `{}` not reachable after {} attempts",
        bucket,
        BUCKET_RETRY_ATTEMPTS
    )
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to install SIGINT handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to install SIGTERM handler: {}", err);
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
    tracing::info!("shutdown signal received");
}
