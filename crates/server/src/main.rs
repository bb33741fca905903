use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediahub_core::{
    create_status_outbox, load_config, validate_config, AssetRegistry, SqliteAssetRegistry,
    StatusSink,
    document::PopplerInspector,
    encoder::{Encoder, FfmpegEncoder},
    status::{HttpStatusSink, RegistryStatusSink},
};
use mediahub_server::api::create_router;
use mediahub_server::state::{AppState, Services};

/// How long shutdown waits for queued status updates.
const OUTBOX_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("MEDIAHUB_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!("Dispatch mode: {:?}", config.dispatcher.mode);

    for dir in [
        &config.storage.uploads_root,
        &config.storage.thumbnails_root,
        &config.storage.streams_root,
    ] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create storage directory {:?}", dir))?;
    }

    let registry: Arc<dyn AssetRegistry> = Arc::new(
        SqliteAssetRegistry::new(&config.database.path)
            .context("Failed to open asset registry")?,
    );
    info!("Asset registry initialized");

    let encoder = Arc::new(FfmpegEncoder::new(config.encoder.clone()));
    match encoder.validate().await {
        Ok(()) => info!(backend = ?config.encoder.backend, "Encoder ready"),
        Err(e) => warn!(error = %e, "Encoder self-check failed; video stages will fail"),
    }

    let sink: Arc<dyn StatusSink> = match &config.registry.update_url {
        Some(url) => {
            info!("Status updates go to {}", url);
            Arc::new(
                HttpStatusSink::new(url.clone(), config.registry.request_timeout_secs)
                    .context("Failed to create status client")?,
            )
        }
        None => Arc::new(RegistryStatusSink::new(Arc::clone(&registry))),
    };

    let (outbox, outbox_writer) = create_status_outbox(
        sink,
        config.registry.outbox_capacity,
        config.registry.retry.clone(),
    );
    let writer_handle = tokio::spawn(outbox_writer.run());

    let state = Arc::new(AppState::new(
        config.clone(),
        Services {
            registry,
            encoder: encoder.clone(),
            prober: encoder,
            inspector: Arc::new(PopplerInspector::new(config.document.clone())),
            outbox,
        },
    )?);
    let transcode = Arc::clone(state.transcode());

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");

    // Running transcodes end `failed`; their final reports are queued before
    // the stage lets go of its outbox handle.
    transcode.inflight().cancel_all();
    let mut waited = Duration::ZERO;
    while !transcode.inflight().is_empty() && waited < OUTBOX_DRAIN_TIMEOUT {
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += Duration::from_millis(50);
    }
    drop(transcode);

    // The writer exits once every outbox handle is gone and the queue is empty.
    match tokio::time::timeout(OUTBOX_DRAIN_TIMEOUT, writer_handle).await {
        Ok(_) => info!("Status outbox drained"),
        Err(_) => warn!("Status outbox did not drain in time"),
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
}
