pub mod api;
pub mod config;
pub mod downloader;

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;

use api::{build_router, AppState};
use config::Config;
use downloader::{spawn_sweep_task, DownloadStore, HttpMetadataSource, ProviderRegistry, TrackService};

/// Serve the REST API until Ctrl-C, sweeping expired downloads in the background.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("track-downloader/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let registry = ProviderRegistry::from_specs(&config.providers, &client)
        .context("invalid provider configuration")?;
    let metadata = Arc::new(HttpMetadataSource::new(&config.metadata_url, client));
    let store = Arc::new(DownloadStore::new());

    let work_root = config.work_root();
    tokio::fs::create_dir_all(&work_root)
        .await
        .with_context(|| format!("failed to create work directory {}", work_root.display()))?;

    let service = TrackService::new(store.clone(), registry, metadata, work_root.clone())
        .with_default_services(config.default_services.clone())
        .with_default_ttl(config.download_ttl)
        .with_provider_timeout(config.provider_timeout);

    let cancel = CancellationToken::new();
    let sweeper = spawn_sweep_task(store, config.cleanup_interval, cancel.clone());

    let router = build_router(AppState {
        service: Arc::new(service),
        base_url: config.public_base_url(),
    });

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(
        addr = %addr,
        ttl = %humantime::format_duration(config.download_ttl),
        work_dir = %work_root.display(),
        providers = ?config.providers.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        "track downloader listening"
    );

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error");

    cancel.cancel();
    let _ = sweeper.await;
    info!("shut down");

    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
