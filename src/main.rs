use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use scribehook::application::services::{AudioIntakeService, TranscriptionWorker};
use scribehook::infrastructure::audio::TranscriptionEngineFactory;
use scribehook::infrastructure::http::ReqwestAttachmentFetcher;
use scribehook::infrastructure::observability::{TracingConfig, init_tracing};
use scribehook::infrastructure::storage::LocalContentStore;
use scribehook::presentation::{AppState, Environment, Settings, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let environment = Environment::from_env().map_err(anyhow::Error::msg)?;
    let settings = Settings::load(environment).context("failed to load configuration")?;

    init_tracing(&TracingConfig::from_settings(environment, &settings.logging))
        .context("failed to install tracing subscriber")?;

    let store = Arc::new(
        LocalContentStore::new(settings.storage.content_dir.clone())
            .context("failed to initialize content directory")?,
    );
    tracing::info!(content_dir = %store.root().display(), "Content store ready");

    let fetcher = Arc::new(ReqwestAttachmentFetcher::new()?);

    let transcription = settings.transcription.clone();
    tracing::info!(
        provider = ?transcription.provider,
        model_size = %transcription.model_size,
        precision = ?transcription.precision,
        beam_width = transcription.beam_width,
        "Loading transcription engine"
    );
    let engine = tokio::task::spawn_blocking(move || {
        TranscriptionEngineFactory::create(
            transcription.provider,
            &transcription.whisper_options(),
            transcription.api_key.clone(),
            transcription.base_url.clone(),
            transcription.remote_model.clone(),
        )
    })
    .await
    .context("engine loader panicked")?
    .context("failed to load transcription engine")?;

    let (sender, receiver) = mpsc::channel(settings.worker.queue_capacity);
    let worker = TranscriptionWorker::new(
        receiver,
        engine,
        store.clone(),
        settings.worker.max_concurrent_jobs,
        settings.transcription.timeout(),
    );
    let worker_handle = tokio::spawn(worker.run());

    let intake_service = Arc::new(AudioIntakeService::new(
        store,
        fetcher,
        sender,
        settings.upload.max_file_size_bytes(),
    ));
    let router = create_router(AppState::new(intake_service));

    let host: std::net::IpAddr = settings
        .server
        .host
        .parse()
        .with_context(|| format!("invalid server.host {}", settings.server.host))?;
    let addr = SocketAddr::from((host, settings.server.port));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(%addr, environment = %environment, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned the last queue sender, so the worker now drains and exits.
    tracing::info!("Server stopped, waiting for queued transcriptions");
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Transcription worker task failed");
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
