mod config;
mod metrics;
mod routes;
mod sessions;

use anyhow::{Context, Result};
use source::{DocumentCache, HttpRemoteSource, LocalStore, SourceAdapter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, LogFormat};
use crate::metrics::ResolveMetrics;
use crate::routes::AppState;
use crate::sessions::SessionRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    init_tracing(config.server.log_format);

    let adapter = build_adapter(&config)?;
    let state = Arc::new(AppState {
        adapter,
        sessions: SessionRegistry::new(config.session.max_chat_messages),
        metrics: ResolveMetrics::new(),
        prompt_limits: config.prompt_limits(),
    });

    if let Some(idle) = config.session_idle_timeout() {
        spawn_session_sweeper(Arc::clone(&state), idle);
    }

    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;

    info!(addr = %config.server.bind_addr, "Companion API listening");

    axum::serve(listener, app).await.context("Server stopped unexpectedly")?;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn spawn_session_sweeper(state: Arc<AppState>, idle: Duration) {
    let period = idle.min(Duration::from_secs(60));
    info!(idle_secs = idle.as_secs(), "Idle sessions will be expired");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            state.sessions.sweep_idle(idle);
        }
    });
}

fn build_adapter(config: &AppConfig) -> Result<SourceAdapter> {
    let store = LocalStore::new(config.store.path.clone());
    if !store.root().is_dir() {
        warn!(path = %store.root().display(), "Local analysis store does not exist yet");
    }

    let adapter = SourceAdapter::new(store, DocumentCache::new(), config.request_timeout());

    match &config.remote.base_url {
        Some(url) => {
            let remote = HttpRemoteSource::new(url, config.request_timeout())
                .context("Failed to create remote analysis client")?;
            info!(
                base_url = %remote.base_url(),
                timeout_secs = config.remote.timeout_secs,
                "Remote analysis source configured"
            );
            Ok(adapter.with_remote(Arc::new(remote)))
        }
        None => {
            info!("No remote analysis source configured, serving from the local store");
            Ok(adapter)
        }
    }
}
