//! mmbi-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! primary store, rebuilds the in-memory search index from it and serves the
//! REST API under `/api`.

mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use axum::Router;
use clap::Parser;
use mmbi_api::{AppState, api_router};
use mmbi_core::{entity::EntityKind, store::EntityStore};
use mmbi_search::{IndexSync, MemoryIndex, poll_until};
use mmbi_store_sqlite::SqliteStore;
use strum::IntoEnumIterator as _;
use tokio::{net::TcpListener, sync::watch};
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use settings::ServerConfig;

#[derive(Parser)]
#[command(author, version, about = "Money market BI entity server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = ServerConfig::load(&cli.config)?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;
  let store = Arc::new(store);
  let index = Arc::new(MemoryIndex::new());

  // The index starts empty on every boot.
  for kind in EntityKind::iter() {
    store
      .enqueue_reindex(kind)
      .await
      .with_context(|| format!("failed to enqueue reindex of {kind}"))?;
  }

  let sync = IndexSync::new(store.clone(), index.clone(), cfg.sync.clone());
  let state = AppState::new(store.clone(), index, sync.handle());
  let (stop, shutdown) = watch::channel(false);
  let worker = sync.spawn(shutdown);

  let app = Router::new()
    .nest("/api", api_router(state))
    .layer(TraceLayer::new_for_http());

  let address = cfg.address();
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  // Give the worker a chance to flush what the last requests wrote.
  let flushed = poll_until(cfg.sync.convergence_timeout(), || {
    let store = store.clone();
    async move { store.outbox_len().await.is_ok_and(|n| n == 0) }
  })
  .await;
  if let Err(e) = flushed {
    tracing::warn!(error = %e, "outbox not empty at shutdown");
  }

  let _ = stop.send(true);
  worker.await.context("index sync task panicked")?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}
