//! [`IndexSync`]: propagates committed outbox events into the search index.
//!
//! Events are applied strictly in `seq` order. A batch stops at the first
//! failed event, so a later change to the same entity can never overtake an
//! earlier one; the failed event is retried after an exponential backoff.

use std::{future::Future, sync::Arc, time::Duration};

use mmbi_core::{
  search::SearchIndex,
  store::{ChangeEvent, ChangeOp, EntityStore},
};
use serde::Deserialize;
use tokio::{
  sync::{Notify, watch},
  task::JoinHandle,
};

use crate::{SyncError, error::Result};

// ─── Config ──────────────────────────────────────────────────────────────────

/// Tuning for the sync worker, read from the `[sync]` config section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Idle wake-up interval when no write notification arrives.
  pub poll_interval_ms:       u64,
  /// Outbox events fetched per batch.
  pub batch_size:             usize,
  pub initial_backoff_ms:     u64,
  pub max_backoff_ms:         u64,
  /// How long readers wait for the index to converge.
  pub convergence_timeout_ms: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      poll_interval_ms:       250,
      batch_size:             100,
      initial_backoff_ms:     50,
      max_backoff_ms:         5000,
      convergence_timeout_ms: 5000,
    }
  }
}

impl SyncConfig {
  pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }

  pub fn convergence_timeout(&self) -> Duration {
    Duration::from_millis(self.convergence_timeout_ms)
  }

  /// The delay after `previous`, doubling up to the configured maximum.
  fn next_backoff(&self, previous: Option<Duration>) -> Duration {
    let max = Duration::from_millis(self.max_backoff_ms);
    match previous {
      None => Duration::from_millis(self.initial_backoff_ms).min(max),
      Some(d) => (d * 2).min(max),
    }
  }
}

// ─── Handle ──────────────────────────────────────────────────────────────────

/// Cheap, cloneable way for writers to nudge the worker after a commit.
#[derive(Debug, Clone, Default)]
pub struct SyncHandle {
  notify: Arc<Notify>,
}

impl SyncHandle {
  pub fn new() -> Self { Self::default() }

  /// Wake the worker. A wake sent while it is busy is remembered.
  pub fn wake(&self) { self.notify.notify_one(); }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

pub struct IndexSync<S, I> {
  store:  Arc<S>,
  index:  Arc<I>,
  config: SyncConfig,
  handle: SyncHandle,
}

impl<S, I> IndexSync<S, I>
where
  S: EntityStore + 'static,
  I: SearchIndex + 'static,
{
  pub fn new(store: Arc<S>, index: Arc<I>, config: SyncConfig) -> Self {
    Self { store, index, config, handle: SyncHandle::new() }
  }

  pub fn handle(&self) -> SyncHandle { self.handle.clone() }

  fn batch_size(&self) -> usize { self.config.batch_size.max(1) }

  async fn apply(&self, event: ChangeEvent) -> Result<()> {
    let ChangeEvent { seq, kind, entity_id, op, document, .. } = event;
    match op {
      ChangeOp::Upsert => {
        let document = document.ok_or(SyncError::MissingDocument(seq))?;
        self
          .index
          .upsert(kind, entity_id, document)
          .await
          .map_err(|e| SyncError::index(seq, e))?;
      }
      ChangeOp::Delete => self
        .index
        .remove(kind, entity_id)
        .await
        .map_err(|e| SyncError::index(seq, e))?,
    }
    self.store.acknowledge(seq).await.map_err(SyncError::store)
  }

  /// Apply one batch of pending events. Returns how many were consumed,
  /// counting events parked as dead letters.
  pub async fn drain_once(&self) -> Result<usize> {
    let events = self
      .store
      .pending_changes(self.batch_size())
      .await
      .map_err(SyncError::store)?;

    let mut consumed = 0;
    for event in events {
      match self.apply(event).await {
        // An upsert without a document is parked, never retried.
        Err(err @ SyncError::MissingDocument(seq)) => {
          tracing::error!(seq, error = %err, "unusable outbox event");
          self
            .store
            .dead_letter(seq, err.to_string())
            .await
            .map_err(SyncError::store)?;
        }
        other => other?,
      }
      consumed += 1;
    }
    Ok(consumed)
  }

  /// Apply batches until the outbox is empty or an event fails.
  pub async fn drain(&self) -> Result<usize> {
    let mut total = 0;
    loop {
      let applied = self.drain_once().await?;
      total += applied;
      if applied < self.batch_size() {
        return Ok(total);
      }
    }
  }

  /// Run until `shutdown` flips to `true` or its sender is dropped.
  pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
    tracing::info!("index sync started");
    let mut backoff: Option<Duration> = None;

    while !*shutdown.borrow() {
      let delay = match self.drain().await {
        Ok(applied) => {
          if applied > 0 {
            tracing::debug!(applied, "outbox drained");
          }
          if backoff.take().is_some() {
            tracing::info!("index sync recovered");
          }
          self.config.poll_interval()
        }
        Err(err) => {
          let delay = self.config.next_backoff(backoff);
          tracing::warn!(
            error = %err,
            retry_in_ms = delay.as_millis() as u64,
            "index propagation failed"
          );
          backoff = Some(delay);
          delay
        }
      };

      tokio::select! {
        changed = shutdown.changed() => {
          if changed.is_err() {
            break;
          }
        }
        _ = self.handle.notify.notified(), if backoff.is_none() => {}
        _ = tokio::time::sleep(delay) => {}
      }
    }

    tracing::info!("index sync stopped");
  }

  pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(self.run(shutdown))
  }
}

// ─── Convergence ─────────────────────────────────────────────────────────────

/// Re-evaluate `check` with a growing delay until it returns `true` or
/// `timeout` elapses.
pub async fn poll_until<F, Fut>(timeout: Duration, mut check: F) -> Result<()>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = bool>,
{
  let deadline = tokio::time::Instant::now() + timeout;
  let mut delay = Duration::from_millis(5);

  loop {
    if check().await {
      return Ok(());
    }
    let now = tokio::time::Instant::now();
    if now >= deadline {
      return Err(SyncError::Timeout(timeout));
    }
    tokio::time::sleep(delay.min(deadline - now)).await;
    delay = (delay * 2).min(Duration::from_millis(200));
  }
}
