//! Error types for `mmbi-search`.

use std::time::Duration;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum IndexError {
  #[error("search index is unavailable")]
  Unavailable,
}

/// A failure while propagating outbox events into the index.
///
/// Never surfaced to HTTP callers; the sync worker logs it and retries.
#[derive(Debug, Error)]
pub enum SyncError {
  #[error("reading the outbox failed: {0}")]
  Store(#[source] BoxError),

  #[error("index write for change #{seq} failed: {source}")]
  Index {
    seq:    i64,
    #[source]
    source: BoxError,
  },

  #[error("upsert change #{0} carries no document")]
  MissingDocument(i64),

  #[error("condition not reached within {0:?}")]
  Timeout(Duration),
}

impl SyncError {
  pub(crate) fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(err))
  }

  pub(crate) fn index(
    seq: i64,
    err: impl std::error::Error + Send + Sync + 'static,
  ) -> Self {
    Self::Index { seq, source: Box::new(err) }
  }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
