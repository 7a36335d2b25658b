//! Error types for `mmbi-core`.

use thiserror::Error;

use crate::entity::{EntityId, EntityKind};

#[derive(Debug, Error)]
pub enum Error {
  #[error("{kind}: required field `{field}` is missing")]
  Validation { kind: EntityKind, field: &'static str },

  #[error("a new {0} cannot already have an id")]
  IdentifierConflict(EntityKind),

  #[error("{kind}: path id {path} does not match body id {body:?}")]
  IdentifierMismatch {
    kind: EntityKind,
    path: EntityId,
    body: Option<EntityId>,
  },

  #[error("{0}: an id is required")]
  MissingIdentifier(EntityKind),

  #[error("{kind} not found: {id}")]
  NotFound { kind: EntityKind, id: EntityId },

  #[error("{kind}.{relation} references unknown {target} {id}")]
  UnknownReference {
    kind:     EntityKind,
    relation: &'static str,
    target:   EntityKind,
    id:       EntityId,
  },

  #[error("{kind} {id} is still referenced by {referrers} other record(s)")]
  StillReferenced {
    kind:      EntityKind,
    id:        EntityId,
    referrers: u64,
  },

  #[error("invalid filter `{param}`: {reason}")]
  InvalidFilter { param: String, reason: String },

  #[error("invalid sort `{0}`")]
  InvalidSort(String),

  #[error("malformed {kind} body: {source}")]
  MalformedBody {
    kind:   EntityKind,
    #[source]
    source: serde_json::Error,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub(crate) fn invalid_filter(
    param: impl Into<String>,
    reason: impl Into<String>,
  ) -> Self {
    Self::InvalidFilter { param: param.into(), reason: reason.into() }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Implemented by storage-backend errors so callers can recover the domain
/// failure (not found, dangling reference, ...) behind a backend error.
pub trait DomainFailure: std::error::Error + Send + Sync + 'static {
  /// Returns the wrapped domain error, or gives `self` back if the failure is
  /// purely infrastructural.
  fn into_domain(self) -> Result<Error, Self>
  where
    Self: Sized;
}
