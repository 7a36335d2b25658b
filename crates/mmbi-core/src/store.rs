//! The `EntityStore` trait (the authoritative primary store) and the outbox
//! records it emits for the search index.
//!
//! Higher layers (`mmbi-api`, `mmbi-search`) depend on this abstraction, not
//! on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
  entity::{Entity, EntityId, EntityKind},
  error::DomainFailure,
  listing::{EntityQuery, Page},
  filter::Criteria,
};

// ─── Outbox ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
  Upsert,
  Delete,
}

/// One committed primary-store mutation awaiting propagation.
///
/// Events are written in the same transaction as the mutation itself and are
/// numbered by a strictly increasing `seq`; applying them in `seq` order
/// reproduces the primary store's write order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
  pub seq:         i64,
  pub kind:        EntityKind,
  pub entity_id:   EntityId,
  pub op:          ChangeOp,
  /// Full entity document for `Upsert`; `None` for `Delete`.
  pub document:    Option<serde_json::Value>,
  pub recorded_at: DateTime<Utc>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the primary store.
///
/// Every mutation is atomic: the record, its relationship links and its
/// outbox event are committed together or not at all. Referential integrity
/// is enforced by the store (`UnknownReference` on writes, `StillReferenced`
/// on delete).
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait EntityStore: Send + Sync {
  type Error: DomainFailure;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Persist a new entity and return it with its assigned id. The caller is
  /// responsible for rejecting client-supplied ids and validating fields.
  fn insert<E: Entity>(
    &self,
    entity: E,
  ) -> impl Future<Output = Result<E, Self::Error>> + Send + '_;

  /// Replace an existing entity (matched on `entity.id()`).
  fn update<E: Entity>(
    &self,
    entity: E,
  ) -> impl Future<Output = Result<E, Self::Error>> + Send + '_;

  /// Delete an entity by id.
  fn delete<E: Entity>(
    &self,
    id: EntityId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Retrieve an entity by id. Returns `None` if not found.
  fn get<E: Entity>(
    &self,
    id: EntityId,
  ) -> impl Future<Output = Result<Option<E>, Self::Error>> + Send + '_;

  /// Filter, sort and page entities of kind `E`.
  fn list<'a, E: Entity>(
    &'a self,
    query: &'a EntityQuery,
  ) -> impl Future<Output = Result<Page<E>, Self::Error>> + Send + 'a;

  /// Number of entities of kind `E` matching `criteria`.
  fn count<'a, E: Entity>(
    &'a self,
    criteria: &'a Criteria,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  // ── Outbox ────────────────────────────────────────────────────────────

  /// The oldest `limit` unacknowledged change events, in `seq` order.
  fn pending_changes(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ChangeEvent>, Self::Error>> + Send + '_;

  /// Mark a change event as propagated, removing it from the outbox.
  fn acknowledge(
    &self,
    seq: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Move a change event that can never be applied out of the outbox, keeping
  /// it with `reason` for later inspection.
  fn dead_letter(
    &self,
    seq: i64,
    reason: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Enqueue an upsert event for every stored entity of `kind`; used to
  /// rebuild an empty search index. Returns the number of events enqueued.
  fn enqueue_reindex(
    &self,
    kind: EntityKind,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}
