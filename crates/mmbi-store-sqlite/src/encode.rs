//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, entity bodies and outbox documents are
//! compact JSON, and kinds/ops use their snake_case names.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use mmbi_core::{
  entity::{Entity, EntityId, EntityKind},
  store::{ChangeEvent, ChangeOp},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Discriminants ───────────────────────────────────────────────────────────

pub fn decode_kind(s: &str) -> Result<EntityKind> {
  EntityKind::from_str(s).map_err(|_| Error::UnknownDiscriminant {
    column: "kind",
    value:  s.to_owned(),
  })
}

pub fn encode_op(op: ChangeOp) -> &'static str {
  match op {
    ChangeOp::Upsert => "upsert",
    ChangeOp::Delete => "delete",
  }
}

pub fn decode_op(s: &str) -> Result<ChangeOp> {
  ChangeOp::from_str(s).map_err(|_| Error::UnknownDiscriminant {
    column: "op",
    value:  s.to_owned(),
  })
}

// ─── Entities ────────────────────────────────────────────────────────────────

/// The stored body of an entity, with `id` set to its row id.
pub fn encode_body(mut document: serde_json::Value, id: EntityId) -> String {
  if let Some(map) = document.as_object_mut() {
    map.insert("id".to_owned(), id.into());
  }
  document.to_string()
}

/// Raw strings read directly from an `entities` row.
pub struct RawEntity {
  pub entity_id: EntityId,
  pub body_json: String,
}

impl RawEntity {
  pub fn into_entity<E: Entity>(self) -> Result<E> {
    let mut entity: E = serde_json::from_str(&self.body_json)?;
    // The row id is authoritative over whatever the body carries.
    entity.set_id(Some(self.entity_id));
    Ok(entity)
  }
}

// ─── Outbox ──────────────────────────────────────────────────────────────────

/// Raw strings read directly from an `outbox` row.
pub struct RawChange {
  pub seq:         i64,
  pub kind:        String,
  pub entity_id:   EntityId,
  pub op:          String,
  pub document:    Option<String>,
  pub recorded_at: String,
}

impl RawChange {
  pub fn into_event(self) -> Result<ChangeEvent> {
    let op = decode_op(&self.op)?;
    if op == ChangeOp::Upsert && self.document.is_none() {
      return Err(Error::MissingDocument(self.seq));
    }
    Ok(ChangeEvent {
      seq:         self.seq,
      kind:        decode_kind(&self.kind)?,
      entity_id:   self.entity_id,
      op,
      document:    self
        .document
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}
