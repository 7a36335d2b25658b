//! Entity metadata: kinds, field/relation schema, and the [`Entity`] trait
//! every persisted record implements.
//!
//! The schema tables (`FIELDS`, `RELATIONS`) drive validation, the filter
//! grammar and relationship bookkeeping in the store, so none of those need
//! per-entity code.

use std::fmt::Debug;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{Error, Result};

/// Server-assigned identifier, drawn from a single global sequence.
pub type EntityId = i64;

// ─── Kinds ───────────────────────────────────────────────────────────────────

/// Every entity type managed by the service. The snake_case form is what the
/// store writes into its `kind` columns.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Display,
  EnumString,
  EnumIter,
  IntoStaticStr,
  Serialize,
  Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
  Placeholder,
  Dealer,
  SecurityClearance,
  ApplicationUser,
  FiscalYear,
  FiscalQuarter,
  FiscalMonth,
}

impl EntityKind {
  /// Plural path segment under `/api`.
  pub fn path(self) -> &'static str {
    match self {
      Self::Placeholder => "placeholders",
      Self::Dealer => "dealers",
      Self::SecurityClearance => "security-clearances",
      Self::ApplicationUser => "application-users",
      Self::FiscalYear => "fiscal-years",
      Self::FiscalQuarter => "fiscal-quarters",
      Self::FiscalMonth => "fiscal-months",
    }
  }

  pub fn as_str(self) -> &'static str { self.into() }
}

// ─── Schema ──────────────────────────────────────────────────────────────────

/// Scalar type of a field; decides which filter operators apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
  Text,
  Integer,
  Date,
  Uuid,
  /// Closed set of upper-case variant names.
  Enum(&'static [&'static str]),
}

impl FieldType {
  /// Whether values of this type have a meaningful order for range filters.
  pub fn is_ordered(self) -> bool { matches!(self, Self::Integer | Self::Date) }

  /// Parse a raw query-string value into a typed [`FieldValue`].
  ///
  /// Text is taken verbatim, matching how `contains` reads its needle; other
  /// types ignore surrounding whitespace.
  pub fn parse(self, raw: &str) -> Result<FieldValue, String> {
    let value = raw.trim();
    match self {
      Self::Text => Ok(FieldValue::Text(raw.to_owned())),
      Self::Integer => value
        .parse()
        .map(FieldValue::Integer)
        .map_err(|_| format!("{value:?} is not an integer")),
      Self::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(FieldValue::Date)
        .map_err(|_| format!("{value:?} is not a yyyy-mm-dd date")),
      Self::Uuid => Uuid::parse_str(value)
        .map(FieldValue::Uuid)
        .map_err(|_| format!("{value:?} is not a uuid")),
      Self::Enum(variants) => variants
        .iter()
        .find(|v| **v == value)
        .map(|v| FieldValue::Enum((*v).to_owned()))
        .ok_or_else(|| format!("{value:?} is not one of {variants:?}")),
    }
  }
}

/// A scalar field, named as it appears on the wire (camelCase).
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
  pub name:     &'static str,
  pub ty:       FieldType,
  pub required: bool,
}

impl FieldDef {
  pub const fn required(name: &'static str, ty: FieldType) -> Self {
    Self { name, ty, required: true }
  }

  pub const fn optional(name: &'static str, ty: FieldType) -> Self {
    Self { name, ty, required: false }
  }
}

/// A relationship to another entity: many-to-one (`{"id": n}` or `null`) or
/// many-to-many owned by this side (`[{"id": n}, ...]`).
#[derive(Debug, Clone, Copy)]
pub struct RelationDef {
  /// Wire name of the relation property, e.g. `organization`.
  pub name:        &'static str,
  /// Filter parameter stem, e.g. `organizationId`.
  pub filter_key:  &'static str,
  pub target:      EntityKind,
  pub required:    bool,
}

impl RelationDef {
  pub const fn to_one(
    name: &'static str,
    filter_key: &'static str,
    target: EntityKind,
    required: bool,
  ) -> Self {
    Self { name, filter_key, target, required }
  }

  pub const fn to_many(
    name: &'static str,
    filter_key: &'static str,
    target: EntityKind,
  ) -> Self {
    Self { name, filter_key, target, required: false }
  }
}

// ─── Values ──────────────────────────────────────────────────────────────────

/// A typed scalar read out of an entity for filtering and sorting.
///
/// Values of different variants never compare equal; the derived ordering
/// only matters between values of the same field, which share a variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldValue {
  Null,
  Integer(i64),
  Text(String),
  Date(NaiveDate),
  Uuid(Uuid),
  Enum(String),
}

impl FieldValue {
  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }
}

impl From<Option<&String>> for FieldValue {
  fn from(v: Option<&String>) -> Self {
    v.map_or(Self::Null, |s| Self::Text(s.clone()))
  }
}

impl From<Option<NaiveDate>> for FieldValue {
  fn from(v: Option<NaiveDate>) -> Self { v.map_or(Self::Null, Self::Date) }
}

impl From<Option<Uuid>> for FieldValue {
  fn from(v: Option<Uuid>) -> Self { v.map_or(Self::Null, Self::Uuid) }
}

impl From<Option<i64>> for FieldValue {
  fn from(v: Option<i64>) -> Self { v.map_or(Self::Null, Self::Integer) }
}

/// Reference to a related record, serialised as `{"id": n}`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EntityRef {
  pub id: EntityId,
}

impl EntityRef {
  pub fn new(id: EntityId) -> Self { Self { id } }
}

pub(crate) fn one_id(r: &Option<EntityRef>) -> Vec<EntityId> {
  r.iter().map(|r| r.id).collect()
}

pub(crate) fn many_ids(refs: &[EntityRef]) -> Vec<EntityId> {
  refs.iter().map(|r| r.id).collect()
}

/// Sort and collapse duplicate references in a to-many relation.
pub(crate) fn dedup_refs(refs: &mut Vec<EntityRef>) {
  refs.sort();
  refs.dedup();
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// An outgoing relationship edge, as tracked by the store's link table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
  pub relation: &'static str,
  pub target:   EntityKind,
  pub id:       EntityId,
}

/// A persisted record type.
///
/// Implementors are plain serde structs whose scalar fields are all `Option`
/// so that a body missing a required value still deserialises and can be
/// rejected by [`Entity::validate`] with a precise error.
pub trait Entity:
  Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static
{
  const KIND: EntityKind;
  const FIELDS: &'static [FieldDef];
  const RELATIONS: &'static [RelationDef];

  fn id(&self) -> Option<EntityId>;

  fn set_id(&mut self, id: Option<EntityId>);

  /// The value of scalar field `name`; `Null` for unset or unknown names.
  fn field(&self, name: &str) -> FieldValue;

  /// Ids linked through relation `name` (empty when unset).
  fn related(&self, relation: &str) -> Vec<EntityId>;

  /// Collapse duplicate to-many references. The default does nothing.
  fn normalize(&mut self) {}

  /// Check every required field and relation is present.
  fn validate(&self) -> Result<()> {
    let missing_field = Self::FIELDS
      .iter()
      .filter(|def| def.required)
      .find(|def| self.field(def.name).is_null())
      .map(|def| def.name);
    let missing_relation = || {
      Self::RELATIONS
        .iter()
        .filter(|def| def.required)
        .find(|def| self.related(def.name).is_empty())
        .map(|def| def.name)
    };

    match missing_field.or_else(missing_relation) {
      Some(field) => Err(Error::Validation { kind: Self::KIND, field }),
      None => Ok(()),
    }
  }

  /// Every outgoing relationship edge of this record.
  fn links(&self) -> Vec<Link> {
    Self::RELATIONS
      .iter()
      .flat_map(|def| {
        self.related(def.name).into_iter().map(move |id| Link {
          relation: def.name,
          target: def.target,
          id,
        })
      })
      .collect()
  }

  /// Deserialise a request body.
  fn from_body(body: serde_json::Value) -> Result<Self> {
    let mut entity: Self = serde_json::from_value(body)
      .map_err(|source| Error::MalformedBody { kind: Self::KIND, source })?;
    entity.normalize();
    Ok(entity)
  }

  /// Apply a partial update. Keys that are absent or `null` in `patch` keep
  /// their current value; `id` is never taken from the patch.
  fn merge_patch(&self, patch: &serde_json::Value) -> Result<Self> {
    let mut current = serde_json::to_value(self)?;
    if let (Some(target), Some(changes)) =
      (current.as_object_mut(), patch.as_object())
    {
      for (key, value) in changes {
        if key == "id" || value.is_null() {
          continue;
        }
        target.insert(key.clone(), value.clone());
      }
    }
    let mut merged = Self::from_body(current)?;
    merged.set_id(self.id());
    Ok(merged)
  }

  /// The JSON document mirrored into the search index.
  fn to_document(&self) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(self)?)
  }
}
