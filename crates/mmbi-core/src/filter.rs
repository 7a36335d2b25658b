//! The field-level filter grammar used by list and count endpoints.
//!
//! A query parameter `<field>.<operator>=<value>` becomes a [`Criterion`]; all
//! criteria of a request form a [`Criteria`] conjunction. Parsing is driven by
//! an entity's schema, so a criterion that reaches the evaluator is always
//! well-typed for its target.
//!
//! | operator | applies to |
//! |----------|------------|
//! | `equals`, `notEquals`, `in`, `notIn`, `specified` | every field |
//! | `contains`, `doesNotContain` | text |
//! | `greaterThan`, `greaterThanOrEqual`, `lessThan`, `lessThanOrEqual` | integers, dates |
//!
//! `id` is an integer field of every entity, and each relation exposes its
//! linked ids as `<relation>Id`. For to-many relations a positive predicate
//! holds when any linked id satisfies it; a negative one when none does.

use std::str::FromStr;

use strum::{Display, EnumString};

use crate::{
  Error, Result,
  entity::{Entity, FieldDef, FieldType, FieldValue, RelationDef},
};

/// Query parameters that configure the listing rather than filter it.
pub const RESERVED_PARAMS: &[&str] =
  &["page", "size", "sort", "eagerload", "distinct", "query"];

// ─── Grammar ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "camelCase")]
pub enum Operator {
  Equals,
  NotEquals,
  In,
  NotIn,
  Specified,
  Contains,
  DoesNotContain,
  GreaterThan,
  GreaterThanOrEqual,
  LessThan,
  LessThanOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
  GreaterThan,
  GreaterThanOrEqual,
  LessThan,
  LessThanOrEqual,
}

impl Bound {
  fn admits(self, value: &FieldValue, bound: &FieldValue) -> bool {
    match self {
      Self::GreaterThan => value > bound,
      Self::GreaterThanOrEqual => value >= bound,
      Self::LessThan => value < bound,
      Self::LessThanOrEqual => value <= bound,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
  Equals(FieldValue),
  NotEquals(FieldValue),
  In(Vec<FieldValue>),
  NotIn(Vec<FieldValue>),
  /// Case-insensitive substring; the needle is stored lower-cased.
  Contains(String),
  DoesNotContain(String),
  Range(Bound, FieldValue),
  Specified(bool),
}

/// What a criterion inspects on an entity.
#[derive(Debug, Clone, Copy)]
pub enum Target {
  Id,
  Field(FieldDef),
  Relation(RelationDef),
}

impl Target {
  fn resolve<E: Entity>(name: &str) -> Option<Self> {
    if name == "id" {
      return Some(Self::Id);
    }
    E::FIELDS
      .iter()
      .find(|def| def.name == name)
      .map(|def| Self::Field(*def))
      .or_else(|| {
        E::RELATIONS
          .iter()
          .find(|def| def.filter_key == name)
          .map(|def| Self::Relation(*def))
      })
  }

  fn field_type(&self) -> FieldType {
    match self {
      Self::Id | Self::Relation(_) => FieldType::Integer,
      Self::Field(def) => def.ty,
    }
  }

  /// Every value the entity holds for this target; empty means unset.
  fn values<E: Entity>(&self, entity: &E) -> Vec<FieldValue> {
    match self {
      Self::Id => entity.id().map(FieldValue::Integer).into_iter().collect(),
      Self::Field(def) => {
        Some(entity.field(def.name)).filter(|v| !v.is_null()).into_iter().collect()
      }
      Self::Relation(def) => entity
        .related(def.name)
        .into_iter()
        .map(FieldValue::Integer)
        .collect(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Criterion {
  pub target:    Target,
  pub predicate: Predicate,
}

impl Criterion {
  /// Parse a single `<field>.<operator>` / value pair for entity `E`.
  pub fn parse<E: Entity>(key: &str, raw: &str) -> Result<Self> {
    let (name, op) = key
      .rsplit_once('.')
      .ok_or_else(|| Error::invalid_filter(key, "expected <field>.<operator>"))?;
    let target = Target::resolve::<E>(name).ok_or_else(|| {
      Error::invalid_filter(key, format!("{} has no field `{name}`", E::KIND))
    })?;
    let op = Operator::from_str(op)
      .map_err(|_| Error::invalid_filter(key, format!("unknown operator `{op}`")))?;

    let ty = target.field_type();
    let typed = |raw: &str| ty.parse(raw).map_err(|e| Error::invalid_filter(key, e));
    let list = |raw: &str| raw.split(',').map(typed).collect::<Result<Vec<_>>>();
    let not_applicable = || {
      Error::invalid_filter(key, format!("`{op}` does not apply to {ty:?} fields"))
    };

    let predicate = match op {
      Operator::Equals => Predicate::Equals(typed(raw)?),
      Operator::NotEquals => Predicate::NotEquals(typed(raw)?),
      Operator::In => Predicate::In(list(raw)?),
      Operator::NotIn => Predicate::NotIn(list(raw)?),
      Operator::Specified => Predicate::Specified(raw.trim().parse::<bool>().map_err(|_| {
        Error::invalid_filter(key, "expected `true` or `false`")
      })?),
      Operator::Contains | Operator::DoesNotContain => {
        if ty != FieldType::Text {
          return Err(not_applicable());
        }
        let needle = raw.to_lowercase();
        if op == Operator::Contains {
          Predicate::Contains(needle)
        } else {
          Predicate::DoesNotContain(needle)
        }
      }
      Operator::GreaterThan
      | Operator::GreaterThanOrEqual
      | Operator::LessThan
      | Operator::LessThanOrEqual => {
        if !ty.is_ordered() {
          return Err(not_applicable());
        }
        let bound = match op {
          Operator::GreaterThan => Bound::GreaterThan,
          Operator::GreaterThanOrEqual => Bound::GreaterThanOrEqual,
          Operator::LessThan => Bound::LessThan,
          _ => Bound::LessThanOrEqual,
        };
        Predicate::Range(bound, typed(raw)?)
      }
    };

    Ok(Self { target, predicate })
  }

  pub fn matches<E: Entity>(&self, entity: &E) -> bool {
    let values = self.target.values(entity);
    let contains = |v: &FieldValue, needle: &str| match v {
      FieldValue::Text(s) => s.to_lowercase().contains(needle),
      _ => false,
    };

    match &self.predicate {
      Predicate::Equals(expected) => values.contains(expected),
      Predicate::NotEquals(expected) => {
        !values.is_empty() && !values.contains(expected)
      }
      Predicate::In(options) => values.iter().any(|v| options.contains(v)),
      Predicate::NotIn(options) => {
        !values.is_empty() && values.iter().all(|v| !options.contains(v))
      }
      Predicate::Contains(needle) => values.iter().any(|v| contains(v, needle)),
      Predicate::DoesNotContain(needle) => {
        !values.is_empty() && values.iter().all(|v| !contains(v, needle))
      }
      Predicate::Range(bound, limit) => {
        values.iter().any(|v| bound.admits(v, limit))
      }
      Predicate::Specified(expected) => !values.is_empty() == *expected,
    }
  }
}

// ─── Conjunction ─────────────────────────────────────────────────────────────

/// All criteria of one request, combined with logical AND.
#[derive(Debug, Clone, Default)]
pub struct Criteria(Vec<Criterion>);

impl Criteria {
  pub fn new() -> Self { Self::default() }

  /// Parse every non-reserved query parameter as a criterion for `E`.
  pub fn from_params<E: Entity>(params: &[(String, String)]) -> Result<Self> {
    params
      .iter()
      .filter(|(key, _)| !RESERVED_PARAMS.contains(&key.as_str()))
      .map(|(key, value)| Criterion::parse::<E>(key, value))
      .collect::<Result<Vec<_>>>()
      .map(Self)
  }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn matches<E: Entity>(&self, entity: &E) -> bool {
    self.0.iter().all(|c| c.matches(entity))
  }
}
