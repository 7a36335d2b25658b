//! The `SearchIndex` trait and the `field:value` query syntax it answers.
//!
//! Queries are whitespace-separated terms, all of which must match:
//!
//! * `field:value`: the document's field equals `value` (strings compare
//!   case-insensitively). Dotted paths reach into nested objects
//!   (`organization.id:5`), and arrays match if any element does.
//! * a bare term matches if any string in the document contains it.
//! * `*` (or an empty query) matches everything.

use std::future::Future;

use serde_json::Value;

use crate::entity::{EntityId, EntityKind};

// ─── Query ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTerm {
  Field { path: Vec<String>, value: String },
  Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
  pub terms: Vec<SearchTerm>,
}

impl SearchQuery {
  pub fn parse(raw: &str) -> Self {
    let terms = raw
      .split_whitespace()
      .filter(|t| *t != "*")
      .map(|token| match token.split_once(':') {
        Some((field, value)) if !field.is_empty() && !value.is_empty() => {
          SearchTerm::Field {
            path:  field.split('.').map(str::to_owned).collect(),
            value: value.to_lowercase(),
          }
        }
        _ => SearchTerm::Text(token.to_lowercase()),
      })
      .collect();
    Self { terms }
  }

  pub fn matches(&self, document: &Value) -> bool {
    self.terms.iter().all(|term| match term {
      SearchTerm::Field { path, value } => field_matches(document, path, value),
      SearchTerm::Text(needle) => text_matches(document, needle),
    })
  }
}

fn scalar_equals(v: &Value, expected: &str) -> bool {
  match v {
    Value::String(s) => s.to_lowercase() == expected,
    Value::Number(n) => n.to_string() == expected,
    Value::Bool(b) => b.to_string() == expected,
    Value::Array(items) => items.iter().any(|i| scalar_equals(i, expected)),
    Value::Null | Value::Object(_) => false,
  }
}

fn field_matches(v: &Value, path: &[String], expected: &str) -> bool {
  match (v, path.split_first()) {
    (Value::Array(items), _) => {
      items.iter().any(|i| field_matches(i, path, expected))
    }
    (Value::Object(map), Some((head, rest))) => map
      .get(head)
      .is_some_and(|child| field_matches(child, rest, expected)),
    (_, None) => scalar_equals(v, expected),
    _ => false,
  }
}

fn text_matches(v: &Value, needle: &str) -> bool {
  match v {
    Value::String(s) => s.to_lowercase().contains(needle),
    Value::Array(items) => items.iter().any(|i| text_matches(i, needle)),
    Value::Object(map) => map.values().any(|i| text_matches(i, needle)),
    _ => false,
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// The derived, eventually-consistent search index.
///
/// Documents are the JSON form of an entity keyed by `(kind, id)`. Writes
/// are idempotent, so replaying an outbox event is harmless.
pub trait SearchIndex: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn upsert(
    &self,
    kind: EntityKind,
    id: EntityId,
    document: Value,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn remove(
    &self,
    kind: EntityKind,
    id: EntityId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get(
    &self,
    kind: EntityKind,
    id: EntityId,
  ) -> impl Future<Output = Result<Option<Value>, Self::Error>> + Send + '_;

  /// Matching documents of `kind`, ordered by id.
  fn search<'a>(
    &'a self,
    kind: EntityKind,
    query: &'a SearchQuery,
  ) -> impl Future<Output = Result<Vec<Value>, Self::Error>> + Send + 'a;

  fn count(
    &self,
    kind: EntityKind,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn user() -> Value {
    json!({
      "id": 12,
      "applicationIdentity": "Jane.Doe",
      "organization": { "id": 5 },
      "placeholders": [{ "id": 1 }, { "id": 2 }],
    })
  }

  #[test]
  fn field_terms() {
    let doc = user();
    assert!(SearchQuery::parse("id:12").matches(&doc));
    assert!(!SearchQuery::parse("id:13").matches(&doc));
    assert!(SearchQuery::parse("applicationIdentity:jane.doe").matches(&doc));
    assert!(SearchQuery::parse("organization.id:5").matches(&doc));
    assert!(SearchQuery::parse("placeholders.id:2").matches(&doc));
    assert!(!SearchQuery::parse("placeholders.id:3").matches(&doc));
    assert!(!SearchQuery::parse("missing:1").matches(&doc));
  }

  #[test]
  fn text_and_wildcard_terms() {
    let doc = user();
    assert!(SearchQuery::parse("doe").matches(&doc));
    assert!(!SearchQuery::parse("smith").matches(&doc));
    assert!(SearchQuery::parse("*").matches(&doc));
    assert!(SearchQuery::parse("").matches(&doc));
    assert!(SearchQuery::parse("id:12 jane").matches(&doc));
    assert!(!SearchQuery::parse("id:12 smith").matches(&doc));
  }
}
