//! [`MemoryIndex`]: an in-process [`SearchIndex`].

use std::{
  collections::{BTreeMap, HashMap},
  sync::atomic::{AtomicBool, Ordering},
};

use mmbi_core::{
  entity::{EntityId, EntityKind},
  search::{SearchIndex, SearchQuery},
};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::IndexError;

/// Documents keyed by kind, then by id.
///
/// The index can be switched off with [`MemoryIndex::set_available`]; while
/// unavailable every write fails with [`IndexError::Unavailable`] and reads
/// keep serving the last applied state.
#[derive(Debug)]
pub struct MemoryIndex {
  documents: RwLock<HashMap<EntityKind, BTreeMap<EntityId, Value>>>,
  available: AtomicBool,
}

impl Default for MemoryIndex {
  fn default() -> Self { Self::new() }
}

impl MemoryIndex {
  pub fn new() -> Self {
    Self {
      documents: RwLock::new(HashMap::new()),
      available: AtomicBool::new(true),
    }
  }

  pub fn set_available(&self, available: bool) {
    self.available.store(available, Ordering::SeqCst);
  }

  pub fn is_available(&self) -> bool { self.available.load(Ordering::SeqCst) }

  fn check_available(&self) -> Result<(), IndexError> {
    if self.is_available() { Ok(()) } else { Err(IndexError::Unavailable) }
  }
}

impl SearchIndex for MemoryIndex {
  type Error = IndexError;

  async fn upsert(
    &self,
    kind: EntityKind,
    id: EntityId,
    document: Value,
  ) -> Result<(), IndexError> {
    self.check_available()?;
    self
      .documents
      .write()
      .await
      .entry(kind)
      .or_default()
      .insert(id, document);
    Ok(())
  }

  async fn remove(&self, kind: EntityKind, id: EntityId) -> Result<(), IndexError> {
    self.check_available()?;
    if let Some(docs) = self.documents.write().await.get_mut(&kind) {
      docs.remove(&id);
    }
    Ok(())
  }

  async fn get(
    &self,
    kind: EntityKind,
    id: EntityId,
  ) -> Result<Option<Value>, IndexError> {
    let documents = self.documents.read().await;
    Ok(documents.get(&kind).and_then(|docs| docs.get(&id)).cloned())
  }

  async fn search(
    &self,
    kind: EntityKind,
    query: &SearchQuery,
  ) -> Result<Vec<Value>, IndexError> {
    let documents = self.documents.read().await;
    Ok(
      documents
        .get(&kind)
        .map(|docs| docs.values().filter(|d| query.matches(d)).cloned().collect())
        .unwrap_or_default(),
    )
  }

  async fn count(&self, kind: EntityKind) -> Result<u64, IndexError> {
    let documents = self.documents.read().await;
    Ok(documents.get(&kind).map_or(0, |docs| docs.len() as u64))
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[tokio::test]
  async fn upsert_replaces_and_remove_deletes() {
    let index = MemoryIndex::new();
    index
      .upsert(EntityKind::Dealer, 3, json!({ "id": 3, "dealerName": "a" }))
      .await
      .unwrap();
    index
      .upsert(EntityKind::Dealer, 3, json!({ "id": 3, "dealerName": "b" }))
      .await
      .unwrap();

    assert_eq!(index.count(EntityKind::Dealer).await.unwrap(), 1);
    let doc = index.get(EntityKind::Dealer, 3).await.unwrap().unwrap();
    assert_eq!(doc["dealerName"], "b");

    index.remove(EntityKind::Dealer, 3).await.unwrap();
    index.remove(EntityKind::Dealer, 3).await.unwrap();
    assert_eq!(index.count(EntityKind::Dealer).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn kinds_are_separate() {
    let index = MemoryIndex::new();
    index.upsert(EntityKind::Dealer, 1, json!({ "id": 1 })).await.unwrap();
    assert!(index.get(EntityKind::Placeholder, 1).await.unwrap().is_none());
    assert_eq!(index.count(EntityKind::Placeholder).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn search_returns_matches_in_id_order() {
    let index = MemoryIndex::new();
    for (id, name) in [(9, "Acme"), (2, "acme bank"), (5, "Other")] {
      index
        .upsert(EntityKind::Dealer, id, json!({ "id": id, "dealerName": name }))
        .await
        .unwrap();
    }

    let hits = index
      .search(EntityKind::Dealer, &SearchQuery::parse("acme"))
      .await
      .unwrap();
    let ids: Vec<_> = hits.iter().map(|d| d["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![2, 9]);
  }

  #[tokio::test]
  async fn unavailable_index_rejects_writes_but_serves_reads() {
    let index = MemoryIndex::new();
    index.upsert(EntityKind::Dealer, 1, json!({ "id": 1 })).await.unwrap();
    index.set_available(false);

    let err = index.upsert(EntityKind::Dealer, 2, json!({ "id": 2 })).await;
    assert!(matches!(err, Err(IndexError::Unavailable)));
    assert!(index.remove(EntityKind::Dealer, 1).await.is_err());
    assert_eq!(index.count(EntityKind::Dealer).await.unwrap(), 1);

    index.set_available(true);
    index.upsert(EntityKind::Dealer, 2, json!({ "id": 2 })).await.unwrap();
    assert_eq!(index.count(EntityKind::Dealer).await.unwrap(), 2);
  }
}
