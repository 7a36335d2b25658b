//! Integration tests for `SqliteStore` against an in-memory database.

use mmbi_core::{
  Error as CoreError,
  entity::{EntityKind, EntityRef},
  filter::Criteria,
  listing::EntityQuery,
  model::{ApplicationUser, Dealer, Placeholder, SecurityClearance},
  store::{ChangeOp, EntityStore},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn placeholder(description: &str) -> Placeholder {
  Placeholder {
    description: Some(description.into()),
    token: Some("AAAAAAAAAA".into()),
    ..Default::default()
  }
}

fn dealer(name: &str) -> Dealer {
  Dealer { dealer_name: Some(name.into()), ..Default::default() }
}

fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
  pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn core_error(err: Error) -> CoreError {
  match err {
    Error::Core(e) => e,
    other => panic!("expected a domain error, got {other:?}"),
  }
}

// ─── CRUD ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_assigns_id_and_get_returns_it() {
  let s = store().await;

  let stored = s.insert(placeholder("AAAAAAAAAA")).await.unwrap();
  let id = stored.id.expect("assigned id");

  let fetched: Placeholder = s.get(id).await.unwrap().expect("stored row");
  assert_eq!(fetched, stored);
  assert_eq!(fetched.description.as_deref(), Some("AAAAAAAAAA"));
}

#[tokio::test]
async fn insert_ignores_client_id() {
  let s = store().await;
  let mut p = placeholder("x");
  p.id = Some(4242);
  let stored = s.insert(p).await.unwrap();
  assert_ne!(stored.id, Some(4242));
}

#[tokio::test]
async fn ids_come_from_one_sequence() {
  let s = store().await;
  let a = s.insert(placeholder("a")).await.unwrap();
  let d = s.insert(dealer("d")).await.unwrap();
  assert_ne!(a.id, d.id);
}

#[tokio::test]
async fn get_is_scoped_to_kind() {
  let s = store().await;
  let p = s.insert(placeholder("a")).await.unwrap();
  let as_dealer: Option<Dealer> = s.get(p.id.unwrap()).await.unwrap();
  assert!(as_dealer.is_none());
}

#[tokio::test]
async fn get_missing_returns_none() {
  let s = store().await;
  let result: Option<Placeholder> = s.get(999).await.unwrap();
  assert!(result.is_none());
}

#[tokio::test]
async fn update_replaces_body() {
  let s = store().await;
  let mut p = s.insert(placeholder("AAAAAAAAAA")).await.unwrap();
  p.description = Some("BBBBBBBBBB".into());
  p.token = None;

  s.update(p.clone()).await.unwrap();

  let fetched: Placeholder = s.get(p.id.unwrap()).await.unwrap().unwrap();
  assert_eq!(fetched.description.as_deref(), Some("BBBBBBBBBB"));
  assert_eq!(fetched.token, None);
}

#[tokio::test]
async fn update_unknown_id_is_not_found() {
  let s = store().await;
  let mut p = placeholder("x");
  p.id = Some(77);
  let err = core_error(s.update(p).await.unwrap_err());
  assert!(matches!(err, CoreError::NotFound { kind: EntityKind::Placeholder, id: 77 }));
}

#[tokio::test]
async fn delete_removes_row() {
  let s = store().await;
  let p = s.insert(placeholder("x")).await.unwrap();
  let id = p.id.unwrap();

  s.delete::<Placeholder>(id).await.unwrap();

  let gone: Option<Placeholder> = s.get(id).await.unwrap();
  assert!(gone.is_none());
  let err = core_error(s.delete::<Placeholder>(id).await.unwrap_err());
  assert!(matches!(err, CoreError::NotFound { .. }));
}

// ─── Referential integrity ───────────────────────────────────────────────────

async fn application_user(s: &SqliteStore) -> ApplicationUser {
  let org = s.insert(dealer("Org")).await.unwrap();
  let dept = s.insert(dealer("Dept")).await.unwrap();
  let clearance = s
    .insert(SecurityClearance {
      clearance_level: Some("TOP".into()),
      ..Default::default()
    })
    .await
    .unwrap();

  ApplicationUser {
    designation: Some(Uuid::new_v4()),
    application_identity: Some("AAAAAAAAAA".into()),
    organization: org.id.map(EntityRef::new),
    department: dept.id.map(EntityRef::new),
    security_clearance: clearance.id.map(EntityRef::new),
    ..Default::default()
  }
}

#[tokio::test]
async fn unknown_reference_is_rejected_without_side_effects() {
  let s = store().await;
  let mut user = application_user(&s).await;
  user.placeholders = vec![EntityRef::new(9999)];
  let before = s.outbox_len().await.unwrap();

  let err = core_error(s.insert(user).await.unwrap_err());
  match err {
    CoreError::UnknownReference { relation, target, id, .. } => {
      assert_eq!(relation, "placeholders");
      assert_eq!(target, EntityKind::Placeholder);
      assert_eq!(id, 9999);
    }
    other => panic!("unexpected {other:?}"),
  }

  let users = s.count::<ApplicationUser>(&Criteria::new()).await.unwrap();
  assert_eq!(users, 0);
  assert_eq!(s.outbox_len().await.unwrap(), before);
}

#[tokio::test]
async fn reference_of_wrong_kind_is_rejected() {
  let s = store().await;
  let mut user = application_user(&s).await;
  let p = s.insert(placeholder("not a dealer")).await.unwrap();
  user.organization = p.id.map(EntityRef::new);

  let err = core_error(s.insert(user).await.unwrap_err());
  assert!(matches!(err, CoreError::UnknownReference { relation: "organization", .. }));
}

#[tokio::test]
async fn update_with_unknown_reference_changes_nothing() {
  let s = store().await;
  let stored = s.insert(application_user(&s).await).await.unwrap();
  let other = s.insert(placeholder("not a clearance")).await.unwrap();
  let before = s.outbox_len().await.unwrap();

  let mut dangling = stored.clone();
  dangling.placeholders = vec![EntityRef::new(9999)];
  let err = core_error(s.update(dangling).await.unwrap_err());
  assert!(matches!(err, CoreError::UnknownReference { relation: "placeholders", id: 9999, .. }));

  let mut wrong_kind = stored.clone();
  wrong_kind.security_clearance = other.id.map(EntityRef::new);
  wrong_kind.application_identity = Some("BBBBBBBBBB".into());
  let err = core_error(s.update(wrong_kind).await.unwrap_err());
  assert!(matches!(err, CoreError::UnknownReference { relation: "securityClearance", .. }));

  let fetched: ApplicationUser = s.get(stored.id.unwrap()).await.unwrap().unwrap();
  assert_eq!(fetched, stored);
  assert_eq!(s.outbox_len().await.unwrap(), before);
}

#[tokio::test]
async fn referenced_entity_cannot_be_deleted() {
  let s = store().await;
  let user = s.insert(application_user(&s).await).await.unwrap();
  let org_id = user.organization.unwrap().id;

  let err = core_error(s.delete::<Dealer>(org_id).await.unwrap_err());
  assert!(matches!(err, CoreError::StillReferenced { referrers: 1, .. }));

  // Once the referrer is gone the dealer can be removed.
  s.delete::<ApplicationUser>(user.id.unwrap()).await.unwrap();
  s.delete::<Dealer>(org_id).await.unwrap();
}

#[tokio::test]
async fn self_reference_does_not_block_delete() {
  let s = store().await;
  let mut p = s.insert(placeholder("self")).await.unwrap();
  p.containing_placeholder = p.id.map(EntityRef::new);
  s.update(p.clone()).await.unwrap();

  s.delete::<Placeholder>(p.id.unwrap()).await.unwrap();
}

#[tokio::test]
async fn dropping_a_many_to_many_reference_frees_the_target() {
  let s = store().await;
  let tag = s.insert(placeholder("tag")).await.unwrap();
  let mut d = dealer("Dealer");
  d.placeholders = vec![EntityRef::new(tag.id.unwrap())];
  let mut d = s.insert(d).await.unwrap();

  assert!(s.delete::<Placeholder>(tag.id.unwrap()).await.is_err());

  d.placeholders.clear();
  s.update(d).await.unwrap();
  s.delete::<Placeholder>(tag.id.unwrap()).await.unwrap();
}

// ─── Listing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_filters_sorts_and_pages() {
  let s = store().await;
  for desc in ["c", "a", "b", "a"] {
    s.insert(placeholder(desc)).await.unwrap();
  }

  let query = EntityQuery::from_params::<Placeholder>(&params(&[
    ("description.in", "a,b"),
    ("sort", "description,desc"),
    ("size", "2"),
  ]))
  .unwrap();
  let page = s.list::<Placeholder>(&query).await.unwrap();

  assert_eq!(page.total, 3);
  let descs: Vec<_> = page
    .items
    .iter()
    .map(|p| p.description.clone().unwrap())
    .collect();
  assert_eq!(descs, vec!["b", "a"]);
}

#[tokio::test]
async fn count_applies_relation_filters() {
  let s = store().await;
  let user = s.insert(application_user(&s).await).await.unwrap();
  let org_id = user.organization.unwrap().id;

  let hit = Criteria::from_params::<ApplicationUser>(&params(&[(
    "organizationId.equals",
    &org_id.to_string(),
  )]))
  .unwrap();
  let miss = Criteria::from_params::<ApplicationUser>(&params(&[(
    "organizationId.equals",
    &(org_id + 1000).to_string(),
  )]))
  .unwrap();

  assert_eq!(s.count::<ApplicationUser>(&hit).await.unwrap(), 1);
  assert_eq!(s.count::<ApplicationUser>(&miss).await.unwrap(), 0);
}

// ─── Outbox ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn every_mutation_appends_an_ordered_change() {
  let s = store().await;
  let mut p = s.insert(placeholder("AAAAAAAAAA")).await.unwrap();
  let id = p.id.unwrap();
  p.description = Some("BBBBBBBBBB".into());
  s.update(p).await.unwrap();
  s.delete::<Placeholder>(id).await.unwrap();

  let changes = s.pending_changes(10).await.unwrap();
  assert_eq!(changes.len(), 3);
  assert!(changes.windows(2).all(|w| w[0].seq < w[1].seq));
  assert!(changes.iter().all(|c| c.entity_id == id && c.kind == EntityKind::Placeholder));

  assert_eq!(changes[0].op, ChangeOp::Upsert);
  assert_eq!(changes[0].document.as_ref().unwrap()["id"], id);
  assert_eq!(
    changes[1].document.as_ref().unwrap()["description"],
    "BBBBBBBBBB"
  );
  assert_eq!(changes[2].op, ChangeOp::Delete);
  assert!(changes[2].document.is_none());
}

#[tokio::test]
async fn acknowledge_removes_change() {
  let s = store().await;
  s.insert(placeholder("a")).await.unwrap();
  s.insert(placeholder("b")).await.unwrap();

  let first = s.pending_changes(1).await.unwrap();
  assert_eq!(first.len(), 1);
  s.acknowledge(first[0].seq).await.unwrap();

  let rest = s.pending_changes(10).await.unwrap();
  assert_eq!(rest.len(), 1);
  assert!(rest[0].seq > first[0].seq);
}

#[tokio::test]
async fn undecodable_changes_move_to_dead_letters() {
  let s = store().await;
  for desc in ["a", "b", "c"] {
    s.insert(placeholder(desc)).await.unwrap();
  }
  s.execute_raw(
    "UPDATE outbox SET op = 'rename' WHERE seq = (SELECT MIN(seq) FROM outbox);
     UPDATE outbox SET document = NULL WHERE seq = (SELECT MAX(seq) FROM outbox);",
  )
  .await
  .unwrap();

  let changes = s.pending_changes(10).await.unwrap();
  assert_eq!(changes.len(), 1);
  assert_eq!(changes[0].document.as_ref().unwrap()["description"], "b");
  assert_eq!(s.outbox_len().await.unwrap(), 1);
  assert_eq!(s.dead_letter_len().await.unwrap(), 2);
}

#[tokio::test]
async fn dead_letter_parks_a_change() {
  let s = store().await;
  s.insert(placeholder("a")).await.unwrap();
  let seq = s.pending_changes(1).await.unwrap()[0].seq;

  s.dead_letter(seq, "index rejected document".into()).await.unwrap();

  assert_eq!(s.outbox_len().await.unwrap(), 0);
  assert_eq!(s.dead_letter_len().await.unwrap(), 1);
}

#[tokio::test]
async fn reindex_enqueues_every_entity_of_kind() {
  let s = store().await;
  s.insert(placeholder("a")).await.unwrap();
  s.insert(placeholder("b")).await.unwrap();
  s.insert(dealer("d")).await.unwrap();
  for change in s.pending_changes(10).await.unwrap() {
    s.acknowledge(change.seq).await.unwrap();
  }

  let enqueued = s.enqueue_reindex(EntityKind::Placeholder).await.unwrap();
  assert_eq!(enqueued, 2);

  let changes = s.pending_changes(10).await.unwrap();
  assert_eq!(changes.len(), 2);
  assert!(changes.iter().all(|c| c.op == ChangeOp::Upsert && c.document.is_some()));
}
