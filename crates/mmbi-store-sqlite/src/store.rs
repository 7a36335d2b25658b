//! [`SqliteStore`]: the SQLite implementation of [`EntityStore`].

use std::path::Path;

use chrono::Utc;
use mmbi_core::{
  entity::{Entity, EntityId, EntityKind, Link},
  filter::Criteria,
  listing::{self, EntityQuery, Page},
  store::{ChangeEvent, ChangeOp, EntityStore},
};
use rusqlite::OptionalExtension as _;

use crate::{
  Error, Result,
  encode::{RawChange, RawEntity, encode_body, encode_dt, encode_op},
  schema::SCHEMA,
};

// ─── Rejections ──────────────────────────────────────────────────────────────

/// A write refused inside the transaction; nothing was committed.
enum Rejection {
  NotFound,
  UnknownReference(Link),
  StillReferenced(u64),
}

impl Rejection {
  fn into_error(self, kind: EntityKind, id: EntityId) -> Error {
    let core = match self {
      Rejection::NotFound => mmbi_core::Error::NotFound { kind, id },
      Rejection::UnknownReference(link) => mmbi_core::Error::UnknownReference {
        kind,
        relation: link.relation,
        target: link.target,
        id: link.id,
      },
      Rejection::StillReferenced(referrers) => {
        mmbi_core::Error::StillReferenced { kind, id, referrers }
      }
    };
    Error::Core(core)
  }
}

// ─── Transaction helpers ─────────────────────────────────────────────────────

fn kind_of(
  conn: &rusqlite::Connection,
  id: EntityId,
) -> rusqlite::Result<Option<String>> {
  conn
    .query_row(
      "SELECT kind FROM entities WHERE entity_id = ?1",
      rusqlite::params![id],
      |row| row.get(0),
    )
    .optional()
}

/// The first link whose target is missing or of the wrong kind.
fn dangling_link(
  conn: &rusqlite::Connection,
  links: &[Link],
) -> rusqlite::Result<Option<Link>> {
  for link in links {
    let found = kind_of(conn, link.id)?;
    if found.as_deref() != Some(link.target.as_str()) {
      return Ok(Some(*link));
    }
  }
  Ok(None)
}

fn write_links(
  conn: &rusqlite::Connection,
  owner_id: EntityId,
  links: &[Link],
) -> rusqlite::Result<()> {
  conn.execute(
    "DELETE FROM entity_links WHERE owner_id = ?1",
    rusqlite::params![owner_id],
  )?;
  let mut stmt = conn.prepare(
    "INSERT OR IGNORE INTO entity_links (owner_id, relation, target_kind, target_id)
     VALUES (?1, ?2, ?3, ?4)",
  )?;
  for link in links {
    stmt.execute(rusqlite::params![
      owner_id,
      link.relation,
      link.target.as_str(),
      link.id
    ])?;
  }
  Ok(())
}

fn append_change(
  conn: &rusqlite::Connection,
  kind: EntityKind,
  entity_id: EntityId,
  op: ChangeOp,
  document: Option<&str>,
  recorded_at: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO outbox (kind, entity_id, op, document, recorded_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![kind.as_str(), entity_id, encode_op(op), document, recorded_at],
  )?;
  Ok(())
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// The primary store, backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Every stored entity of kind `E`, in id order.
  async fn load_all<E: Entity>(&self) -> Result<Vec<E>> {
    let kind = E::KIND.as_str();

    let raws: Vec<RawEntity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT entity_id, body_json FROM entities
           WHERE kind = ?1
           ORDER BY entity_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![kind], |row| {
            Ok(RawEntity {
              entity_id: row.get(0)?,
              body_json: row.get(1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntity::into_entity).collect()
  }

  /// Number of unacknowledged outbox events.
  pub async fn outbox_len(&self) -> Result<u64> {
    let n: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))?)
      })
      .await?;
    Ok(n as u64)
  }

  /// Number of outbox events parked as unusable.
  pub async fn dead_letter_len(&self) -> Result<u64> {
    let n: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM outbox_dead_letters", [], |row| {
          row.get(0)
        })?)
      })
      .await?;
    Ok(n as u64)
  }

  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: &'static str) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── EntityStore impl ────────────────────────────────────────────────────────

impl EntityStore for SqliteStore {
  type Error = Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn insert<E: Entity>(&self, mut entity: E) -> Result<E> {
    entity.normalize();
    entity.set_id(None);
    let links    = entity.links();
    let document = entity.to_document()?;
    let now      = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if let Some(link) = dangling_link(&tx, &links)? {
          return Ok(Err(Rejection::UnknownReference(link)));
        }

        tx.execute(
          "INSERT INTO entities (kind, body_json, created_at, updated_at)
           VALUES (?1, '{}', ?2, ?2)",
          rusqlite::params![E::KIND.as_str(), now],
        )?;
        let id   = tx.last_insert_rowid();
        let body = encode_body(document, id);
        tx.execute(
          "UPDATE entities SET body_json = ?1 WHERE entity_id = ?2",
          rusqlite::params![body, id],
        )?;
        write_links(&tx, id, &links)?;
        append_change(&tx, E::KIND, id, ChangeOp::Upsert, Some(&body), &now)?;
        tx.commit()?;
        Ok(Ok(id))
      })
      .await?;

    let id = outcome.map_err(|r| r.into_error(E::KIND, 0))?;
    tracing::debug!(kind = %E::KIND, id, "entity inserted");
    entity.set_id(Some(id));
    Ok(entity)
  }

  async fn update<E: Entity>(&self, mut entity: E) -> Result<E> {
    let id = entity
      .id()
      .ok_or(mmbi_core::Error::MissingIdentifier(E::KIND))?;
    entity.normalize();
    let links    = entity.links();
    let document = entity.to_document()?;
    let now      = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if kind_of(&tx, id)?.as_deref() != Some(E::KIND.as_str()) {
          return Ok(Err(Rejection::NotFound));
        }
        if let Some(link) = dangling_link(&tx, &links)? {
          return Ok(Err(Rejection::UnknownReference(link)));
        }

        let body = encode_body(document, id);
        tx.execute(
          "UPDATE entities
           SET body_json = ?1, version = version + 1, updated_at = ?2
           WHERE entity_id = ?3",
          rusqlite::params![body, now, id],
        )?;
        write_links(&tx, id, &links)?;
        append_change(&tx, E::KIND, id, ChangeOp::Upsert, Some(&body), &now)?;
        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;

    outcome.map_err(|r| r.into_error(E::KIND, id))?;
    tracing::debug!(kind = %E::KIND, id, "entity updated");
    Ok(entity)
  }

  async fn delete<E: Entity>(&self, id: EntityId) -> Result<()> {
    let now = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if kind_of(&tx, id)?.as_deref() != Some(E::KIND.as_str()) {
          return Ok(Err(Rejection::NotFound));
        }
        let referrers: i64 = tx.query_row(
          "SELECT COUNT(DISTINCT owner_id) FROM entity_links
           WHERE target_id = ?1 AND owner_id != ?1",
          rusqlite::params![id],
          |row| row.get(0),
        )?;
        if referrers > 0 {
          return Ok(Err(Rejection::StillReferenced(referrers as u64)));
        }

        tx.execute(
          "DELETE FROM entity_links WHERE owner_id = ?1",
          rusqlite::params![id],
        )?;
        tx.execute(
          "DELETE FROM entities WHERE entity_id = ?1",
          rusqlite::params![id],
        )?;
        append_change(&tx, E::KIND, id, ChangeOp::Delete, None, &now)?;
        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;

    outcome.map_err(|r| r.into_error(E::KIND, id))?;
    tracing::debug!(kind = %E::KIND, id, "entity deleted");
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get<E: Entity>(&self, id: EntityId) -> Result<Option<E>> {
    let kind = E::KIND.as_str();

    let raw: Option<RawEntity> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT entity_id, body_json FROM entities
             WHERE entity_id = ?1 AND kind = ?2",
            rusqlite::params![id, kind],
            |row| {
              Ok(RawEntity {
                entity_id: row.get(0)?,
                body_json: row.get(1)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawEntity::into_entity).transpose()
  }

  async fn list<E: Entity>(&self, query: &EntityQuery) -> Result<Page<E>> {
    // Filtering runs over decoded entities so list, count and the evaluator
    // share one definition of every operator.
    let all = self.load_all::<E>().await?;
    Ok(listing::select(all, query))
  }

  async fn count<E: Entity>(&self, criteria: &Criteria) -> Result<u64> {
    let all = self.load_all::<E>().await?;
    Ok(all.iter().filter(|e| criteria.matches(*e)).count() as u64)
  }

  // ── Outbox ────────────────────────────────────────────────────────────────

  async fn pending_changes(&self, limit: usize) -> Result<Vec<ChangeEvent>> {
    let limit = limit as i64;

    let raws: Vec<RawChange> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT seq, kind, entity_id, op, document, recorded_at
           FROM outbox
           ORDER BY seq
           LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit], |row| {
            Ok(RawChange {
              seq:         row.get(0)?,
              kind:        row.get(1)?,
              entity_id:   row.get(2)?,
              op:          row.get(3)?,
              document:    row.get(4)?,
              recorded_at: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    // Rows that fail to decode are parked, not returned.
    let mut events = Vec::with_capacity(raws.len());
    for raw in raws {
      let seq = raw.seq;
      match raw.into_event() {
        Ok(event) => events.push(event),
        Err(err) => self.dead_letter(seq, err.to_string()).await?,
      }
    }
    Ok(events)
  }

  async fn acknowledge(&self, seq: i64) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM outbox WHERE seq = ?1", rusqlite::params![seq])?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn dead_letter(&self, seq: i64, reason: String) -> Result<()> {
    let now = encode_dt(Utc::now());
    let logged = reason.clone();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT OR REPLACE INTO outbox_dead_letters
             (seq, kind, entity_id, op, document, recorded_at, reason, failed_at)
           SELECT seq, kind, entity_id, op, document, recorded_at, ?2, ?3
           FROM outbox WHERE seq = ?1",
          rusqlite::params![seq, reason, now],
        )?;
        tx.execute("DELETE FROM outbox WHERE seq = ?1", rusqlite::params![seq])?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::error!(seq, reason = %logged, "outbox event moved to dead letters");
    Ok(())
  }

  async fn enqueue_reindex(&self, kind: EntityKind) -> Result<u64> {
    let now = encode_dt(Utc::now());

    let enqueued = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO outbox (kind, entity_id, op, document, recorded_at)
           SELECT kind, entity_id, ?2, body_json, ?3
           FROM entities WHERE kind = ?1
           ORDER BY entity_id",
          rusqlite::params![kind.as_str(), encode_op(ChangeOp::Upsert), now],
        )?)
      })
      .await?;

    tracing::info!(%kind, enqueued, "reindex enqueued");
    Ok(enqueued as u64)
  }
}
