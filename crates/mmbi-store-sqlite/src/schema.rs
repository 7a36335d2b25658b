//! SQL schema for the SQLite primary store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per entity of any kind; ids come from a single global sequence.
CREATE TABLE IF NOT EXISTS entities (
    entity_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    kind        TEXT    NOT NULL,   -- EntityKind, snake_case
    body_json   TEXT    NOT NULL,   -- full wire document including id
    version     INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT    NOT NULL,   -- ISO 8601 UTC
    updated_at  TEXT    NOT NULL
);

-- Relationship edges, owned by the referencing side.
CREATE TABLE IF NOT EXISTS entity_links (
    owner_id    INTEGER NOT NULL REFERENCES entities(entity_id) ON DELETE CASCADE,
    relation    TEXT    NOT NULL,
    target_kind TEXT    NOT NULL,
    target_id   INTEGER NOT NULL REFERENCES entities(entity_id),
    PRIMARY KEY (owner_id, relation, target_id)
);

-- Committed mutations not yet mirrored into the search index.
CREATE TABLE IF NOT EXISTS outbox (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    kind        TEXT    NOT NULL,
    entity_id   INTEGER NOT NULL,
    op          TEXT    NOT NULL,   -- 'upsert' | 'delete'
    document    TEXT,               -- NULL for deletes
    recorded_at TEXT    NOT NULL
);

-- Outbox events that can never be applied, parked for inspection.
CREATE TABLE IF NOT EXISTS outbox_dead_letters (
    seq         INTEGER PRIMARY KEY,
    kind        TEXT    NOT NULL,
    entity_id   INTEGER NOT NULL,
    op          TEXT    NOT NULL,
    document    TEXT,
    recorded_at TEXT    NOT NULL,
    reason      TEXT    NOT NULL,
    failed_at   TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS entities_kind_idx     ON entities(kind);
CREATE INDEX IF NOT EXISTS entity_links_target_idx ON entity_links(target_id);

PRAGMA user_version = 1;
";
