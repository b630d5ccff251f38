//! SQL schema for the Observatório SQLite store.
//!
//! Executed once at connection startup. The schema version lives in
//! `PRAGMA user_version`; future migrations are gated on it.

pub const SCHEMA_VERSION: i64 = 1;

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per logical localStorage key.
CREATE TABLE IF NOT EXISTS entries (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL,   -- JSON document (versioned envelope)
    digest      TEXT NOT NULL,   -- SHA-256 hex of value
    updated_at  TEXT NOT NULL    -- ISO 8601 UTC
);

PRAGMA user_version = 1;
";
