//! Metadata store schema.

use rusqlite::Connection;

use crate::error::{MetaError, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS organizations (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL UNIQUE,
  description TEXT NOT NULL DEFAULT '',
  created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS buckets (
  id TEXT PRIMARY KEY,
  org_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
  name TEXT NOT NULL,
  description TEXT NOT NULL DEFAULT '',
  retention_period INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL DEFAULT (datetime('now')),
  UNIQUE (org_id, name)
);

CREATE TABLE IF NOT EXISTS shard_groups (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  bucket_id TEXT NOT NULL REFERENCES buckets(id) ON DELETE CASCADE,
  start_time TEXT NOT NULL,
  end_time TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS shards (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  shard_group_id INTEGER NOT NULL REFERENCES shard_groups(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_buckets_org_id ON buckets(org_id);
CREATE INDEX IF NOT EXISTS idx_shard_groups_bucket_id ON shard_groups(bucket_id);
CREATE INDEX IF NOT EXISTS idx_shards_group_id ON shards(shard_group_id);
"#;

const REQUIRED_TABLES: &[&str] = &["organizations", "buckets", "shard_groups", "shards"];

/// Create all tables. Idempotent.
pub fn migrate(conn: &Connection) -> Result<()> {
    tracing::debug!("[Meta] Applying metadata store schema");
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Check that `conn` holds a metadata store, without modifying it.
pub fn verify(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;

    for table in REQUIRED_TABLES {
        if !tables.iter().any(|t| t == table) {
            return Err(MetaError::InvalidStore(format!("missing table {table}")));
        }
    }
    Ok(())
}
