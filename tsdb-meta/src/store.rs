//! Queries over the metadata store.
//!
//! Free functions take a `&Connection` so the server can run them on pooled
//! connections. [`MetaStore`] wraps a single connection for callers that own
//! one file, such as the restore client reading a backup's snapshot.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};

use crate::catalog::{BucketCatalog, ShardGroupInfo, ShardIdMap, ShardInfo};
use crate::error::{MetaError, Result};
use crate::id::Id;
use crate::schema;
use crate::tenant::{
    Bucket, BucketFilter, CreateBucketRequest, CreateOrganizationRequest, Organization,
    OrganizationFilter,
};

fn row_to_organization(row: &Row) -> rusqlite::Result<Organization> {
    Ok(Organization {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
    })
}

fn row_to_bucket(row: &Row) -> rusqlite::Result<Bucket> {
    Ok(Bucket {
        id: row.get("id")?,
        org_id: row.get("org_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        retention_period: row.get("retention_period")?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

pub fn find_organizations(conn: &Connection, filter: &OrganizationFilter) -> Result<Vec<Organization>> {
    let mut clauses = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(id) = filter.id {
        clauses.push("id = ?");
        values.push(Box::new(id));
    }
    if let Some(ref name) = filter.name {
        clauses.push("name = ?");
        values.push(Box::new(name.clone()));
    }

    let mut sql = "SELECT id, name, description FROM organizations".to_string();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY name");

    let params: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_slice(), row_to_organization)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Insert an organization keeping its ID.
pub fn insert_organization(conn: &Connection, org: &Organization) -> Result<()> {
    conn.execute(
        "INSERT INTO organizations (id, name, description) VALUES (?1, ?2, ?3)",
        params![org.id, org.name, org.description],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            MetaError::Conflict(format!("organization with name {} already exists", org.name))
        } else {
            e.into()
        }
    })?;
    Ok(())
}

pub fn create_organization(conn: &Connection, req: &CreateOrganizationRequest) -> Result<Organization> {
    let org = Organization {
        id: Id::generate(),
        name: req.name.clone(),
        description: req.description.clone(),
    };
    insert_organization(conn, &org)?;
    tracing::info!(id = %org.id, name = %org.name, "[Meta] Created organization");
    Ok(org)
}

pub fn find_buckets(conn: &Connection, filter: &BucketFilter) -> Result<Vec<Bucket>> {
    let mut clauses = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(org_id) = filter.org_id {
        clauses.push("org_id = ?");
        values.push(Box::new(org_id));
    }
    if let Some(id) = filter.id {
        clauses.push("id = ?");
        values.push(Box::new(id));
    }
    if let Some(ref name) = filter.name {
        clauses.push("name = ?");
        values.push(Box::new(name.clone()));
    }

    let mut sql =
        "SELECT id, org_id, name, description, retention_period FROM buckets".to_string();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY name");

    let params: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_slice(), row_to_bucket)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

fn organization_exists(conn: &Connection, id: Id) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM organizations WHERE id = ?", params![id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

fn bucket_exists(conn: &Connection, id: Id) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM buckets WHERE id = ?", params![id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

/// Insert a bucket keeping its ID.
pub fn insert_bucket(conn: &Connection, bucket: &Bucket) -> Result<()> {
    if !organization_exists(conn, bucket.org_id)? {
        return Err(MetaError::NotFound(format!("organization {}", bucket.org_id)));
    }
    conn.execute(
        "INSERT INTO buckets (id, org_id, name, description, retention_period)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            bucket.id,
            bucket.org_id,
            bucket.name,
            bucket.description,
            bucket.retention_period
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            MetaError::Conflict(format!("bucket with name {} already exists", bucket.name))
        } else {
            e.into()
        }
    })?;
    Ok(())
}

pub fn create_bucket(conn: &Connection, req: &CreateBucketRequest) -> Result<Bucket> {
    let bucket = Bucket {
        id: Id::generate(),
        org_id: req.org_id,
        name: req.name.clone(),
        description: req.description.clone(),
        retention_period: req.retention_period,
    };
    insert_bucket(conn, &bucket)?;
    tracing::info!(id = %bucket.id, org_id = %bucket.org_id, name = %bucket.name, "[Meta] Created bucket");
    Ok(bucket)
}

/// Insert a shard group and its shards keeping their IDs.
pub fn insert_shard_group(conn: &Connection, bucket_id: Id, group: &ShardGroupInfo) -> Result<()> {
    conn.execute(
        "INSERT INTO shard_groups (id, bucket_id, start_time, end_time) VALUES (?1, ?2, ?3, ?4)",
        params![group.id as i64, bucket_id, group.start_time, group.end_time],
    )?;
    for shard in &group.shards {
        conn.execute(
            "INSERT INTO shards (id, shard_group_id) VALUES (?1, ?2)",
            params![shard.id as i64, group.id as i64],
        )?;
    }
    Ok(())
}

/// Shard catalog of a bucket, or `None` if the bucket is unknown.
pub fn bucket_catalog(conn: &Connection, bucket_id: Id) -> Result<Option<BucketCatalog>> {
    if !bucket_exists(conn, bucket_id)? {
        return Ok(None);
    }

    let mut stmt = conn.prepare(
        "SELECT id, start_time, end_time FROM shard_groups WHERE bucket_id = ? ORDER BY start_time, id",
    )?;
    let groups: Vec<(i64, DateTime<Utc>, DateTime<Utc>)> = stmt
        .query_map(params![bucket_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<rusqlite::Result<_>>()?;

    let mut shard_stmt = conn.prepare("SELECT id FROM shards WHERE shard_group_id = ? ORDER BY id")?;
    let mut shard_groups = Vec::with_capacity(groups.len());
    for (id, start_time, end_time) in groups {
        let shards = shard_stmt
            .query_map(params![id], |row| {
                Ok(ShardInfo { id: row.get::<_, i64>(0)? as u64 })
            })?
            .collect::<rusqlite::Result<_>>()?;
        shard_groups.push(ShardGroupInfo {
            id: id as u64,
            start_time,
            end_time,
            shards,
        });
    }

    Ok(Some(BucketCatalog {
        bucket_id,
        shard_groups,
    }))
}

/// Create fresh shard groups and shards in `bucket_id` mirroring `catalog`.
///
/// Returns the mapping from the catalog's shard IDs to the newly allocated
/// ones. The catalog's own bucket ID is ignored.
pub fn import_catalog(conn: &mut Connection, bucket_id: Id, catalog: &BucketCatalog) -> Result<ShardIdMap> {
    if !bucket_exists(conn, bucket_id)? {
        return Err(MetaError::NotFound(format!("bucket {bucket_id}")));
    }

    let tx = conn.transaction()?;
    let mut mapping = ShardIdMap::new();
    for group in &catalog.shard_groups {
        tx.execute(
            "INSERT INTO shard_groups (bucket_id, start_time, end_time) VALUES (?1, ?2, ?3)",
            params![bucket_id, group.start_time, group.end_time],
        )?;
        let group_id = tx.last_insert_rowid();
        for shard in &group.shards {
            tx.execute("INSERT INTO shards (shard_group_id) VALUES (?1)", params![group_id])?;
            mapping.insert(shard.id, tx.last_insert_rowid() as u64);
        }
    }
    tx.commit()?;

    tracing::info!(bucket_id = %bucket_id, shards = mapping.len(), "[Meta] Imported shard catalog");
    Ok(mapping)
}

pub fn shard_exists(conn: &Connection, shard_id: u64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM shards WHERE id = ?", params![shard_id as i64], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

/// A metadata store file with one open connection.
pub struct MetaStore {
    conn: Connection,
    path: PathBuf,
}

impl MetaStore {
    /// Open an existing store read-only. The file is never modified.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        schema::verify(&conn)?;
        tracing::debug!(path = %path.display(), "[Meta] Opened metadata store read-only");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open or create a store read-write, applying the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn find_organizations(&self, filter: &OrganizationFilter) -> Result<Vec<Organization>> {
        find_organizations(&self.conn, filter)
    }

    pub fn find_buckets(&self, filter: &BucketFilter) -> Result<Vec<Bucket>> {
        find_buckets(&self.conn, filter)
    }

    pub fn bucket_catalog(&self, bucket_id: Id) -> Result<Option<BucketCatalog>> {
        bucket_catalog(&self.conn, bucket_id)
    }

    pub fn close(self) -> Result<()> {
        let path = self.path;
        self.conn.close().map_err(|(_, e)| MetaError::from(e))?;
        tracing::debug!(path = %path.display(), "[Meta] Closed metadata store");
        Ok(())
    }
}
