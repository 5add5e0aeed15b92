//! Manifest types for incremental backup support.
//!
//! Every backup run writes one manifest into the backup directory, named
//! after the run's UTC timestamp so that descending filename order is
//! recency order. A manifest describes the metadata-store snapshot taken by
//! the run (if any) and every shard archive it wrote.

pub mod loader;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use loader::{load_incremental, RestorePlan};

/// File name suffix of manifest files.
pub const MANIFEST_EXTENSION: &str = "manifest";

/// Backup manifest, serialized as `<timestamp>.manifest` in the backup directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kv: Option<ManifestKvEntry>,
    #[serde(default)]
    pub files: Vec<ManifestEntry>,
}

/// The metadata-store snapshot taken by a backup run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestKvEntry {
    pub file_name: String,
    #[serde(default)]
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// One shard archive written by a backup run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    #[serde(rename = "organizationID", default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(rename = "bucketID")]
    pub bucket_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,
    #[serde(rename = "shardID")]
    pub shard_id: u64,
    pub file_name: String,
    #[serde(default)]
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

impl Manifest {
    /// File name of the manifest for a backup run started at `started_at`.
    pub fn file_name_for(started_at: DateTime<Utc>) -> String {
        format!("{}.{}", started_at.format("%Y%m%dT%H%M%SZ"), MANIFEST_EXTENSION)
    }

    /// Write this manifest into `dir`, returning the path written.
    pub fn write_to_dir(&self, dir: &Path, started_at: DateTime<Utc>) -> std::io::Result<PathBuf> {
        let path = dir.join(Self::file_name_for(started_at));
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}
