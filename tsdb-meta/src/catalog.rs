//! Per-bucket shard catalog.
//!
//! The catalog is what the "restore bucket" call carries: the shard groups of
//! one bucket as they existed at backup time. The receiving server allocates
//! fresh shard IDs and answers with a [`ShardIdMap`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::id::Id;

/// Backup-local shard ID to server-assigned shard ID.
pub type ShardIdMap = BTreeMap<u64, u64>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketCatalog {
    #[serde(rename = "bucketID")]
    pub bucket_id: Id,
    pub shard_groups: Vec<ShardGroupInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardGroupInfo {
    pub id: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub shards: Vec<ShardInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    pub id: u64,
}

impl BucketCatalog {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(buf)?)
    }

    pub fn shard_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.shard_groups
            .iter()
            .flat_map(|g| g.shards.iter().map(|s| s.id))
    }
}
