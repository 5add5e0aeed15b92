//! Test helpers: an in-memory server and backup directory fixtures.

use async_compression::tokio::bufread::{GzipEncoder, ZstdEncoder};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::StreamExt;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tsdb_meta::store::{insert_bucket, insert_organization, insert_shard_group};
use tsdb_meta::{Bucket, BucketCatalog, Id, MetaStore, Organization, ShardGroupInfo, ShardIdMap, ShardInfo};

use crate::client::{BucketService, ByteStream, OrganizationService, RestoreService};
use crate::manifest::{Manifest, ManifestEntry, ManifestKvEntry};
use crate::utils::{RestoreError, Result};

pub async fn gzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzipEncoder::new(data).read_to_end(&mut out).await.unwrap();
    out
}

pub async fn zstd(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    ZstdEncoder::new(data).read_to_end(&mut out).await.unwrap();
    out
}

pub fn id(value: u64) -> Id {
    Id::new(value).unwrap()
}

pub fn ts(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, day, 0, 0, 0).unwrap()
}

async fn collect(mut stream: ByteStream) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf)
}

/// What the fake server has been asked to do.
#[derive(Debug, Default)]
pub struct FakeState {
    pub kv: Option<Vec<u8>>,
    pub orgs: Vec<Organization>,
    pub buckets: Vec<Bucket>,
    pub catalogs: HashMap<Id, BucketCatalog>,
    pub shards: HashMap<u64, Vec<u8>>,
    /// Every call in order, e.g. `create_bucket:metrics`.
    pub calls: Vec<String>,
    /// Backup shard IDs left out of every returned shard ID map.
    pub unmapped: HashSet<u64>,
    /// Server shard IDs whose restore fails.
    pub failing_shards: HashSet<u64>,
    pub fail_kv: bool,
    /// Cancelled once the first shard has been stored.
    pub cancel_after_shard: Option<CancellationToken>,
    next_id: u64,
    next_shard_id: u64,
}

/// In-memory stand-in for a running server.
#[derive(Debug, Default)]
pub struct FakeServer {
    state: Mutex<FakeState>,
}

impl FakeServer {
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn with_org(self, org_id: u64, name: &str) -> Self {
        self.state().orgs.push(Organization {
            id: id(org_id),
            name: name.into(),
            description: String::new(),
        });
        self
    }
}

impl FakeState {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        id(0x1000 + self.next_id)
    }

    fn next_shard_id(&mut self) -> u64 {
        self.next_shard_id += 1;
        1000 + self.next_shard_id
    }
}

#[async_trait]
impl RestoreService for FakeServer {
    async fn replace_metadata_store(&self, snapshot: ByteStream) -> Result<()> {
        self.state().calls.push("replace_metadata_store".into());
        let data = collect(snapshot).await?;
        let mut state = self.state();
        if state.fail_kv {
            return Err(RestoreError::Remote { status: 500, message: "replace failed".into() });
        }
        state.kv = Some(data);
        Ok(())
    }

    async fn create_shard_catalog(&self, bucket_id: Id, catalog: Vec<u8>) -> Result<ShardIdMap> {
        let catalog = BucketCatalog::from_bytes(&catalog)?;
        let mut state = self.state();
        state.calls.push(format!("create_shard_catalog:{bucket_id}"));
        if !state.buckets.iter().any(|b| b.id == bucket_id) {
            return Err(RestoreError::Remote { status: 404, message: format!("bucket {bucket_id} not found") });
        }

        let mut mapping = ShardIdMap::new();
        for shard_id in catalog.shard_ids() {
            if !state.unmapped.contains(&shard_id) {
                let new_id = state.next_shard_id();
                mapping.insert(shard_id, new_id);
            }
        }
        state.catalogs.insert(bucket_id, catalog);
        Ok(mapping)
    }

    async fn restore_shard(&self, shard_id: u64, data: ByteStream) -> Result<()> {
        self.state().calls.push(format!("restore_shard:{shard_id}"));
        let data = collect(data).await?;
        let mut state = self.state();
        if state.failing_shards.contains(&shard_id) {
            return Err(RestoreError::Remote { status: 500, message: format!("shard {shard_id} rejected") });
        }
        state.shards.insert(shard_id, data);
        if let Some(token) = state.cancel_after_shard.take() {
            token.cancel();
        }
        Ok(())
    }
}

#[async_trait]
impl OrganizationService for FakeServer {
    async fn find_organization_by_name(&self, name: &str) -> Result<Option<Organization>> {
        let mut state = self.state();
        state.calls.push(format!("find_organization:{name}"));
        Ok(state.orgs.iter().find(|o| o.name == name).cloned())
    }

    async fn create_organization(&self, org: &Organization) -> Result<Organization> {
        let mut state = self.state();
        state.calls.push(format!("create_organization:{}", org.name));
        if state.orgs.iter().any(|o| o.name == org.name) {
            return Err(RestoreError::Remote { status: 409, message: "organization already exists".into() });
        }
        let created = Organization {
            id: state.next_id(),
            ..org.clone()
        };
        state.orgs.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl BucketService for FakeServer {
    async fn create_bucket(&self, bucket: &Bucket) -> Result<Bucket> {
        let mut state = self.state();
        state.calls.push(format!("create_bucket:{}", bucket.name));
        if state
            .buckets
            .iter()
            .any(|b| b.org_id == bucket.org_id && b.name == bucket.name)
        {
            return Err(RestoreError::Remote {
                status: 409,
                message: format!("bucket with name {} already exists", bucket.name),
            });
        }
        let created = Bucket {
            id: state.next_id(),
            ..bucket.clone()
        };
        state.buckets.push(created.clone());
        Ok(created)
    }
}

/// Builder for a backup directory: one metadata snapshot, shard archives and
/// a manifest describing them.
pub struct BackupFixture<'a> {
    dir: &'a Path,
    store: MetaStore,
    entries: Vec<ManifestEntry>,
}

pub const SNAPSHOT_FILE: &str = "20230101T000000Z.bolt";

impl<'a> BackupFixture<'a> {
    pub fn new(dir: &'a Path) -> Self {
        let store = MetaStore::open(&dir.join(SNAPSHOT_FILE)).unwrap();
        Self {
            dir,
            store,
            entries: Vec::new(),
        }
    }

    pub fn org(self, org_id: u64, name: &str) -> Self {
        insert_organization(
            self.store.connection(),
            &Organization { id: id(org_id), name: name.into(), description: String::new() },
        )
        .unwrap();
        self
    }

    /// Add a bucket whose catalog holds one shard group with `shard_ids`.
    pub fn bucket(self, bucket_id: u64, org_id: u64, name: &str, shard_ids: &[u64]) -> Self {
        insert_bucket(
            self.store.connection(),
            &Bucket {
                id: id(bucket_id),
                org_id: id(org_id),
                name: name.into(),
                description: String::new(),
                retention_period: 0,
            },
        )
        .unwrap();
        if !shard_ids.is_empty() {
            insert_shard_group(
                self.store.connection(),
                id(bucket_id),
                &ShardGroupInfo {
                    id: bucket_id,
                    start_time: ts(1),
                    end_time: ts(8),
                    shards: shard_ids.iter().map(|&id| ShardInfo { id }).collect(),
                },
            )
            .unwrap();
        }
        self
    }

    /// Write a gzip shard archive whose content is `shard-<id>`.
    pub async fn shard(mut self, shard_id: u64, bucket_id: u64) -> Self {
        let file_name = format!("20230101T000000Z.s{shard_id}.tar.gz");
        let payload = shard_payload(shard_id);
        std::fs::write(self.dir.join(&file_name), gzip(&payload).await).unwrap();
        self.entries.push(ManifestEntry {
            organization_id: None,
            organization_name: None,
            bucket_id: id(bucket_id).to_string(),
            bucket_name: None,
            shard_id,
            file_name,
            size: payload.len() as u64,
            last_modified: ts(1),
        });
        self
    }

    /// Close the snapshot and write the manifest.
    pub fn finish(self) {
        self.store.close().unwrap();
        let manifest = Manifest {
            kv: Some(ManifestKvEntry {
                file_name: SNAPSHOT_FILE.into(),
                size: std::fs::metadata(self.dir.join(SNAPSHOT_FILE)).unwrap().len(),
                last_modified: ts(1),
            }),
            files: self.entries,
        };
        manifest.write_to_dir(self.dir, ts(1)).unwrap();
    }
}

pub fn shard_payload(shard_id: u64) -> Vec<u8> {
    format!("shard-{shard_id}").into_bytes()
}
