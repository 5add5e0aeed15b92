//! Folding a directory of incremental manifests into one restore plan.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tsdb_meta::Id;

use super::{Manifest, ManifestEntry, ManifestKvEntry, MANIFEST_EXTENSION};
use crate::utils::{RestoreError, Result};

/// The merged view of every manifest in a backup directory.
#[derive(Debug, Clone, Default)]
pub struct RestorePlan {
    /// Metadata snapshot of the newest manifest that has one.
    pub kv: Option<ManifestKvEntry>,
    /// Most recently modified archive per shard ID, across all manifests.
    pub shards: HashMap<u64, ManifestEntry>,
}

impl RestorePlan {
    pub fn is_empty(&self) -> bool {
        self.kv.is_none() && self.shards.is_empty()
    }

    /// All shard entries in ascending shard ID order.
    pub fn shard_entries(&self) -> Vec<&ManifestEntry> {
        let mut entries: Vec<_> = self.shards.values().collect();
        entries.sort_by_key(|e| e.shard_id);
        entries
    }

    /// Shard entries that belonged to `bucket_id` at backup time, in
    /// ascending shard ID order.
    pub fn shards_for_bucket(&self, bucket_id: Id) -> Vec<&ManifestEntry> {
        let mut entries: Vec<_> = self
            .shards
            .values()
            .filter(|e| e.bucket_id.parse::<Id>().is_ok_and(|id| id == bucket_id))
            .collect();
        entries.sort_by_key(|e| e.shard_id);
        entries
    }

    fn merge(&mut self, dir: &Path, manifest: Manifest) {
        if self.kv.is_none() {
            if let Some(kv) = manifest.kv {
                if dir.join(&kv.file_name).is_file() {
                    self.kv = Some(kv);
                } else {
                    debug!(file = %kv.file_name, "Metadata snapshot missing from backup, skipping");
                }
            }
        }

        for entry in manifest.files {
            if !dir.join(&entry.file_name).is_file() {
                debug!(shard_id = entry.shard_id, file = %entry.file_name, "Shard archive missing from backup, skipping");
                continue;
            }

            let newer = match self.shards.get(&entry.shard_id) {
                Some(kept) => entry.last_modified > kept.last_modified,
                None => true,
            };
            if newer {
                self.shards.insert(entry.shard_id, entry);
            }
        }
    }
}

/// List manifest files in `dir`, newest first.
fn manifest_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(MANIFEST_EXTENSION) {
            continue;
        }
        // Skip anything that is not a regular file.
        if !entry.file_type()?.is_file() {
            continue;
        }
        paths.push(path);
    }
    paths.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
    Ok(paths)
}

/// Load every manifest under `dir` and merge them into a [`RestorePlan`].
///
/// A directory without manifests yields an empty plan. Any manifest that
/// fails to parse aborts the whole load.
pub fn load_incremental(dir: &Path) -> Result<RestorePlan> {
    let mut plan = RestorePlan::default();

    for path in manifest_paths(dir)? {
        let buf = std::fs::read(&path)?;
        let manifest: Manifest = serde_json::from_slice(&buf).map_err(|source| RestoreError::Manifest {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), files = manifest.files.len(), "Read manifest");
        plan.merge(dir, manifest);
    }

    if !plan.is_empty() {
        info!(
            kv = plan.kv.as_ref().map(|kv| kv.file_name.as_str()).unwrap_or("none"),
            shards = plan.shards.len(),
            "Loaded restore plan"
        );
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::TempDir;

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, day, hour, 0, 0).unwrap()
    }

    fn shard(shard_id: u64, bucket_id: &str, file_name: &str, modified: DateTime<Utc>) -> ManifestEntry {
        ManifestEntry {
            organization_id: None,
            organization_name: None,
            bucket_id: bucket_id.to_string(),
            bucket_name: None,
            shard_id,
            file_name: file_name.to_string(),
            size: 0,
            last_modified: modified,
        }
    }

    fn kv(file_name: &str, modified: DateTime<Utc>) -> ManifestKvEntry {
        ManifestKvEntry {
            file_name: file_name.to_string(),
            size: 0,
            last_modified: modified,
        }
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"data").unwrap();
    }

    fn write_manifest(dir: &Path, name: &str, manifest: &Manifest) {
        std::fs::write(dir.join(name), serde_json::to_vec(manifest).unwrap()).unwrap();
    }

    #[test]
    fn test_empty_directory_yields_empty_plan() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "unrelated.txt");
        let plan = load_incremental(dir.path()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_kv_selection_and_shard_selection_are_independent() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "0101.bolt");
        touch(dir.path(), "0101.s7.tar.gz");
        touch(dir.path(), "0102.s7.tar.gz");

        write_manifest(
            dir.path(),
            "20230101T000000.manifest",
            &Manifest {
                kv: Some(kv("0101.bolt", ts(1, 0))),
                files: vec![shard(7, "b1", "0101.s7.tar.gz", ts(1, 0))],
            },
        );
        write_manifest(
            dir.path(),
            "20230102T000000.manifest",
            &Manifest {
                kv: None,
                files: vec![shard(7, "b1", "0102.s7.tar.gz", ts(2, 0))],
            },
        );

        let plan = load_incremental(dir.path()).unwrap();
        assert_eq!(plan.kv.unwrap().file_name, "0101.bolt");
        assert_eq!(plan.shards.len(), 1);
        assert_eq!(plan.shards[&7].file_name, "0102.s7.tar.gz");
    }

    #[test]
    fn test_newest_filename_wins_kv_even_if_older_modified() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.bolt");
        touch(dir.path(), "b.bolt");

        write_manifest(
            dir.path(),
            "20230102T000000Z.manifest",
            &Manifest { kv: Some(kv("a.bolt", ts(1, 0))), files: vec![] },
        );
        write_manifest(
            dir.path(),
            "20230101T000000Z.manifest",
            &Manifest { kv: Some(kv("b.bolt", ts(5, 0))), files: vec![] },
        );

        let plan = load_incremental(dir.path()).unwrap();
        assert_eq!(plan.kv.unwrap().file_name, "a.bolt");
    }

    #[test]
    fn test_latest_modification_wins_regardless_of_manifest_order() {
        let dir = TempDir::new().unwrap();
        for name in ["old.gz", "new.gz", "mid.gz"] {
            touch(dir.path(), name);
        }

        // The newest manifest carries the oldest copy of shard 3.
        write_manifest(
            dir.path(),
            "20230103T000000Z.manifest",
            &Manifest { kv: None, files: vec![shard(3, "b", "old.gz", ts(1, 0))] },
        );
        write_manifest(
            dir.path(),
            "20230102T000000Z.manifest",
            &Manifest { kv: None, files: vec![shard(3, "b", "new.gz", ts(3, 0))] },
        );
        write_manifest(
            dir.path(),
            "20230101T000000Z.manifest",
            &Manifest { kv: None, files: vec![shard(3, "b", "mid.gz", ts(2, 0))] },
        );

        let plan = load_incremental(dir.path()).unwrap();
        assert_eq!(plan.shards[&3].file_name, "new.gz");
    }

    #[test]
    fn test_equal_timestamps_keep_first_seen() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "newer-run.gz");
        touch(dir.path(), "older-run.gz");

        write_manifest(
            dir.path(),
            "20230102T000000Z.manifest",
            &Manifest { kv: None, files: vec![shard(1, "b", "newer-run.gz", ts(1, 0))] },
        );
        write_manifest(
            dir.path(),
            "20230101T000000Z.manifest",
            &Manifest { kv: None, files: vec![shard(1, "b", "older-run.gz", ts(1, 0))] },
        );

        let plan = load_incremental(dir.path()).unwrap();
        assert_eq!(plan.shards[&1].file_name, "newer-run.gz");
    }

    #[test]
    fn test_missing_archives_are_excluded() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "present.gz");

        write_manifest(
            dir.path(),
            "20230101T000000Z.manifest",
            &Manifest {
                kv: Some(kv("missing.bolt", ts(1, 0))),
                files: vec![
                    shard(1, "b", "present.gz", ts(1, 0)),
                    shard(2, "b", "missing.gz", ts(1, 0)),
                ],
            },
        );

        let plan = load_incremental(dir.path()).unwrap();
        assert!(plan.kv.is_none());
        assert!(plan.shards.contains_key(&1));
        assert!(!plan.shards.contains_key(&2));
    }

    #[test]
    fn test_missing_newer_copy_falls_back_to_older() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "older.gz");

        write_manifest(
            dir.path(),
            "20230102T000000Z.manifest",
            &Manifest { kv: None, files: vec![shard(4, "b", "gone.gz", ts(2, 0))] },
        );
        write_manifest(
            dir.path(),
            "20230101T000000Z.manifest",
            &Manifest { kv: None, files: vec![shard(4, "b", "older.gz", ts(1, 0))] },
        );

        let plan = load_incremental(dir.path()).unwrap();
        assert_eq!(plan.shards[&4].file_name, "older.gz");
    }

    #[test]
    fn test_malformed_manifest_aborts_load() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("20230101T000000Z.manifest"), b"{not json").unwrap();

        let err = load_incremental(dir.path()).unwrap_err();
        match err {
            RestoreError::Manifest { path, .. } => {
                assert!(path.ends_with("20230101T000000Z.manifest"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_manifest_directories_are_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("20230105T000000Z.manifest")).unwrap();
        let plan = load_incremental(dir.path()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_shards_for_bucket_sorted() {
        let mut plan = RestorePlan::default();
        for (id, bucket) in [(9, "000000000000000a"), (2, "000000000000000A"), (5, "000000000000000b")] {
            plan.shards.insert(id, shard(id, bucket, "f", ts(1, 0)));
        }
        let bucket_a = Id::new(0xa).unwrap();
        let ids: Vec<u64> = plan.shards_for_bucket(bucket_a).iter().map(|e| e.shard_id).collect();
        assert_eq!(ids, vec![2, 9]);
        let all: Vec<u64> = plan.shard_entries().iter().map(|e| e.shard_id).collect();
        assert_eq!(all, vec![2, 5, 9]);
    }
}
