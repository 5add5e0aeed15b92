//! Restore orchestration.
//!
//! A restore run validates its options, merges the manifests of the backup
//! directory into a [`RestorePlan`] and hands it to exactly one executor:
//!
//! - [`full`] replaces the server's metadata store and every shard.
//! - [`partial`] adds selected organizations and buckets to a live server.
//!
//! Every step runs to completion before the next starts. Cancellation is
//! checked between steps, never inside a single server call.

pub mod full;
pub mod partial;

use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tsdb_meta::Id;

use crate::client::{BucketService, OrganizationService, RestoreService};
use crate::manifest::{load_incremental, ManifestKvEntry, RestorePlan};
use crate::transfer::progress::{format_bytes, format_duration, format_speed, RestoreProgress};
use crate::utils::{RestoreError, Result};

/// What to do when the server returns no new ID for a backed-up shard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnmappedShardPolicy {
    /// Log a warning and stop restoring the rest of that bucket's shards.
    /// The run continues with the next bucket and still succeeds.
    #[default]
    AbortBucket,
    /// Log a warning and continue with the bucket's next shard.
    SkipShard,
}

/// Options of one restore run.
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Backup directory holding manifests, the metadata snapshot and shard archives
    pub path: PathBuf,
    /// Replace everything on the server instead of adding to it
    pub full: bool,
    pub org_id: Option<Id>,
    pub org_name: Option<String>,
    /// Name to give the restored organization
    pub new_org_name: Option<String>,
    pub bucket_id: Option<Id>,
    pub bucket_name: Option<String>,
    /// Name to give the restored bucket
    pub new_bucket_name: Option<String>,
    pub unmapped_shards: UnmappedShardPolicy,
}

impl RestoreOptions {
    /// Check option combinations. Performs no I/O.
    pub fn validate(&self) -> Result<()> {
        if self.new_org_name.is_some() && self.org_id.is_none() && self.org_name.is_none() {
            return Err(RestoreError::Config(
                "must specify source org id or name when renaming restored org".into(),
            ));
        }
        if self.new_bucket_name.is_some() && self.bucket_id.is_none() && self.bucket_name.is_none() {
            return Err(RestoreError::Config(
                "must specify source bucket id or name when renaming restored bucket".into(),
            ));
        }
        if self.full && self.has_filters() {
            warn!("Organization and bucket options are ignored by a full restore");
        }
        Ok(())
    }

    /// Parse an optional ID given on the command line.
    pub fn parse_id(flag: &str, value: Option<&str>) -> Result<Option<Id>> {
        value
            .map(|v| {
                v.parse::<Id>()
                    .map_err(|e| RestoreError::Config(format!("invalid --{flag}: {e}")))
            })
            .transpose()
    }

    fn has_filters(&self) -> bool {
        self.org_id.is_some()
            || self.org_name.is_some()
            || self.new_org_name.is_some()
            || self.bucket_id.is_some()
            || self.bucket_name.is_some()
            || self.new_bucket_name.is_some()
    }
}

/// The server-side services a restore talks to.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub restore: &'a dyn RestoreService,
    pub orgs: &'a dyn OrganizationService,
    pub buckets: &'a dyn BucketService,
}

impl<'a> Services<'a> {
    /// Use one client for every service.
    pub fn from_client<C>(client: &'a C) -> Self
    where
        C: RestoreService + OrganizationService + BucketService,
    {
        Self {
            restore: client,
            orgs: client,
            buckets: client,
        }
    }
}

/// State shared by the steps of one run.
pub(crate) struct RestoreContext<'a> {
    pub dir: &'a Path,
    pub plan: &'a RestorePlan,
    pub kv: &'a ManifestKvEntry,
    pub options: &'a RestoreOptions,
    pub services: Services<'a>,
    pub cancel: &'a CancellationToken,
    pub progress: RestoreProgress,
}

impl RestoreContext<'_> {
    /// Fail if the run has been cancelled. Called before every server call.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(RestoreError::Cancelled);
        }
        Ok(())
    }
}

/// Run a restore.
pub async fn run(
    options: &RestoreOptions,
    services: Services<'_>,
    cancel: &CancellationToken,
) -> Result<RestoreProgress> {
    options.validate()?;

    // Read in set of metadata snapshot & shard data to restore.
    let dir = options.path.clone();
    let plan = tokio::task::spawn_blocking(move || load_incremental(&dir))
        .await
        .map_err(|e| RestoreError::Io(std::io::Error::other(e)))?
        .map_err(|e| e.context("restore failed while processing manifest files"))?;

    if plan.is_empty() {
        return Err(RestoreError::NoManifest(options.path.clone()));
    }
    let kv = plan
        .kv
        .clone()
        .ok_or_else(|| RestoreError::NoMetadataSnapshot(options.path.clone()))?;

    let mut ctx = RestoreContext {
        dir: &options.path,
        plan: &plan,
        kv: &kv,
        options,
        services,
        cancel,
        progress: RestoreProgress::new(0),
    };

    if options.full {
        full::restore_full(&mut ctx).await?;
    } else {
        partial::restore_partial(&mut ctx).await?;
    }

    let progress = ctx.progress;
    info!(
        shards = progress.shards_restored,
        unmapped = progress.shards_unmapped,
        size = %format_bytes(progress.bytes_restored),
        speed = %format_speed(progress.average_speed()),
        elapsed = %format_duration(progress.elapsed().as_secs()),
        "Restore complete"
    );
    Ok(progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{id, BackupFixture, FakeServer};
    use tempfile::TempDir;

    #[test]
    fn test_rename_org_requires_source_filter() {
        let options = RestoreOptions {
            new_org_name: Some("renamed".into()),
            ..Default::default()
        };
        let err = options.validate().unwrap_err();
        assert!(err.to_string().contains("source org id or name"));

        let options = RestoreOptions {
            new_org_name: Some("renamed".into()),
            org_name: Some("acme".into()),
            ..Default::default()
        };
        options.validate().unwrap();
    }

    #[test]
    fn test_rename_bucket_requires_source_filter() {
        let options = RestoreOptions {
            new_bucket_name: Some("renamed".into()),
            org_id: Some(id(1)),
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(RestoreError::Config(_))));

        let options = RestoreOptions {
            new_bucket_name: Some("renamed".into()),
            bucket_id: Some(id(10)),
            ..Default::default()
        };
        options.validate().unwrap();
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(RestoreOptions::parse_id("org-id", None).unwrap(), None);
        assert_eq!(
            RestoreOptions::parse_id("org-id", Some("000000000000000a")).unwrap(),
            Some(id(10))
        );
        let err = RestoreOptions::parse_id("bucket-id", Some("xyz")).unwrap_err();
        assert!(matches!(err, RestoreError::Config(_)));
        assert!(err.to_string().contains("--bucket-id"));
    }

    #[tokio::test]
    async fn test_invalid_options_fail_before_any_io() {
        let server = FakeServer::default();
        let options = RestoreOptions {
            path: PathBuf::from("/nonexistent/backup"),
            new_org_name: Some("renamed".into()),
            ..Default::default()
        };

        let err = run(&options, Services::from_client(&server), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RestoreError::Config(_)));
        assert!(server.state().calls.is_empty());
    }

    #[tokio::test]
    async fn test_empty_directory_is_no_manifest_error() {
        let dir = TempDir::new().unwrap();
        let server = FakeServer::default();
        let options = RestoreOptions {
            path: dir.path().to_path_buf(),
            ..Default::default()
        };

        let err = run(&options, Services::from_client(&server), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RestoreError::NoManifest(_)));
        assert!(err.to_string().contains(&dir.path().display().to_string()));
    }

    #[tokio::test]
    async fn test_malformed_manifest_is_reported_with_context() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("20230101T000000Z.manifest"), b"[").unwrap();
        let server = FakeServer::default();
        let options = RestoreOptions {
            path: dir.path().to_path_buf(),
            full: true,
            ..Default::default()
        };

        let err = run(&options, Services::from_client(&server), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("restore failed while processing manifest files"));
        assert!(matches!(err.root(), RestoreError::Manifest { .. }));
        assert!(server.state().calls.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_makes_no_calls() {
        let dir = TempDir::new().unwrap();
        BackupFixture::new(dir.path())
            .org(1, "acme")
            .bucket(10, 1, "metrics", &[7])
            .shard(7, 10)
            .await
            .finish();

        let server = FakeServer::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let options = RestoreOptions {
            path: dir.path().to_path_buf(),
            full: true,
            ..Default::default()
        };

        let err = run(&options, Services::from_client(&server), &cancel).await.unwrap_err();
        assert!(matches!(err, RestoreError::Cancelled));
        assert!(server.state().calls.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_between_shards_stops_after_current_one() {
        let dir = TempDir::new().unwrap();
        BackupFixture::new(dir.path())
            .org(1, "acme")
            .bucket(10, 1, "metrics", &[7, 8, 9])
            .shard(7, 10)
            .await
            .shard(8, 10)
            .await
            .shard(9, 10)
            .await
            .finish();

        let server = FakeServer::default();
        let cancel = CancellationToken::new();
        server.state().cancel_after_shard = Some(cancel.clone());
        let options = RestoreOptions {
            path: dir.path().to_path_buf(),
            full: true,
            ..Default::default()
        };

        let err = run(&options, Services::from_client(&server), &cancel).await.unwrap_err();
        assert!(matches!(err, RestoreError::Cancelled));

        let state = server.state();
        assert_eq!(state.calls, vec!["replace_metadata_store", "restore_shard:7"]);
        assert_eq!(state.shards.len(), 1);
    }
}
