//! Partial restore: add organizations, buckets and their shards from a
//! backup to a live server without touching anything already there.
//!
//! The backup's metadata snapshot is opened locally and read-only. It only
//! supplies the organizations, buckets and shard catalogs to recreate; it is
//! never sent to the server as a whole.

use tracing::{info, warn};
use tsdb_meta::{Bucket, BucketCatalog, BucketFilter, Id, MetaStore, Organization, OrganizationFilter};

use super::{RestoreContext, RestoreOptions, UnmappedShardPolicy};
use crate::transfer::shard::restore_shard;
use crate::utils::{RestoreError, Result, ResultExt};

/// A backed-up bucket and its shard catalog.
struct BucketSource {
    bucket: Bucket,
    catalog: BucketCatalog,
}

fn organization_filter(options: &RestoreOptions) -> OrganizationFilter {
    // An ID takes precedence over a name.
    match (options.org_id, &options.org_name) {
        (Some(id), _) => OrganizationFilter { id: Some(id), name: None },
        (None, Some(name)) => OrganizationFilter { id: None, name: Some(name.clone()) },
        (None, None) => OrganizationFilter::default(),
    }
}

fn bucket_filter(options: &RestoreOptions, org_id: Id) -> BucketFilter {
    let mut filter = BucketFilter {
        org_id: Some(org_id),
        ..Default::default()
    };
    if let Some(id) = options.bucket_id {
        filter.id = Some(id);
    } else if let Some(ref name) = options.bucket_name {
        filter.name = Some(name.clone());
    }
    filter
}

/// Read the buckets of `org` selected by the options, skipping internal ones.
fn bucket_sources(store: &MetaStore, options: &RestoreOptions, org: &Organization) -> Result<Vec<BucketSource>> {
    let mut sources = Vec::new();
    for bucket in store.find_buckets(&bucket_filter(options, org.id))? {
        if bucket.is_internal() {
            info!(id = %bucket.id, name = %bucket.name, "Skipping internal bucket");
            continue;
        }
        let catalog = bucket_catalog(store, &bucket)?;
        sources.push(BucketSource { bucket, catalog });
    }
    Ok(sources)
}

/// The shard catalog of `bucket` in the snapshot, keyed by its backup-time ID.
fn bucket_catalog(store: &MetaStore, bucket: &Bucket) -> Result<BucketCatalog> {
    store
        .bucket_catalog(bucket.id)?
        .ok_or_else(|| RestoreError::NotFound(format!("bucket database {}", bucket.id)))
}

pub(crate) async fn restore_partial(ctx: &mut RestoreContext<'_>) -> Result<()> {
    let path = ctx.dir.join(&ctx.kv.file_name);
    let store = MetaStore::open_read_only(&path).context("cannot open metadata snapshot")?;

    let orgs = store.find_organizations(&organization_filter(ctx.options))?;
    if orgs.is_empty() {
        warn!("No organization in the backup matches the given filter, nothing to restore");
    }

    for org in orgs {
        let buckets = bucket_sources(&store, ctx.options, &org)?;
        restore_organization(ctx, &org, buckets).await?;
    }

    store.close()?;
    Ok(())
}

async fn restore_organization(
    ctx: &mut RestoreContext<'_>,
    org: &Organization,
    buckets: Vec<BucketSource>,
) -> Result<()> {
    info!(id = %org.id, name = %org.name, "Restoring organization");

    let mut new_org = org.clone();
    if let Some(ref name) = ctx.options.new_org_name {
        new_org.name = name.clone();
    }

    // Create the organization on the server, if it doesn't already exist.
    ctx.checkpoint()?;
    let existing = ctx
        .services
        .orgs
        .find_organization_by_name(&new_org.name)
        .await
        .context("cannot find existing organization")?;
    let new_org = match existing {
        Some(found) => {
            info!(id = %found.id, name = %found.name, "Organization already exists on server");
            found
        }
        None => {
            ctx.checkpoint()?;
            ctx.services
                .orgs
                .create_organization(&new_org)
                .await
                .context("cannot create organization")?
        }
    };

    for source in buckets {
        restore_bucket(ctx, new_org.id, source).await?;
    }
    Ok(())
}

async fn restore_bucket(ctx: &mut RestoreContext<'_>, org_id: Id, source: BucketSource) -> Result<()> {
    let original = source.bucket;
    info!(id = %original.id, name = %original.name, "Restoring bucket");

    let mut new_bucket = original.clone();
    new_bucket.org_id = org_id;
    if let Some(ref name) = ctx.options.new_bucket_name {
        new_bucket.name = name.clone();
    }

    ctx.checkpoint()?;
    let created = ctx
        .services
        .buckets
        .create_bucket(&new_bucket)
        .await
        .context("cannot create bucket")?;

    let buf = source.catalog.to_bytes()?;

    ctx.checkpoint()?;
    let shard_map = ctx
        .services
        .restore
        .create_shard_catalog(created.id, buf)
        .await
        .context("cannot restore bucket")?;

    let entries = ctx.plan.shards_for_bucket(original.id);
    ctx.progress.add_planned(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let Some(&new_id) = shard_map.get(&entry.shard_id) else {
            warn!(
                shard_id = entry.shard_id,
                bucket_id = %entry.bucket_id,
                file = %entry.file_name,
                "Meta info not found, skipping file"
            );
            match ctx.options.unmapped_shards {
                UnmappedShardPolicy::AbortBucket => {
                    ctx.progress.record_unmapped(entries.len() - i);
                    return Ok(());
                }
                UnmappedShardPolicy::SkipShard => {
                    ctx.progress.record_unmapped(1);
                    continue;
                }
            }
        };

        ctx.checkpoint()?;
        let sent = restore_shard(ctx.services.restore, ctx.dir, new_id, entry)
            .await
            .context(format!("cannot restore shard {}", entry.shard_id))?;
        ctx.progress.record_shard(sent);
    }

    Ok(())
}
