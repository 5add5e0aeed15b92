//! Full restore: replace the server's metadata store, then every shard.

use tracing::info;

use super::RestoreContext;
use crate::transfer::shard::{open_file, restore_shard};
use crate::utils::{Result, ResultExt};

/// Stream the metadata snapshot, then each shard under its backed-up ID.
///
/// The first failure ends the run. Shards already sent stay on the server.
pub(crate) async fn restore_full(ctx: &mut RestoreContext<'_>) -> Result<()> {
    ctx.checkpoint()?;
    info!(file = %ctx.kv.file_name, "Restoring KV snapshot");

    let snapshot = open_file(&ctx.dir.join(&ctx.kv.file_name))
        .await
        .context("cannot replace metadata store")?;
    ctx.services
        .restore
        .replace_metadata_store(snapshot)
        .await
        .context("cannot replace metadata store")?;

    // Shard IDs are unchanged after a full restore, no mapping needed.
    let entries = ctx.plan.shard_entries();
    ctx.progress.add_planned(entries.len());
    for entry in entries {
        ctx.checkpoint()?;
        let sent = restore_shard(ctx.services.restore, ctx.dir, entry.shard_id, entry)
            .await
            .context(format!("cannot restore shard {}", entry.shard_id))?;
        ctx.progress.record_shard(sent);
    }

    Ok(())
}
