use crate::error::AppError;
use crate::state::AppState;
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tsdb_meta::store::{import_catalog, shard_exists};
use tsdb_meta::{BucketCatalog, Id, MetaError, ShardIdMap};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/kv", post(restore_kv))
        .route("/bucket/{bucket_id}", post(restore_bucket))
        .route("/shards/{shard_id}", post(restore_shard))
        // Snapshots and shards are arbitrarily large.
        .layer(DefaultBodyLimit::disable())
}

#[derive(Debug, Serialize)]
struct RestoreBucketResponse {
    #[serde(rename = "shardIDMap")]
    shard_id_map: ShardIdMap,
}

/// Stream a request body into `path`, removing the file on failure.
async fn write_body(body: Body, path: &std::path::Path) -> Result<u64, AppError> {
    let result: Result<u64, AppError> = async {
        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = body.into_data_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AppError::BadRequest(format!("failed to read request body: {e}")))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.sync_all().await?;
        Ok(written)
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(path).await;
    }
    result
}

async fn restore_kv(State(state): State<Arc<AppState>>, body: Body) -> Result<StatusCode, AppError> {
    let _guard = state.restore_lock.lock().await;

    let tmp = state.config.data_dir.join(format!(".kv-{}.tmp", uuid::Uuid::new_v4()));
    let size = write_body(body, &tmp).await?;

    if let Err(e) = state.db.replace(&tmp).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(match e.downcast::<MetaError>() {
            Ok(meta) => meta.into(),
            Err(other) => AppError::Internal(other),
        });
    }

    tracing::info!("[Restore] Metadata store replaced ({} bytes)", size);
    Ok(StatusCode::NO_CONTENT)
}

async fn restore_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket_id): Path<String>,
    body: Bytes,
) -> Result<Json<RestoreBucketResponse>, AppError> {
    let bucket_id: Id = bucket_id.parse()?;
    let catalog = BucketCatalog::from_bytes(&body)?;

    let pool = state.db.pool().await;
    let shard_id_map = tokio::task::spawn_blocking(move || -> Result<ShardIdMap, AppError> {
        let mut conn = pool.get()?;
        Ok(import_catalog(&mut conn, bucket_id, &catalog)?)
    })
    .await??;

    tracing::info!(
        "[Restore] Imported shard catalog for bucket {} ({} shards)",
        bucket_id,
        shard_id_map.len()
    );
    Ok(Json(RestoreBucketResponse { shard_id_map }))
}

async fn restore_shard(
    State(state): State<Arc<AppState>>,
    Path(shard_id): Path<u64>,
    body: Body,
) -> Result<StatusCode, AppError> {
    let pool = state.db.pool().await;
    let exists = tokio::task::spawn_blocking(move || -> Result<bool, AppError> {
        let conn = pool.get()?;
        Ok(shard_exists(&conn, shard_id)?)
    })
    .await??;
    if !exists {
        return Err(AppError::NotFound(format!("shard {shard_id} not found")));
    }

    let shards_dir = &state.config.shards_dir;
    tokio::fs::create_dir_all(shards_dir).await?;
    let tmp = shards_dir.join(format!(".{shard_id}-{}.tmp", uuid::Uuid::new_v4()));
    let size = write_body(body, &tmp).await?;
    tokio::fs::rename(&tmp, shards_dir.join(shard_id.to_string())).await?;

    tracing::info!("[Restore] Restored shard {} ({} bytes)", shard_id, size);
    Ok(StatusCode::NO_CONTENT)
}
