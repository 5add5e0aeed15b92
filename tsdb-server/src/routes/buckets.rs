use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tsdb_meta::store::{create_bucket, find_buckets};
use tsdb_meta::tenant::CreateBucketRequest;
use tsdb_meta::{Bucket, BucketFilter, Id};

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_buckets).post(create))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(rename = "orgID")]
    org_id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct BucketsResponse {
    buckets: Vec<Bucket>,
}

async fn list_buckets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<BucketsResponse>, AppError> {
    let filter = BucketFilter {
        org_id: query.org_id.as_deref().map(str::parse::<Id>).transpose()?,
        id: None,
        name: query.name,
    };

    let pool = state.db.pool().await;
    let buckets = tokio::task::spawn_blocking(move || -> Result<Vec<Bucket>, AppError> {
        let conn = pool.get()?;
        Ok(find_buckets(&conn, &filter)?)
    })
    .await??;
    Ok(Json(BucketsResponse { buckets }))
}

async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateBucketRequest>,
) -> Result<(StatusCode, Json<Bucket>), AppError> {
    if body.name.is_empty() {
        return Err(AppError::BadRequest("bucket name is required".into()));
    }

    let pool = state.db.pool().await;
    let bucket = tokio::task::spawn_blocking(move || -> Result<Bucket, AppError> {
        let conn = pool.get()?;
        Ok(create_bucket(&conn, &body)?)
    })
    .await??;

    Ok((StatusCode::CREATED, Json(bucket)))
}
