use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tsdb_meta::store::{create_organization, find_organizations};
use tsdb_meta::tenant::CreateOrganizationRequest;
use tsdb_meta::{Id, Organization, OrganizationFilter};

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_organizations).post(create))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    org: Option<String>,
    #[serde(rename = "orgID")]
    org_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OrganizationsResponse {
    orgs: Vec<Organization>,
}

async fn list_organizations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<OrganizationsResponse>, AppError> {
    let filter = OrganizationFilter {
        id: query.org_id.as_deref().map(str::parse::<Id>).transpose()?,
        name: query.org,
    };

    let pool = state.db.pool().await;
    let lookup = filter.clone();
    let orgs = tokio::task::spawn_blocking(move || -> Result<Vec<Organization>, AppError> {
        let conn = pool.get()?;
        Ok(find_organizations(&conn, &lookup)?)
    })
    .await??;

    // A lookup by name or ID that matches nothing is a miss, not an empty list.
    if orgs.is_empty() {
        if let Some(name) = filter.name {
            return Err(AppError::NotFound(format!("organization name \"{name}\" not found")));
        }
        if let Some(id) = filter.id {
            return Err(AppError::NotFound(format!("organization {id} not found")));
        }
    }
    Ok(Json(OrganizationsResponse { orgs }))
}

async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateOrganizationRequest>,
) -> Result<(StatusCode, Json<Organization>), AppError> {
    if body.name.is_empty() {
        return Err(AppError::BadRequest("organization name is required".into()));
    }

    let pool = state.db.pool().await;
    let org = tokio::task::spawn_blocking(move || -> Result<Organization, AppError> {
        let conn = pool.get()?;
        Ok(create_organization(&conn, &body)?)
    })
    .await??;

    Ok((StatusCode::CREATED, Json(org)))
}
