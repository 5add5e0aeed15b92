pub mod buckets;
pub mod orgs;
pub mod restore;

use crate::state::AppState;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/v2/restore", restore::router())
        .nest("/api/v2/orgs", orgs::router())
        .nest("/api/v2/buckets", buckets::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
