use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use pktracker_auth::permissions::VIEW_LOGS;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::require_permission;
use crate::context::AuthContext;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

pub fn router() -> Router {
    Router::new().route("/", get(recent_entries))
}

/// GET /audit - Latest audit trail entries, newest first
pub async fn recent_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, VIEW_LOGS)?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let entries = services.audit.recent(limit);
    Ok(Json(json!({
        "data": entries,
        "meta": {
            "limit": limit,
            "returned": entries.len(),
            "retained": services.audit.len(),
        }
    })))
}
