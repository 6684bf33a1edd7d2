use std::sync::Arc;

use axum::{Json, Router, extract::Extension, routing::get};
use serde_json::{Value as JsonValue, json};

use pktracker_auth::permissions::VIEW_ROLES;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::require_permission;
use crate::context::AuthContext;

pub fn router() -> Router {
    Router::new().route("/statistics", get(statistics))
}

/// GET /master-data/statistics
pub async fn statistics(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, VIEW_ROLES)?;
    Ok(Json(json!({
        "message": "Master data statistics retrieved successfully",
        "data": services.master.statistics()?,
    })))
}
