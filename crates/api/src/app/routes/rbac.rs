//! RBAC audit endpoints for authorization debugging.
//!
//! They answer "why was this request denied?" by walking the same resolution
//! the auth middleware uses.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use pktracker_auth::permissions::{VIEW_ROLES, VIEW_USERS};
use pktracker_auth::{Permission, Principal, explain_authorization};

use crate::app::errors::{ApiError, ValidationErrors};
use crate::app::routes::parse_id;
use crate::app::services::AppServices;
use crate::authz::require_permission;
use crate::context::AuthContext;

// ─────────────────────────────────────────────────────────────────────────────
// Query Parameters
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub permission: Option<String>,
}

impl ExplainQuery {
    fn permission(&self) -> Result<Permission, ApiError> {
        match self.permission.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => Ok(Permission::new(p.to_string())),
            _ => Err(ApiError::Validation(ValidationErrors::single(
                "permission",
                "The permission field is required.",
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/explain", get(explain_self))
        .route("/explain/:user_id", get(explain_user))
        .route("/registry", get(registry))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

fn explanation(services: &AppServices, principal: &Principal, permission: &Permission) -> Json<JsonValue> {
    let explanation = explain_authorization(principal, permission, |role| {
        services.master.role_permission_names(role)
    });
    Json(json!({ "explanation": explanation }))
}

/// GET /rbac/explain?permission=... - Explain a decision for the caller
pub async fn explain_self(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ExplainQuery>,
) -> Result<Json<JsonValue>, ApiError> {
    let permission = query.permission()?;
    Ok(explanation(&services, auth.principal(), &permission))
}

/// GET /rbac/explain/:user_id?permission=... - Explain a decision for another user
pub async fn explain_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
    Query(query): Query<ExplainQuery>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, VIEW_USERS)?;
    let permission = query.permission()?;
    let user = services.live_user(parse_id(&user_id, "User")?)?;
    let principal = services.principal_for(&user)?;
    Ok(explanation(&services, &principal, &permission))
}

/// GET /rbac/registry - Every stored role and permission
pub async fn registry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, VIEW_ROLES)?;
    let registry = services.master.registry()?;
    Ok(Json(json!({ "registry": registry })))
}
