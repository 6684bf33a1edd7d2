use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value as JsonValue, json};

use pktracker_auth::permissions::{CREATE_PERMISSIONS, DELETE_PERMISSIONS, EDIT_PERMISSIONS, VIEW_PERMISSIONS};
use pktracker_core::PermissionId;
use pktracker_infra::{NewPermission, PermissionChanges};

use crate::app::dto::{MasterDataQuery, PermissionRequest};
use crate::app::errors::{ApiError, ValidationErrors, json_body};
use crate::app::routes::{master_error, parse_id, record_name};
use crate::app::services::AppServices;
use crate::authz::require_permission;
use crate::context::AuthContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_permissions).post(create_permission))
        .route(
            "/:id",
            get(show_permission)
                .put(update_permission)
                .patch(update_permission)
                .delete(delete_permission),
        )
}

/// Name must be free, or taken only by `current`.
fn check_name_free(
    services: &AppServices,
    errs: &mut ValidationErrors,
    name: &str,
    current: Option<PermissionId>,
) -> Result<(), ApiError> {
    if let Some(existing) = services.master.permissions().find_by_name(name)? {
        if Some(existing.id) != current {
            errs.add("name", "The name has already been taken.");
        }
    }
    Ok(())
}

/// GET /permissions
pub async fn list_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<MasterDataQuery>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, VIEW_PERMISSIONS)?;
    let permissions = services
        .master
        .list_permissions(query.search.as_deref(), query.guard_name.as_deref())?;
    Ok(Json(json!({
        "message": "Permissions retrieved successfully",
        "data": permissions,
    })))
}

/// POST /permissions
pub async fn create_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<PermissionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    require_permission(&auth, CREATE_PERMISSIONS)?;
    let body = json_body(body)?;

    let mut errs = ValidationErrors::new();
    let name = record_name(&mut errs, body.name.as_deref(), true);
    if let Some(name) = &name {
        check_name_free(&services, &mut errs, name, None)?;
    }
    errs.into_result()?;
    let Some(name) = name else {
        return Err(ApiError::Internal("validated permission name missing".to_string()));
    };

    let permission = services.master.create_permission(NewPermission {
        name,
        guard_name: body.guard_name,
    })?;
    tracing::info!(
        permission_id = %permission.permission.id,
        created_by = %auth.user_id(),
        "permission created via api"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Permission created successfully",
            "data": permission,
        })),
    )
        .into_response())
}

/// GET /permissions/:id
pub async fn show_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, VIEW_PERMISSIONS)?;
    let id: PermissionId = parse_id(&id, "Permission")?;
    let permission = services.master.get_permission(id).map_err(master_error("Permission"))?;
    Ok(Json(json!({
        "message": "Permission retrieved successfully",
        "data": permission,
    })))
}

/// PUT|PATCH /permissions/:id
pub async fn update_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    body: Result<Json<PermissionRequest>, JsonRejection>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, EDIT_PERMISSIONS)?;
    let id: PermissionId = parse_id(&id, "Permission")?;
    services.master.get_permission(id).map_err(master_error("Permission"))?;
    let body = json_body(body)?;

    let mut errs = ValidationErrors::new();
    let name = record_name(&mut errs, body.name.as_deref(), false);
    if let Some(name) = &name {
        check_name_free(&services, &mut errs, name, Some(id))?;
    }
    errs.into_result()?;

    let permission = services
        .master
        .update_permission(
            id,
            PermissionChanges {
                name,
                guard_name: body.guard_name,
            },
        )
        .map_err(master_error("Permission"))?;

    Ok(Json(json!({
        "message": "Permission updated successfully",
        "data": permission,
    })))
}

/// DELETE /permissions/:id
pub async fn delete_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, DELETE_PERMISSIONS)?;
    let id: PermissionId = parse_id(&id, "Permission")?;
    services.master.delete_permission(id).map_err(master_error("Permission"))?;
    Ok(Json(json!({ "message": "Permission deleted successfully" })))
}
