use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value as JsonValue, json};

use pktracker_auth::permissions::{CREATE_ROLES, DELETE_ROLES, EDIT_ROLES, VIEW_ROLES};
use pktracker_core::RoleId;
use pktracker_infra::{NewRole, RoleChanges};

use crate::app::dto::{MasterDataQuery, RoleRequest};
use crate::app::errors::{ApiError, ValidationErrors, json_body};
use crate::app::routes::{master_error, parse_id, record_name};
use crate::app::services::AppServices;
use crate::authz::require_permission;
use crate::context::AuthContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/:id", get(show_role).put(update_role).patch(update_role).delete(delete_role))
}

/// Every listed permission must exist; errors are keyed `permissions.{i}`.
fn check_permissions(services: &AppServices, errs: &mut ValidationErrors, names: &[String]) -> Result<(), ApiError> {
    for (i, name) in names.iter().enumerate() {
        if services.master.permissions().find_by_name(name)?.is_none() {
            errs.add(format!("permissions.{i}"), "The selected permission is invalid.");
        }
    }
    Ok(())
}

/// GET /roles
pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<MasterDataQuery>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, VIEW_ROLES)?;
    let roles = services
        .master
        .list_roles(query.search.as_deref(), query.guard_name.as_deref())?;
    Ok(Json(json!({
        "message": "Roles retrieved successfully",
        "data": roles,
    })))
}

/// POST /roles
pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<RoleRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    require_permission(&auth, CREATE_ROLES)?;
    let body = json_body(body)?;

    let mut errs = ValidationErrors::new();
    let name = record_name(&mut errs, body.name.as_deref(), true);
    if let Some(name) = &name {
        if services.master.roles().find_by_name(name)?.is_some() {
            errs.add("name", "The name has already been taken.");
        }
    }
    let permissions = body.permissions.unwrap_or_default();
    check_permissions(&services, &mut errs, &permissions)?;
    errs.into_result()?;
    let Some(name) = name else {
        return Err(ApiError::Internal("validated role name missing".to_string()));
    };

    let role = services.master.create_role(NewRole {
        name,
        guard_name: body.guard_name,
        permissions,
    })?;
    tracing::info!(role_id = %role.role.id, created_by = %auth.user_id(), "role created via api");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Role created successfully",
            "data": role,
        })),
    )
        .into_response())
}

/// GET /roles/:id
pub async fn show_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, VIEW_ROLES)?;
    let id: RoleId = parse_id(&id, "Role")?;
    let role = services.master.get_role(id).map_err(master_error("Role"))?;
    Ok(Json(json!({
        "message": "Role retrieved successfully",
        "data": role,
    })))
}

/// PUT|PATCH /roles/:id
pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    body: Result<Json<RoleRequest>, JsonRejection>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, EDIT_ROLES)?;
    let id: RoleId = parse_id(&id, "Role")?;
    services.master.get_role(id).map_err(master_error("Role"))?;
    let body = json_body(body)?;

    let mut errs = ValidationErrors::new();
    let name = record_name(&mut errs, body.name.as_deref(), false);
    if let Some(name) = &name {
        if let Some(other) = services.master.roles().find_by_name(name)? {
            if other.id != id {
                errs.add("name", "The name has already been taken.");
            }
        }
    }
    if let Some(perms) = &body.permissions {
        check_permissions(&services, &mut errs, perms)?;
    }
    errs.into_result()?;

    let role = services
        .master
        .update_role(
            id,
            RoleChanges {
                name,
                guard_name: body.guard_name,
                permissions: body.permissions,
            },
        )
        .map_err(master_error("Role"))?;

    Ok(Json(json!({
        "message": "Role updated successfully",
        "data": role,
    })))
}

/// DELETE /roles/:id
pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, DELETE_ROLES)?;
    let id: RoleId = parse_id(&id, "Role")?;
    services.master.delete_role(id).map_err(master_error("Role"))?;
    Ok(Json(json!({ "message": "Role deleted successfully" })))
}
