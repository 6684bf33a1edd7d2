//! User administration.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use chrono::Utc;
use serde_json::{Value as JsonValue, json};

use pktracker_auth::permissions::{
    CREATE_USERS, DELETE_USERS, EDIT_USERS, MANAGE_PERMISSIONS, MANAGE_ROLES, MANAGE_USERS, VIEW_USERS,
};
use pktracker_auth::roles::DEFAULT_ROLE;
use pktracker_auth::user::{
    ChangePermissions, ChangeRoles, CreateUser, DeleteUser, ForceDeleteUser, RestoreUser, SetActive, UpdateProfile,
};
use pktracker_auth::{User, UserCommand, hash_password};
use pktracker_core::{PermissionId, RoleId, UserId};
use pktracker_infra::UserRepository;

use crate::app::dto::{PermissionsRequest, RolesRequest, UserRequest, UserResource};
use crate::app::errors::{ApiError, ValidationErrors, json_body};
use crate::app::routes::parse_id;
use crate::app::services::AppServices;
use crate::app::validation;
use crate::authz::require_permission;
use crate::context::AuthContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/statistics", get(statistics))
        .route("/:id", get(show_user).put(update_user).patch(update_user).delete(delete_user))
        .route("/:id/restore", post(restore_user))
        .route("/:id/force", delete(force_delete_user))
        .route("/:id/toggle-status", patch(toggle_status))
        .route("/:id/roles", post(assign_roles).delete(remove_roles))
        .route("/:id/permissions", post(grant_permissions).delete(revoke_permissions))
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn data(message: &str, user: UserResource) -> Json<JsonValue> {
    Json(json!({ "message": message, "data": user }))
}

/// Role ids for already validated role names.
fn role_ids(services: &AppServices, names: &[String]) -> Result<Vec<RoleId>, ApiError> {
    match services.master.roles().find_by_names(names)? {
        Ok(records) => Ok(records.into_iter().map(|r| r.id).collect()),
        Err(_) => Err(ApiError::Validation(ValidationErrors::single(
            "roles",
            "One or more selected roles are invalid.",
        ))),
    }
}

/// Check and resolve a `roles` list; every entry must name an existing role.
fn requested_roles(services: &AppServices, roles: Option<Vec<String>>) -> Result<Vec<RoleId>, ApiError> {
    let mut errs = ValidationErrors::new();
    let names = match roles {
        Some(names) if !names.is_empty() => names,
        _ => {
            errs.add("roles", "The roles field is required.");
            return Err(ApiError::Validation(errs));
        }
    };
    validation::role_names(&mut errs, services.master.roles(), &names)?;
    errs.into_result()?;
    role_ids(services, &names)
}

fn requested_permissions(
    services: &AppServices,
    permissions: Option<Vec<String>>,
) -> Result<Vec<PermissionId>, ApiError> {
    let names = match permissions {
        Some(names) if !names.is_empty() => names,
        _ => {
            return Err(ApiError::Validation(ValidationErrors::single(
                "permissions",
                "The permissions field is required.",
            )));
        }
    };

    match services.master.permissions().find_by_names(&names)? {
        Ok(records) => Ok(records.into_iter().map(|p| p.id).collect()),
        Err(missing) => {
            let mut errs = ValidationErrors::new();
            for (i, name) in names.iter().enumerate() {
                if missing.contains(name) {
                    errs.add(format!("permissions.{i}"), "One or more selected permissions are invalid.");
                }
            }
            Err(ApiError::Validation(errs))
        }
    }
}

fn trashed_user(services: &AppServices, id: UserId) -> Result<User, ApiError> {
    services
        .users()
        .get_trashed(id)?
        .ok_or_else(|| ApiError::NotFound("Deleted user not found".to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /users
pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, VIEW_USERS)?;

    let (filter, page_request) = validation::user_filter(&query, services.master.roles(), &services.config.api)?;
    let page = services.users().list(&filter, page_request)?;

    // Counts for the returned page only; `/users/statistics` covers everything.
    let active = page.items.iter().filter(|u| u.is_active).count();
    let verified = page.items.iter().filter(|u| u.is_verified()).count();
    let statistics = json!({
        "total_users": page.items.len(),
        "active_users": active,
        "inactive_users": page.items.len() - active,
        "verified_users": verified,
        "unverified_users": page.items.len() - verified,
    });

    let users = page
        .items
        .iter()
        .map(|u| services.user_resource(u, &auth))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(json!({
        "message": "Users retrieved successfully",
        "data": {
            "users": users,
            "statistics": statistics,
        },
        "meta": {
            "total": page.total,
            "per_page": page.per_page,
            "current_page": page.current_page,
            "last_page": page.last_page,
            "from": page.from,
            "to": page.to,
        }
    })))
}

/// GET /users/statistics
pub async fn statistics(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, VIEW_USERS)?;
    let stats = services.users().statistics(Utc::now())?;
    Ok(Json(json!({
        "message": "User statistics retrieved successfully",
        "data": stats,
    })))
}

/// POST /users
pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<UserRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    require_permission(&auth, CREATE_USERS)?;
    let body = json_body(body)?;

    let mut errs = ValidationErrors::new();
    let name = validation::name(&mut errs, body.name.as_deref(), true);
    let email = validation::email(&mut errs, body.email.as_deref(), true);
    let password = validation::password(
        &mut errs,
        &services.password_policy,
        body.password.as_deref(),
        body.password_confirmation.as_deref(),
        true,
    );
    if let Some(email) = &email {
        if services.users().find_by_email(email)?.is_some() {
            errs.add("email", "This email address is already registered.");
        }
    }
    let role_names = body.roles.unwrap_or_else(|| vec![DEFAULT_ROLE.to_string()]);
    validation::role_names(&mut errs, services.master.roles(), &role_names)?;
    errs.into_result()?;
    let (Some(name), Some(email), Some(password)) = (name, email, password) else {
        return Err(ApiError::Internal("validated user input missing".to_string()));
    };

    let id = UserId::new();
    let user = services
        .dispatch(
            id,
            UserCommand::Create(CreateUser {
                user_id: id,
                name,
                email,
                password_hash: hash_password(&password)?,
                email_verified_at: None,
                is_active: body.is_active.unwrap_or(true),
                role_ids: role_ids(&services, &role_names)?,
                occurred_at: Utc::now(),
            }),
        )?
        .user;

    tracing::info!(
        user_id = %user.id,
        email = %user.email,
        roles = ?role_names,
        created_by = %auth.user_id(),
        "user created"
    );

    let resource = services.user_resource(&user, &auth)?;
    Ok((StatusCode::CREATED, data("User created successfully", resource)).into_response())
}

/// GET /users/:id
pub async fn show_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, VIEW_USERS)?;
    let user = services.live_user(parse_id(&id, "User")?)?;
    Ok(data("User retrieved successfully", services.user_resource(&user, &auth)?))
}

/// PUT|PATCH /users/:id
pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    body: Result<Json<UserRequest>, JsonRejection>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, EDIT_USERS)?;
    let user = services.live_user(parse_id(&id, "User")?)?;
    let body = json_body(body)?;

    let mut errs = ValidationErrors::new();
    let name = validation::name(&mut errs, body.name.as_deref(), false);
    let email = validation::email(&mut errs, body.email.as_deref(), false);
    let password = validation::password(
        &mut errs,
        &services.password_policy,
        body.password.as_deref(),
        body.password_confirmation.as_deref(),
        false,
    );
    if let Some(email) = &email {
        if let Some(other) = services.users().find_by_email(email)? {
            if other.id != user.id {
                errs.add("email", "This email address is already registered.");
            }
        }
    }
    if let Some(roles) = &body.roles {
        validation::role_names(&mut errs, services.master.roles(), roles)?;
    }
    errs.into_result()?;

    let now = Utc::now();

    // Status first: it is the only change that can be refused outright.
    if let Some(active) = body.is_active.filter(|a| *a != user.is_active) {
        services.dispatch(
            user.id,
            UserCommand::SetActive(SetActive {
                active,
                actor: auth.user_id(),
                occurred_at: now,
            }),
        )?;
    }

    let password_hash = password.as_deref().map(hash_password).transpose()?;
    let mut updated = services
        .dispatch(
            user.id,
            UserCommand::UpdateProfile(UpdateProfile {
                name,
                email,
                password_hash,
                occurred_at: now,
            }),
        )?
        .user;

    if let Some(roles) = &body.roles {
        updated = services
            .dispatch(
                user.id,
                UserCommand::SyncRoles(ChangeRoles {
                    role_ids: role_ids(&services, roles)?,
                    occurred_at: now,
                }),
            )?
            .user;
    }

    tracing::info!(user_id = %user.id, updated_by = %auth.user_id(), "user updated");
    Ok(data("User updated successfully", services.user_resource(&updated, &auth)?))
}

/// DELETE /users/:id (soft)
pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, DELETE_USERS)?;
    let user = services.live_user(parse_id(&id, "User")?)?;

    services.dispatch(
        user.id,
        UserCommand::Delete(DeleteUser {
            actor: auth.user_id(),
            occurred_at: Utc::now(),
        }),
    )?;

    tracing::info!(user_id = %user.id, email = %user.email, deleted_by = %auth.user_id(), "user deleted");
    Ok(Json(json!({ "message": "User deleted successfully" })))
}

/// POST /users/:id/restore
pub async fn restore_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, MANAGE_USERS)?;
    let user = trashed_user(&services, parse_id(&id, "Deleted user")?)?;

    let restored = services
        .dispatch(
            user.id,
            UserCommand::Restore(RestoreUser {
                actor: auth.user_id(),
                occurred_at: Utc::now(),
            }),
        )?
        .user;

    tracing::info!(user_id = %user.id, restored_by = %auth.user_id(), "user restored");
    Ok(data("User restored successfully", services.user_resource(&restored, &auth)?))
}

/// DELETE /users/:id/force
pub async fn force_delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, MANAGE_USERS)?;
    let user = trashed_user(&services, parse_id(&id, "Deleted user")?)?;

    services.dispatch(
        user.id,
        UserCommand::ForceDelete(ForceDeleteUser {
            actor: auth.user_id(),
            occurred_at: Utc::now(),
        }),
    )?;
    services.tokens.purge_for_user(user.id)?;

    tracing::warn!(user_id = %user.id, email = %user.email, force_deleted_by = %auth.user_id(), "user permanently deleted");
    Ok(Json(json!({ "message": "User permanently deleted" })))
}

/// PATCH /users/:id/toggle-status
pub async fn toggle_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, MANAGE_USERS)?;
    let user = services.live_user(parse_id(&id, "User")?)?;

    let updated = services
        .dispatch(
            user.id,
            UserCommand::SetActive(SetActive {
                active: !user.is_active,
                actor: auth.user_id(),
                occurred_at: Utc::now(),
            }),
        )?
        .user;

    tracing::info!(
        user_id = %user.id,
        new_status = if updated.is_active { "active" } else { "inactive" },
        updated_by = %auth.user_id(),
        "user status toggled"
    );
    Ok(data("User status updated successfully", services.user_resource(&updated, &auth)?))
}

/// POST /users/:id/roles
pub async fn assign_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    body: Result<Json<RolesRequest>, JsonRejection>,
) -> Result<Json<JsonValue>, ApiError> {
    change_roles(services, auth, id, body, true).await
}

/// DELETE /users/:id/roles
pub async fn remove_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    body: Result<Json<RolesRequest>, JsonRejection>,
) -> Result<Json<JsonValue>, ApiError> {
    change_roles(services, auth, id, body, false).await
}

async fn change_roles(
    services: Arc<AppServices>,
    auth: AuthContext,
    id: String,
    body: Result<Json<RolesRequest>, JsonRejection>,
    assign: bool,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, MANAGE_ROLES)?;
    let user = services.live_user(parse_id(&id, "User")?)?;
    let body = json_body(body)?;
    let role_ids = requested_roles(&services, body.roles)?;

    let change = ChangeRoles {
        role_ids,
        occurred_at: Utc::now(),
    };
    let command = if assign {
        UserCommand::AssignRoles(change)
    } else {
        UserCommand::RemoveRoles(change)
    };
    let updated = services.dispatch(user.id, command)?.user;

    tracing::info!(user_id = %user.id, assign, changed_by = %auth.user_id(), "user roles changed");
    let message = if assign {
        "Roles assigned successfully"
    } else {
        "Roles removed successfully"
    };
    Ok(data(message, services.user_resource(&updated, &auth)?))
}

/// POST /users/:id/permissions
pub async fn grant_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    body: Result<Json<PermissionsRequest>, JsonRejection>,
) -> Result<Json<JsonValue>, ApiError> {
    change_permissions(services, auth, id, body, true).await
}

/// DELETE /users/:id/permissions
pub async fn revoke_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    body: Result<Json<PermissionsRequest>, JsonRejection>,
) -> Result<Json<JsonValue>, ApiError> {
    change_permissions(services, auth, id, body, false).await
}

async fn change_permissions(
    services: Arc<AppServices>,
    auth: AuthContext,
    id: String,
    body: Result<Json<PermissionsRequest>, JsonRejection>,
    grant: bool,
) -> Result<Json<JsonValue>, ApiError> {
    require_permission(&auth, MANAGE_PERMISSIONS)?;
    let user = services.live_user(parse_id(&id, "User")?)?;
    let body = json_body(body)?;
    let permission_ids = requested_permissions(&services, body.permissions)?;

    let change = ChangePermissions {
        permission_ids,
        occurred_at: Utc::now(),
    };
    let command = if grant {
        UserCommand::GrantPermissions(change)
    } else {
        UserCommand::RevokePermissions(change)
    };
    let updated = services.dispatch(user.id, command)?.user;

    tracing::info!(user_id = %user.id, grant, changed_by = %auth.user_id(), "user permissions changed");
    let message = if grant {
        "Permissions granted successfully"
    } else {
        "Permissions revoked successfully"
    };
    Ok(data(message, services.user_resource(&updated, &auth)?))
}
