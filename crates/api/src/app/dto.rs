use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pktracker_auth::User;
use pktracker_auth::permissions::VIEW_SENSITIVE_DATA;
use pktracker_core::UserId;

use crate::context::AuthContext;

// -------------------------
// Request DTOs
// -------------------------

// Fields are optional so that missing input becomes a field-level
// validation message instead of a body rejection.

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Body of `POST /users` and `PUT|PATCH /users/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct UserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
    pub roles: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RolesRequest {
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PermissionsRequest {
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RoleRequest {
    pub name: Option<String>,
    pub guard_name: Option<String>,
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PermissionRequest {
    pub name: Option<String>,
    pub guard_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MasterDataQuery {
    pub search: Option<String>,
    pub guard_name: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

/// A user as shown to a given viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserResource {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    /// Present only for viewers holding `view-sensitive-data`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_ip: Option<Option<String>>,
    pub login_count: u64,
    pub two_factor_enabled: bool,
    pub roles: Vec<String>,
    /// Present only for viewers holding `view-permissions`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub initials: String,
    pub status: &'static str,
    pub account_age_days: i64,
}

pub fn user_resource(
    user: &User,
    roles: Vec<String>,
    permissions: Option<Vec<String>>,
    viewer: &AuthContext,
    now: DateTime<Utc>,
) -> UserResource {
    UserResource {
        id: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        email_verified_at: user.email_verified_at,
        is_active: user.is_active,
        last_login_at: user.last_login_at,
        last_login_ip: viewer
            .can(VIEW_SENSITIVE_DATA)
            .then(|| user.last_login_ip.clone()),
        login_count: user.login_count,
        two_factor_enabled: user.two_factor_enabled,
        roles,
        permissions,
        created_at: user.created_at,
        updated_at: user.updated_at,
        deleted_at: user.deleted_at,
        initials: user.initials(),
        status: if user.is_active { "active" } else { "inactive" },
        account_age_days: (now - user.created_at).num_days().max(0),
    }
}
