//! The caller's own profile.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
};
use chrono::Utc;
use serde_json::{Value as JsonValue, json};

use pktracker_auth::user::UpdateProfile;
use pktracker_auth::{Gate, UserCommand, UserEvent, UserPolicy, hash_password};
use pktracker_infra::UserRepository;

use crate::app::dto::ProfileRequest;
use crate::app::errors::{ApiError, ValidationErrors, json_body};
use crate::app::routes::parse_id;
use crate::app::services::AppServices;
use crate::app::validation;
use crate::authz::require_policy;
use crate::context::AuthContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(show_profile))
        .route("/premium", get(premium_features))
        .route("/:id", put(update_profile).patch(update_profile))
}

/// GET /profile
pub async fn show_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<JsonValue>, ApiError> {
    let premium_access = Gate::ApiPremiumAccess.check(auth.principal(), None);
    Ok(Json(json!({
        "data": services.user_resource(auth.user(), &auth)?,
        "premium_access": premium_access,
    })))
}

/// PUT|PATCH /profile/:id
pub async fn update_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    body: Result<Json<ProfileRequest>, JsonRejection>,
) -> Result<Json<JsonValue>, ApiError> {
    let user = services.live_user(parse_id(&id, "User")?)?;
    require_policy(UserPolicy::update(auth.principal(), user.id))?;
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
    errs.into_result()?;

    let dispatched = services.dispatch(
        user.id,
        UserCommand::UpdateProfile(UpdateProfile {
            name,
            email,
            password_hash: password.as_deref().map(hash_password).transpose()?,
            occurred_at: Utc::now(),
        }),
    )?;

    let changed_fields: Vec<String> = dispatched
        .events
        .iter()
        .find_map(|e| match e {
            UserEvent::ProfileUpdated(p) => Some(p.changed_fields.clone()),
            _ => None,
        })
        .unwrap_or_default();

    if !changed_fields.is_empty() {
        tracing::info!(user_id = %user.id, fields = ?changed_fields, updated_by = %auth.user_id(), "profile updated");
    }

    Ok(Json(json!({
        "message": "Profile updated successfully",
        "data": services.user_resource(&dispatched.user, &auth)?,
        "changed_fields": changed_fields,
    })))
}

/// GET /profile/premium
pub async fn premium_features(Extension(auth): Extension<AuthContext>) -> Response {
    if !UserPolicy::access_premium_features(auth.principal()) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "message": "Premium subscription required",
                "upgrade_url": "/api/v1/subscription/upgrade",
            })),
        )
            .into_response();
    }

    Json(json!({
        "premium_features": {
            "advanced_analytics": true,
            "unlimited_storage": true,
            "priority_support": true,
            "custom_themes": true,
        }
    }))
    .into_response()
}
