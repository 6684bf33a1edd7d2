//! Registration, login and token lifecycle.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use serde_json::json;

use pktracker_auth::roles::DEFAULT_ROLE;
use pktracker_auth::user::{CreateUser, RecordLogin};
use pktracker_auth::{UserCommand, hash_password, verify_password};
use pktracker_core::UserId;
use pktracker_infra::{UserRepository, limiter_key};

use crate::app::dto::{LoginRequest, RegisterRequest};
use crate::app::errors::{ApiError, ValidationErrors, json_body, json_error, json_error_with};
use crate::app::services::AppServices;
use crate::app::validation;
use crate::context::{AuthContext, ClientIp};

fn user_agent(headers: &HeaderMap) -> &str {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// POST /auth/register
pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ip): Extension<ClientIp>,
    headers: HeaderMap,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
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
    errs.into_result()?;
    let (Some(name), Some(email), Some(password)) = (name, email, password) else {
        return Err(ApiError::Internal("validated register input missing".to_string()));
    };

    let default_role = services
        .master
        .roles()
        .find_by_name(DEFAULT_ROLE)?
        .ok_or_else(|| ApiError::Internal(format!("role '{DEFAULT_ROLE}' is not seeded")))?;

    let now = Utc::now();
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
                is_active: true,
                role_ids: vec![default_role.id],
                occurred_at: now,
            }),
        )?
        .user;

    let issued = services.issue_token(&user, "Personal Access Token", now)?;

    tracing::info!(
        user_id = %user.id,
        email = %user.email,
        ip = %ip.as_str(),
        user_agent = %user_agent(&headers),
        "user registered"
    );

    let roles = services.master.role_names_of(&user)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "user": {
                "id": user.id,
                "name": user.name,
                "email": user.email,
                "roles": roles,
            },
            "access_token": issued.access_token,
            "token_type": "Bearer",
            "expires_at": issued.record.expires_at,
        })),
    )
        .into_response())
}

/// POST /auth/login
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ip): Extension<ClientIp>,
    headers: HeaderMap,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_body(body)?;

    let auth = &services.config.auth;
    let throttle_key = limiter_key("login", None, ip.as_str());
    if services.limiter.too_many_attempts(&throttle_key, auth.login_max_attempts) {
        let retry_after = services.limiter.available_in(&throttle_key);
        tracing::warn!(ip = %ip.as_str(), retry_after, "login rate limit exceeded");
        return Ok(json_error_with(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many login attempts",
            format!("Please try again in {retry_after} seconds"),
            json!({ "retry_after": retry_after }),
        ));
    }

    let mut errs = ValidationErrors::new();
    let email = validation::email(&mut errs, body.email.as_deref(), true);
    let password = match body.password.as_deref() {
        Some(p) if !p.is_empty() => Some(p),
        _ => {
            errs.add("password", "The password field is required.");
            None
        }
    };
    errs.into_result()?;
    let (Some(email), Some(password)) = (email, password) else {
        return Err(ApiError::Internal("validated login input missing".to_string()));
    };

    // Trashed accounts cannot sign in and must look exactly like unknown ones.
    let user = services.users().find_by_email(&email)?.filter(|u| !u.is_trashed());
    let verified = match &user {
        Some(u) => verify_password(password, &u.password_hash)?,
        None => false,
    };
    let user = match user {
        Some(u) if verified => u,
        _ => {
            services
                .limiter
                .hit(&throttle_key, Duration::seconds(auth.login_decay_seconds));
            tracing::warn!(
                email = %email,
                ip = %ip.as_str(),
                user_agent = %user_agent(&headers),
                "failed login attempt"
            );
            return Ok(json_error(
                StatusCode::UNAUTHORIZED,
                "Invalid credentials",
                "The provided credentials are incorrect",
            ));
        }
    };

    if !user.is_active {
        return Ok(json_error(
            StatusCode::FORBIDDEN,
            "Account disabled",
            "Your account has been disabled",
        ));
    }

    let now = Utc::now();
    let user = services
        .dispatch(
            user.id,
            UserCommand::RecordLogin(RecordLogin {
                ip: ip.as_str().to_string(),
                occurred_at: now,
            }),
        )?
        .user;
    services.limiter.clear(&throttle_key);

    // Leave room for the token about to be issued.
    let cap = auth.max_tokens_per_user.saturating_sub(1);
    services.tokens.prune_excess(user.id, cap, now)?;
    let issued = services.issue_token(&user, "PKTracker API Token", now)?;

    tracing::info!(
        user_id = %user.id,
        email = %user.email,
        ip = %ip.as_str(),
        user_agent = %user_agent(&headers),
        "user logged in"
    );

    let principal = services.principal_for(&user)?;
    Ok(Json(json!({
        "message": "Login successful",
        "user": {
            "id": user.id,
            "name": user.name,
            "email": user.email,
            "roles": principal.role_names(),
            "permissions": principal.permission_names(),
        },
        "access_token": issued.access_token,
        "token_type": "Bearer",
        "expires_at": issued.record.expires_at,
    }))
    .into_response())
}

/// GET /auth/user
pub async fn current_user(Extension(auth): Extension<AuthContext>) -> Json<serde_json::Value> {
    let user = auth.user();
    let principal = auth.principal();
    Json(json!({
        "user": {
            "id": user.id,
            "name": user.name,
            "email": user.email,
            "email_verified_at": user.email_verified_at,
            "roles": principal.role_names(),
            "permissions": principal.permission_names(),
            "created_at": user.created_at,
            "updated_at": user.updated_at,
        }
    }))
}

/// POST /auth/logout
pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Extension(ip): Extension<ClientIp>,
) -> Result<Json<serde_json::Value>, ApiError> {
    services.tokens.revoke(auth.token_id())?;
    tracing::info!(user_id = %auth.user_id(), ip = %ip.as_str(), "user logged out");
    Ok(Json(json!({ "message": "Successfully logged out" })))
}

/// POST /auth/logout-all
pub async fn logout_all(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Extension(ip): Extension<ClientIp>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let revoked = services.tokens.revoke_all_for_user(auth.user_id())?;
    tracing::info!(
        user_id = %auth.user_id(),
        ip = %ip.as_str(),
        revoked,
        "user logged out from all devices"
    );
    Ok(Json(json!({
        "message": "Successfully logged out from all devices",
        "revoked_tokens": revoked,
    })))
}

/// POST /auth/refresh
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthContext>,
    Extension(ip): Extension<ClientIp>,
) -> Result<Json<serde_json::Value>, ApiError> {
    services.tokens.revoke(auth.token_id())?;
    let issued = services.issue_token(auth.user(), "Personal Access Token", Utc::now())?;
    tracing::info!(user_id = %auth.user_id(), ip = %ip.as_str(), "token refreshed");
    Ok(Json(json!({
        "message": "Token refreshed successfully",
        "access_token": issued.access_token,
        "token_type": "Bearer",
        "expires_at": issued.record.expires_at,
    })))
}
