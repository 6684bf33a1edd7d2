use std::str::FromStr;

use axum::{
    Router,
    routing::{get, post},
};

use pktracker_core::DomainError;
use pktracker_infra::{MasterDataError, RepositoryError};

use crate::app::errors::{ApiError, ValidationErrors};

pub mod audit;
pub mod auth;
pub mod master_data;
pub mod permissions;
pub mod profile;
pub mod rbac;
pub mod roles;
pub mod system;
pub mod users;

/// Routes reachable without a token (`/auth/register`, `/auth/login`).
pub fn public_router() -> Router {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
}

/// Routes behind bearer authentication.
pub fn protected_router() -> Router {
    Router::new()
        .route("/auth/user", get(auth::current_user))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/logout-all", post(auth::logout_all))
        .route("/auth/refresh", post(auth::refresh))
        .nest("/users", users::router())
        .nest("/profile", profile::router())
        .nest("/roles", roles::router())
        .nest("/permissions", permissions::router())
        .nest("/master-data", master_data::router())
        .nest("/rbac", rbac::router())
        .nest("/audit", audit::router())
}

/// Parse a path id; anything unparsable is reported as a missing `what`.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse().map_err(|_| ApiError::not_found(what))
}

/// Map master data failures, naming the missing record `what`.
pub(crate) fn master_error(what: &'static str) -> impl Fn(MasterDataError) -> ApiError {
    move |err| match err {
        MasterDataError::Domain(DomainError::NotFound(_)) | MasterDataError::Repository(RepositoryError::NotFound) => {
            ApiError::not_found(what)
        }
        other => other.into(),
    }
}

/// `name` of a role or permission: required when `required`, trimmed, at most 255 chars.
pub(crate) fn record_name(errs: &mut ValidationErrors, raw: Option<&str>, required: bool) -> Option<String> {
    match raw.map(str::trim) {
        None if required => {
            errs.add("name", "The name field is required.");
            None
        }
        None => None,
        Some("") => {
            errs.add("name", "The name field is required.");
            None
        }
        Some(name) if name.chars().count() > 255 => {
            errs.add("name", "The name may not be greater than 255 characters.");
            None
        }
        Some(name) => Some(name.to_string()),
    }
}
