use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

use pktracker_auth::{AuthzError, PasswordError, TokenError};
use pktracker_core::DomainError;
use pktracker_infra::{DispatchError, MasterDataError, RepositoryError};

/// Field → messages, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errs = Self::new();
        errs.add(field, message);
        errs
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.entry(field.into()).or_default().push(message.into());
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }

    fn to_json(&self) -> JsonValue {
        json!(self.fields)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(ValidationErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("account disabled")]
    AccountDisabled,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Invariant(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{what} not found"))
    }

    pub fn unauthenticated() -> Self {
        ApiError::Unauthenticated("Unauthenticated.".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Invariant(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::AccountDisabled => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Validation(errors) => json_error_with(
                status,
                "validation_error",
                "The given data was invalid.",
                json!({ "errors": errors.to_json() }),
            ),
            ApiError::BadRequest(msg) => json_error(status, "bad_request", msg),
            ApiError::Unauthenticated(msg) => json_error(status, "unauthenticated", msg),
            ApiError::Forbidden(msg) => json_error(status, "forbidden", msg),
            ApiError::AccountDisabled => json_error(status, "account_disabled", "Your account has been disabled"),
            ApiError::NotFound(msg) => json_error(status, "not_found", msg),
            ApiError::Conflict(msg) => json_error(status, "conflict", msg),
            ApiError::Invariant(msg) => json_error(status, "invariant_violation", msg),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                json_error(status, "server_error", "Internal server error")
            }
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Like [`json_error`], with `extra`'s top-level fields merged into the body.
pub fn json_error_with(status: StatusCode, code: &'static str, message: impl Into<String>, extra: JsonValue) -> Response {
    let mut body = json!({
        "error": code,
        "message": message.into(),
    });
    if let (Some(obj), JsonValue::Object(extra)) = (body.as_object_mut(), extra) {
        obj.extend(extra);
    }
    (status, Json(body)).into_response()
}

/// Unwrap a JSON body, turning malformed input into a 400.
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversions
// ─────────────────────────────────────────────────────────────────────────────

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { field, message } => ApiError::Validation(ValidationErrors::single(field, message)),
            DomainError::InvalidId(msg) => ApiError::Validation(ValidationErrors::single("id", msg)),
            DomainError::InvariantViolation(msg) => ApiError::Invariant(msg),
            DomainError::NotFound(what) => ApiError::not_found(what),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(msg) => ApiError::Conflict(msg),
            RepositoryError::NotFound => ApiError::NotFound("Resource not found".to_string()),
            RepositoryError::Poisoned => ApiError::Internal("storage lock poisoned".to_string()),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Validation { field, message } => {
                ApiError::Validation(ValidationErrors::single(field, message))
            }
            DispatchError::InvariantViolation(msg) => ApiError::Invariant(msg),
            DispatchError::NotFound => ApiError::not_found("User"),
            DispatchError::Conflict(msg) => ApiError::Conflict(msg),
            DispatchError::Repository(e) => e.into(),
            DispatchError::Serialize(msg) | DispatchError::Publish(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<MasterDataError> for ApiError {
    fn from(err: MasterDataError) -> Self {
        match err {
            MasterDataError::Domain(e) => e.into(),
            MasterDataError::Repository(e) => e.into(),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Inactive => ApiError::AccountDisabled,
            AuthzError::Forbidden(_) => ApiError::Forbidden("This action is unauthorized.".to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => ApiError::Internal(msg),
            TokenError::Malformed(_) | TokenError::Invalid(_) => ApiError::unauthenticated(),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
