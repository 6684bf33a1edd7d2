//! Errors raised by account and access-control rules.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Why a user, role or permission operation was refused.
///
/// Uniqueness conflicts are detected by the stores, not here, and
/// authorization is decided by `pktracker-auth` before any rule runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input for `field` was rejected.
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    /// The operation would leave an account or role in a forbidden state,
    /// e.g. deactivating yourself or deleting `super-admin`.
    #[error("{0}")]
    InvariantViolation(String),

    /// A path or body id did not parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The named record does not exist (or is trashed).
    #[error("{0} not found")]
    NotFound(&'static str),
}

impl DomainError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: &'static str) -> Self {
        Self::NotFound(what)
    }

    /// Field to report the failure under, for field-keyed error bodies.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } => Some(*field),
            Self::InvalidId(_) => Some("id"),
            _ => None,
        }
    }
}
