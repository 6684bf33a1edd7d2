//! In-memory repositories for accounts, roles, permissions and tokens.
//!
//! Everything lives behind `RwLock`s; a poisoned lock surfaces as
//! [`RepositoryError::Poisoned`] rather than a panic.

pub mod permissions;
pub mod roles;
pub mod tokens;
pub mod users;

use thiserror::Error;

pub use permissions::{InMemoryPermissionRepository, PermissionRecord};
pub use roles::{InMemoryRoleRepository, RoleRecord};
pub use tokens::InMemoryTokenStore;
pub use users::{
    InMemoryUserRepository, SortField, SortOrder, StatusFilter, UserFilter, UserRepository,
    UserStatistics,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found")]
    NotFound,

    #[error("repository lock poisoned")]
    Poisoned,
}

/// Case-insensitive "contains" used by every `search` filter.
pub(crate) fn matches_search(haystacks: &[&str], needle: Option<&str>) -> bool {
    match needle.map(str::trim).filter(|n| !n.is_empty()) {
        None => true,
        Some(n) => {
            let n = n.to_lowercase();
            haystacks.iter().any(|h| h.to_lowercase().contains(&n))
        }
    }
}
