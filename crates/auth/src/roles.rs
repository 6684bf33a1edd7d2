use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::permissions::*;

/// Role identifier used for RBAC.
///
/// Roles are opaque names at this layer; which permissions a role grants is
/// stored alongside it (see the infra role repository). The built-in set
/// below is what gets seeded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `super-admin` can never be deleted.
    pub fn is_protected(&self) -> bool {
        self.as_str() == SUPER_ADMIN
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Role {
    fn from(value: &'static str) -> Self {
        Self::from_static(value)
    }
}

pub const SUPER_ADMIN: &str = "super-admin";
pub const ADMIN: &str = "admin";
pub const MODERATOR: &str = "moderator";
pub const USER: &str = "user";

/// Consulted by premium gates; not seeded.
pub const PREMIUM: &str = "premium";

/// Role every self-registered account receives.
pub const DEFAULT_ROLE: &str = USER;

/// Guard name assigned to roles and permissions when none is given.
pub const DEFAULT_GUARD: &str = "api";

/// Roles seeded at startup, in seeding order.
pub const BUILTIN_ROLES: &[&str] = &[SUPER_ADMIN, ADMIN, MODERATOR, USER];

/// Permissions granted to a built-in role at seed time.
///
/// Unknown roles grant nothing.
pub fn builtin_role_permissions(role: &str) -> Vec<&'static str> {
    match role {
        SUPER_ADMIN => CATALOGUE.to_vec(),
        ADMIN => vec![
            VIEW_USERS,
            CREATE_USERS,
            EDIT_USERS,
            VIEW_ROLES,
            CREATE_ROLES,
            EDIT_ROLES,
            VIEW_PERMISSIONS,
            VIEW_LOGS,
            VIEW_ANALYTICS,
            ACCESS_API,
            ADMIN_API,
        ],
        MODERATOR => vec![VIEW_USERS, EDIT_USERS, VIEW_ROLES, VIEW_PERMISSIONS, ACCESS_API],
        USER => vec![ACCESS_API],
        _ => Vec::new(),
    }
}

pub fn role_description(role: &str) -> Option<String> {
    match role {
        SUPER_ADMIN => Some("Unrestricted administrator holding every permission".to_string()),
        ADMIN => Some("Administrator managing users and roles".to_string()),
        MODERATOR => Some("Moderator reviewing and editing users".to_string()),
        USER => Some("Regular account with API access".to_string()),
        PREMIUM => Some("Subscriber with access to premium features".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn super_admin_gets_whole_catalogue() {
        assert_eq!(builtin_role_permissions(SUPER_ADMIN).len(), CATALOGUE.len());
    }

    #[test]
    fn builtin_roles_only_reference_catalogue_permissions() {
        for role in BUILTIN_ROLES {
            for perm in builtin_role_permissions(role) {
                assert!(CATALOGUE.contains(&perm), "{role} references unknown {perm}");
            }
        }
    }

    #[test]
    fn only_super_admin_is_protected() {
        assert!(Role::from_static(SUPER_ADMIN).is_protected());
        assert!(!Role::from_static(ADMIN).is_protected());
    }
}
