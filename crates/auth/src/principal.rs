use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use pktracker_core::UserId;

use crate::{Permission, Role};

/// A fully resolved principal for authorization decisions.
///
/// `permissions` is the effective set: direct grants plus everything granted
/// by any held role. Resolution happens once per request (in infra) so that
/// checks here stay pure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
    pub is_active: bool,
}

impl Principal {
    /// Build a principal from role names, direct grants and a role → permission
    /// lookup. Duplicates collapse; output order is stable.
    pub fn resolve<F>(
        user_id: UserId,
        is_active: bool,
        roles: Vec<Role>,
        direct: Vec<Permission>,
        role_permissions: F,
    ) -> Self
    where
        F: Fn(&str) -> Vec<Permission>,
    {
        let mut effective: BTreeSet<Permission> = direct.into_iter().collect();
        for role in &roles {
            effective.extend(role_permissions(role.as_str()));
        }

        Self {
            user_id,
            roles,
            permissions: effective.into_iter().collect(),
            is_active,
        }
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p.is_wildcard() || p.as_str() == name)
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.as_str() == name)
    }

    pub fn has_any_role(&self, names: &[&str]) -> bool {
        names.iter().any(|n| self.has_role(n))
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.as_str().to_string()).collect()
    }

    pub fn permission_names(&self) -> Vec<String> {
        self.permissions.iter().map(|p| p.as_str().to_string()).collect()
    }
}
