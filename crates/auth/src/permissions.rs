use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque kebab-case names (e.g. "edit-users"). The special
/// wildcard `"*"` satisfies every check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Permission {
    fn from(value: &'static str) -> Self {
        Self::from_static(value)
    }
}

pub const VIEW_USERS: &str = "view-users";
pub const CREATE_USERS: &str = "create-users";
pub const EDIT_USERS: &str = "edit-users";
pub const DELETE_USERS: &str = "delete-users";
pub const MANAGE_USERS: &str = "manage-users";

pub const VIEW_ROLES: &str = "view-roles";
pub const CREATE_ROLES: &str = "create-roles";
pub const EDIT_ROLES: &str = "edit-roles";
pub const DELETE_ROLES: &str = "delete-roles";
pub const MANAGE_ROLES: &str = "manage-roles";

pub const VIEW_PERMISSIONS: &str = "view-permissions";
pub const CREATE_PERMISSIONS: &str = "create-permissions";
pub const EDIT_PERMISSIONS: &str = "edit-permissions";
pub const DELETE_PERMISSIONS: &str = "delete-permissions";
pub const MANAGE_PERMISSIONS: &str = "manage-permissions";

pub const VIEW_LOGS: &str = "view-logs";
pub const MANAGE_SYSTEM: &str = "manage-system";
pub const VIEW_ANALYTICS: &str = "view-analytics";
pub const MANAGE_SETTINGS: &str = "manage-settings";

pub const ACCESS_API: &str = "access-api";
pub const ADMIN_API: &str = "admin-api";

// Not part of the seeded catalogue; only effective when granted explicitly.
pub const VIEW_SENSITIVE_DATA: &str = "view-sensitive-data";
pub const ACCESS_PREMIUM: &str = "access-premium";
pub const VIEW_ALL_TRACKING_DATA: &str = "view-all-tracking-data";

/// Every permission seeded at startup, in seeding order.
pub const CATALOGUE: &[&str] = &[
    VIEW_USERS,
    CREATE_USERS,
    EDIT_USERS,
    DELETE_USERS,
    MANAGE_USERS,
    VIEW_ROLES,
    CREATE_ROLES,
    EDIT_ROLES,
    DELETE_ROLES,
    MANAGE_ROLES,
    VIEW_PERMISSIONS,
    CREATE_PERMISSIONS,
    EDIT_PERMISSIONS,
    DELETE_PERMISSIONS,
    MANAGE_PERMISSIONS,
    VIEW_LOGS,
    MANAGE_SYSTEM,
    VIEW_ANALYTICS,
    MANAGE_SETTINGS,
    ACCESS_API,
    ADMIN_API,
];

/// Category of a permission, derived from the resource part of its name
/// (`"edit-users"` → `"users"`).
pub fn permission_category(name: &str) -> Option<String> {
    if name == "*" {
        return Some("system".to_string());
    }
    name.split_once('-').map(|(_, resource)| resource.to_string())
}

/// Human readable description for display in audit views.
pub fn permission_description(name: &str) -> Option<String> {
    if name == "*" {
        return Some("Wildcard permission - grants all permissions".to_string());
    }

    let (action, resource) = name.split_once('-')?;
    let action_desc = match action {
        "view" => "View",
        "create" => "Create",
        "edit" => "Edit",
        "delete" => "Delete",
        "manage" => "Manage",
        "access" => "Access",
        "admin" => "Administer",
        other => other,
    };

    Some(format!("{} {}", action_desc, resource.replace('-', " ")))
}
