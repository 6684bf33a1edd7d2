use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use pktracker_core::UserId;

use crate::permissions::{permission_category, permission_description};
use crate::roles::role_description;
use crate::{Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("account is disabled")]
    Inactive,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal for a single permission.
///
/// - No IO
/// - No panics
/// - Deactivated principals are refused regardless of their grants
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if !principal.is_active {
        return Err(AuthzError::Inactive);
    }

    if principal.has_permission(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    /// The permission that was being checked.
    pub required_permission: String,

    pub granted: bool,

    /// Human-readable reason for the decision.
    pub reason: String,

    pub principal: PrincipalState,

    /// Held roles whose grants include the permission.
    pub granting_roles: Vec<String>,

    /// If denied, this explains what was missing.
    pub denial_reason: Option<DenialReason>,
}

/// Current state of the principal being checked.
#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub user_id: UserId,
    pub is_active: bool,
    pub roles: Vec<String>,
    pub effective_permissions: Vec<String>,
    pub has_wildcard: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    AccountDisabled,
    MissingPermission,
}

/// Explain why an authorization decision was made (or would be made).
///
/// `role_permissions` maps a role name to what it grants; it is used to tell
/// role-derived grants apart from direct ones.
pub fn explain_authorization<F>(
    principal: &Principal,
    required: &Permission,
    role_permissions: F,
) -> AuthorizationExplanation
where
    F: Fn(&str) -> Vec<String>,
{
    let required_str = required.as_str();
    let has_wildcard = principal.permissions.iter().any(|p| p.is_wildcard());

    let granting_roles: Vec<String> = principal
        .roles
        .iter()
        .filter(|r| {
            role_permissions(r.as_str())
                .iter()
                .any(|p| p == required_str || p == "*")
        })
        .map(|r| r.as_str().to_string())
        .collect();

    let state = PrincipalState {
        user_id: principal.user_id,
        is_active: principal.is_active,
        roles: principal.role_names(),
        effective_permissions: principal.permission_names(),
        has_wildcard,
    };

    if !principal.is_active {
        return AuthorizationExplanation {
            required_permission: required_str.to_string(),
            granted: false,
            reason: "Account is disabled; every permission check is refused".to_string(),
            principal: state,
            granting_roles,
            denial_reason: Some(DenialReason {
                kind: DenialKind::AccountDisabled,
                message: "The account has been deactivated".to_string(),
                suggestions: vec!["Re-activate the account via PATCH /api/v1/users/{id}/toggle-status".to_string()],
            }),
        };
    }

    if principal.has_permission(required_str) {
        let reason = if has_wildcard {
            "Principal has wildcard permission '*'".to_string()
        } else if !granting_roles.is_empty() {
            format!("Permission '{}' is granted by role(s) {:?}", required_str, granting_roles)
        } else {
            format!("Permission '{}' is granted directly", required_str)
        };

        return AuthorizationExplanation {
            required_permission: required_str.to_string(),
            granted: true,
            reason,
            principal: state,
            granting_roles,
            denial_reason: None,
        };
    }

    let suggestions = vec![
        format!("Assign a role that grants the '{}' permission", required_str),
        format!("Grant the '{}' permission directly to the user", required_str),
    ];

    AuthorizationExplanation {
        required_permission: required_str.to_string(),
        granted: false,
        reason: format!(
            "Principal does not have permission '{}'. Current permissions: {:?}",
            required_str, state.effective_permissions
        ),
        principal: state,
        granting_roles,
        denial_reason: Some(DenialReason {
            kind: DenialKind::MissingPermission,
            message: format!("Missing required permission: '{}'", required_str),
            suggestions,
        }),
    }
}

/// Role definition with its granted permissions (for audit/display).
#[derive(Debug, Clone, Serialize)]
pub struct RoleDefinition {
    pub name: String,
    pub permissions: Vec<String>,
    pub description: Option<String>,
}

/// Permission definition (for audit/display).
#[derive(Debug, Clone, Serialize)]
pub struct PermissionDefinition {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
}

/// Registry of all known roles and permissions, keyed by name.
#[derive(Debug, Clone, Serialize)]
pub struct RbacRegistry {
    pub roles: BTreeMap<String, RoleDefinition>,
    pub permissions: BTreeMap<String, PermissionDefinition>,
}

impl RbacRegistry {
    /// Build a registry from role names, a role → permission mapping and the
    /// full list of permission names (so unassigned permissions still show up).
    pub fn from_role_mapping<F>(role_names: &[String], all_permissions: &[String], role_permissions: F) -> Self
    where
        F: Fn(&str) -> Vec<String>,
    {
        let mut roles = BTreeMap::new();
        let mut permissions = BTreeMap::new();

        for name in all_permissions {
            permissions.insert(name.clone(), permission_definition(name));
        }

        for role_name in role_names {
            let mut perms = role_permissions(role_name);
            perms.sort();

            for perm in &perms {
                permissions
                    .entry(perm.clone())
                    .or_insert_with(|| permission_definition(perm));
            }

            roles.insert(
                role_name.clone(),
                RoleDefinition {
                    name: role_name.clone(),
                    permissions: perms,
                    description: role_description(role_name),
                },
            );
        }

        Self { roles, permissions }
    }
}

fn permission_definition(name: &str) -> PermissionDefinition {
    PermissionDefinition {
        name: name.to_string(),
        description: permission_description(name),
        category: permission_category(name),
    }
}
