//! Role and permission management, and principal resolution.
//!
//! Roles grant permissions by id, so renaming a permission never breaks the
//! roles that hold it.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use pktracker_auth::roles::DEFAULT_GUARD;
use pktracker_auth::{Permission, Principal, RbacRegistry, Role, User};
use pktracker_core::{DomainError, PermissionId, RoleId};

use crate::repository::{
    InMemoryPermissionRepository, InMemoryRoleRepository, PermissionRecord, RepositoryError, RoleRecord,
    UserRepository,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MasterDataError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRole {
    pub name: String,
    pub guard_name: Option<String>,
    pub permissions: Vec<String>,
}

/// `None` leaves a field alone; `permissions: Some(..)` replaces the whole set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleChanges {
    pub name: Option<String>,
    pub guard_name: Option<String>,
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPermission {
    pub name: String,
    pub guard_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PermissionChanges {
    pub name: Option<String>,
    pub guard_name: Option<String>,
}

/// A role with its permission names and holder count, for responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleDetails {
    #[serde(flatten)]
    pub role: RoleRecord,
    pub permissions: Vec<String>,
    pub users_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionDetails {
    #[serde(flatten)]
    pub permission: PermissionRecord,
    pub roles: Vec<String>,
    pub users_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MasterDataStatistics {
    pub total_roles: u64,
    pub total_permissions: u64,
    pub roles_with_users: u64,
    pub permissions_with_roles: u64,
}

#[derive(Clone)]
pub struct MasterDataService {
    roles: Arc<InMemoryRoleRepository>,
    permissions: Arc<InMemoryPermissionRepository>,
    users: Arc<dyn UserRepository>,
}

impl core::fmt::Debug for MasterDataService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MasterDataService").finish_non_exhaustive()
    }
}

fn clean_name(name: &str, what: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name", format!("The {what} name field is required.")));
    }
    if name.chars().count() > 255 {
        return Err(DomainError::validation("name", format!(
            "The {what} name may not be greater than 255 characters."
        )));
    }
    Ok(name.to_string())
}

impl MasterDataService {
    pub fn new(
        roles: Arc<InMemoryRoleRepository>,
        permissions: Arc<InMemoryPermissionRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            roles,
            permissions,
            users,
        }
    }

    pub fn roles(&self) -> &InMemoryRoleRepository {
        &self.roles
    }

    pub fn permissions(&self) -> &InMemoryPermissionRepository {
        &self.permissions
    }

    fn permission_ids_for(&self, names: &[String]) -> Result<Vec<PermissionId>, MasterDataError> {
        match self.permissions.find_by_names(names)? {
            Ok(found) => {
                let mut ids: Vec<PermissionId> = found.into_iter().map(|p| p.id).collect();
                ids.dedup();
                Ok(ids)
            }
            Err(missing) => Err(DomainError::validation("permissions", format!(
                "The selected permissions are invalid: {}",
                missing.join(", ")
            ))
            .into()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────────

    pub fn list_roles(&self, search: Option<&str>, guard_name: Option<&str>) -> Result<Vec<RoleDetails>, MasterDataError> {
        self.roles
            .list(search, guard_name)?
            .into_iter()
            .map(|r| self.role_details(r))
            .collect()
    }

    pub fn get_role(&self, id: RoleId) -> Result<RoleDetails, MasterDataError> {
        let role = self.roles.get(id)?.ok_or(DomainError::not_found("Role"))?;
        self.role_details(role)
    }

    pub fn role_details(&self, role: RoleRecord) -> Result<RoleDetails, MasterDataError> {
        let permissions = self.permissions.names_of(&role.permission_ids)?;
        let users_count = self.users.count_with_role(role.id)?;
        Ok(RoleDetails {
            role,
            permissions,
            users_count,
        })
    }

    pub fn create_role(&self, input: NewRole) -> Result<RoleDetails, MasterDataError> {
        let name = clean_name(&input.name, "role")?;
        let permission_ids = self.permission_ids_for(&input.permissions)?;
        let now = Utc::now();

        let record = RoleRecord {
            id: RoleId::new(),
            name,
            guard_name: input.guard_name.unwrap_or_else(|| DEFAULT_GUARD.to_string()),
            permission_ids,
            created_at: now,
            updated_at: now,
        };
        self.roles.insert(record.clone())?;

        tracing::info!(role_id = %record.id, role_name = %record.name, permissions = ?input.permissions, "role created");
        self.role_details(record)
    }

    pub fn update_role(&self, id: RoleId, changes: RoleChanges) -> Result<RoleDetails, MasterDataError> {
        let mut record = self.roles.get(id)?.ok_or(DomainError::not_found("Role"))?;

        if let Some(name) = &changes.name {
            let name = clean_name(name, "role")?;
            if Role::new(record.name.clone()).is_protected() && record.name != name {
                return Err(DomainError::invariant("Cannot rename super-admin role").into());
            }
            record.name = name;
        }
        if let Some(guard) = changes.guard_name {
            record.guard_name = guard;
        }
        if let Some(perms) = &changes.permissions {
            record.permission_ids = self.permission_ids_for(perms)?;
        }
        record.updated_at = Utc::now();

        self.roles.update(record.clone())?;
        tracing::info!(role_id = %record.id, role_name = %record.name, "role updated");
        self.role_details(record)
    }

    /// `super-admin` and roles still held by any user cannot be deleted.
    pub fn delete_role(&self, id: RoleId) -> Result<RoleRecord, MasterDataError> {
        let record = self.roles.get(id)?.ok_or(DomainError::not_found("Role"))?;

        if Role::new(record.name.clone()).is_protected() {
            return Err(DomainError::invariant("Cannot delete super-admin role").into());
        }
        if self.users.count_with_role(id)? > 0 {
            return Err(DomainError::invariant("Cannot delete role that is assigned to users").into());
        }

        let removed = self.roles.remove(id)?;
        tracing::warn!(role_id = %removed.id, role_name = %removed.name, "role deleted");
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────────────

    pub fn list_permissions(
        &self,
        search: Option<&str>,
        guard_name: Option<&str>,
    ) -> Result<Vec<PermissionDetails>, MasterDataError> {
        self.permissions
            .list(search, guard_name)?
            .into_iter()
            .map(|p| self.permission_details(p))
            .collect()
    }

    pub fn get_permission(&self, id: PermissionId) -> Result<PermissionDetails, MasterDataError> {
        let permission = self.permissions.get(id)?.ok_or(DomainError::not_found("Permission"))?;
        self.permission_details(permission)
    }

    pub fn permission_details(&self, permission: PermissionRecord) -> Result<PermissionDetails, MasterDataError> {
        let roles = self
            .roles
            .list(None, None)?
            .into_iter()
            .filter(|r| r.permission_ids.contains(&permission.id))
            .map(|r| r.name)
            .collect();
        let users_count = self.users.count_with_permission(permission.id)?;
        Ok(PermissionDetails {
            permission,
            roles,
            users_count,
        })
    }

    pub fn create_permission(&self, input: NewPermission) -> Result<PermissionDetails, MasterDataError> {
        let now = Utc::now();
        let record = PermissionRecord {
            id: PermissionId::new(),
            name: clean_name(&input.name, "permission")?,
            guard_name: input.guard_name.unwrap_or_else(|| DEFAULT_GUARD.to_string()),
            created_at: now,
            updated_at: now,
        };
        self.permissions.insert(record.clone())?;

        tracing::info!(permission_id = %record.id, permission_name = %record.name, "permission created");
        self.permission_details(record)
    }

    pub fn update_permission(
        &self,
        id: PermissionId,
        changes: PermissionChanges,
    ) -> Result<PermissionDetails, MasterDataError> {
        let mut record = self.permissions.get(id)?.ok_or(DomainError::not_found("Permission"))?;

        if let Some(name) = &changes.name {
            record.name = clean_name(name, "permission")?;
        }
        if let Some(guard) = changes.guard_name {
            record.guard_name = guard;
        }
        record.updated_at = Utc::now();

        self.permissions.update(record.clone())?;
        tracing::info!(permission_id = %record.id, permission_name = %record.name, "permission updated");
        self.permission_details(record)
    }

    /// Permissions held by any role or granted directly to any user cannot be deleted.
    pub fn delete_permission(&self, id: PermissionId) -> Result<PermissionRecord, MasterDataError> {
        let record = self.permissions.get(id)?.ok_or(DomainError::not_found("Permission"))?;

        if self.roles.count_with_permission(id)? > 0 || self.users.count_with_permission(id)? > 0 {
            return Err(
                DomainError::invariant("Cannot delete permission that is assigned to roles or users").into(),
            );
        }

        let removed = self.permissions.remove(id)?;
        tracing::warn!(permission_id = %removed.id, permission_name = %removed.name, "permission deleted");
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read side
    // ─────────────────────────────────────────────────────────────────────────

    pub fn statistics(&self) -> Result<MasterDataStatistics, MasterDataError> {
        let mut roles_with_users = 0;
        for role in self.roles.list(None, None)? {
            if self.users.count_with_role(role.id)? > 0 {
                roles_with_users += 1;
            }
        }

        Ok(MasterDataStatistics {
            total_roles: self.roles.count()?,
            total_permissions: self.permissions.count()?,
            roles_with_users,
            permissions_with_roles: self.roles.granted_permission_ids()?.len() as u64,
        })
    }

    /// Permission names granted by the role called `role_name`.
    pub fn role_permission_names(&self, role_name: &str) -> Vec<String> {
        match self.roles.find_by_name(role_name) {
            Ok(Some(role)) => self.permissions.names_of(&role.permission_ids).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub fn role_names_of(&self, user: &User) -> Result<Vec<String>, MasterDataError> {
        Ok(self.roles.get_many(&user.role_ids)?.into_iter().map(|r| r.name).collect())
    }

    pub fn direct_permission_names_of(&self, user: &User) -> Result<Vec<String>, MasterDataError> {
        Ok(self.permissions.names_of(&user.permission_ids)?)
    }

    /// Resolve a user's effective roles and permissions.
    pub fn principal_for(&self, user: &User) -> Result<Principal, MasterDataError> {
        let roles = self.roles.get_many(&user.role_ids)?;
        let mut by_role: Vec<(String, Vec<Permission>)> = Vec::with_capacity(roles.len());
        for role in &roles {
            let names = self.permissions.names_of(&role.permission_ids)?;
            by_role.push((role.name.clone(), names.into_iter().map(Permission::new).collect()));
        }

        let direct = self
            .permissions
            .names_of(&user.permission_ids)?
            .into_iter()
            .map(Permission::new)
            .collect();

        Ok(Principal::resolve(
            user.id,
            user.is_active,
            roles.iter().map(|r| Role::new(r.name.clone())).collect(),
            direct,
            |name| {
                by_role
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, perms)| perms.clone())
                    .unwrap_or_default()
            },
        ))
    }

    /// Registry of every stored role and permission.
    pub fn registry(&self) -> Result<RbacRegistry, MasterDataError> {
        let role_names: Vec<String> = self.roles.list(None, None)?.into_iter().map(|r| r.name).collect();
        let permission_names: Vec<String> = self.permissions.list(None, None)?.into_iter().map(|p| p.name).collect();
        Ok(RbacRegistry::from_role_mapping(&role_names, &permission_names, |r| {
            self.role_permission_names(r)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryUserRepository;
    use pktracker_auth::user::{CreateUser, UserCommand};
    use pktracker_events::execute;

    fn service() -> (MasterDataService, Arc<InMemoryUserRepository>) {
        let users = Arc::new(InMemoryUserRepository::new());
        let svc = MasterDataService::new(
            Arc::new(InMemoryRoleRepository::new()),
            Arc::new(InMemoryPermissionRepository::new()),
            users.clone(),
        );
        (svc, users)
    }

    fn perm(svc: &MasterDataService, name: &str) -> PermissionId {
        svc.create_permission(NewPermission {
            name: name.to_string(),
            guard_name: None,
        })
        .unwrap()
        .permission
        .id
    }

    fn role(svc: &MasterDataService, name: &str, perms: &[&str]) -> RoleId {
        svc.create_role(NewRole {
            name: name.to_string(),
            guard_name: None,
            permissions: perms.iter().map(|p| p.to_string()).collect(),
        })
        .unwrap()
        .role
        .id
    }

    fn user_with(users: &InMemoryUserRepository, roles: Vec<RoleId>, perms: Vec<PermissionId>) -> User {
        let id = pktracker_core::UserId::new();
        let mut user = User::empty(id);
        execute(
            &mut user,
            &UserCommand::Create(CreateUser {
                user_id: id,
                name: "Holder".to_string(),
                email: format!("{id}@example.com"),
                password_hash: "h".to_string(),
                email_verified_at: None,
                is_active: true,
                role_ids: roles,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        user.permission_ids = perms;
        users.insert(user.clone()).unwrap();
        user
    }

    #[test]
    fn guard_defaults_to_api() {
        let (svc, _) = service();
        perm(&svc, "view-users");
        let details = svc.get_role(role(&svc, "viewer", &["view-users"])).unwrap();
        assert_eq!(details.role.guard_name, "api");
        assert_eq!(details.permissions, vec!["view-users"]);
    }

    #[test]
    fn roles_must_reference_existing_permissions() {
        let (svc, _) = service();
        let err = svc
            .create_role(NewRole {
                name: "ghosts".to_string(),
                guard_name: None,
                permissions: vec!["haunt".to_string()],
            })
            .unwrap_err();
        assert!(matches!(err, MasterDataError::Domain(DomainError::Validation { .. })));
    }

    #[test]
    fn super_admin_cannot_be_deleted() {
        let (svc, _) = service();
        let id = role(&svc, "super-admin", &[]);
        assert!(matches!(
            svc.delete_role(id),
            Err(MasterDataError::Domain(DomainError::InvariantViolation(_)))
        ));
    }

    #[test]
    fn roles_held_by_users_cannot_be_deleted() {
        let (svc, users) = service();
        let held = role(&svc, "editor", &[]);
        let free = role(&svc, "spare", &[]);
        user_with(&users, vec![held], vec![]);

        assert!(svc.delete_role(held).is_err());
        assert!(svc.delete_role(free).is_ok());
        assert!(matches!(
            svc.get_role(free),
            Err(MasterDataError::Domain(DomainError::NotFound("Role")))
        ));
    }

    #[test]
    fn permissions_in_use_cannot_be_deleted() {
        let (svc, users) = service();
        let by_role = perm(&svc, "view-users");
        let by_user = perm(&svc, "view-logs");
        let unused = perm(&svc, "view-analytics");
        role(&svc, "viewer", &["view-users"]);
        user_with(&users, vec![], vec![by_user]);

        assert!(svc.delete_permission(by_role).is_err());
        assert!(svc.delete_permission(by_user).is_err());
        assert!(svc.delete_permission(unused).is_ok());
    }

    #[test]
    fn principal_unions_role_and_direct_permissions() {
        let (svc, users) = service();
        perm(&svc, "view-users");
        let logs = perm(&svc, "view-logs");
        let viewer = role(&svc, "viewer", &["view-users"]);
        let user = user_with(&users, vec![viewer], vec![logs]);

        let p = svc.principal_for(&user).unwrap();
        assert_eq!(p.role_names(), vec!["viewer"]);
        assert_eq!(p.permission_names(), vec!["view-logs", "view-users"]);
        assert!(p.is_active);
    }

    #[test]
    fn statistics_and_registry() {
        let (svc, users) = service();
        perm(&svc, "view-users");
        perm(&svc, "view-logs");
        let viewer = role(&svc, "viewer", &["view-users"]);
        role(&svc, "empty", &[]);
        user_with(&users, vec![viewer], vec![]);

        let stats = svc.statistics().unwrap();
        assert_eq!(stats.total_roles, 2);
        assert_eq!(stats.total_permissions, 2);
        assert_eq!(stats.roles_with_users, 1);
        assert_eq!(stats.permissions_with_roles, 1);

        let registry = svc.registry().unwrap();
        assert_eq!(registry.roles["viewer"].permissions, vec!["view-users"]);
        assert!(registry.permissions.contains_key("view-logs"));
    }

    #[test]
    fn renaming_onto_existing_role_conflicts() {
        let (svc, _) = service();
        role(&svc, "a", &[]);
        let b = role(&svc, "b", &[]);
        let err = svc
            .update_role(
                b,
                RoleChanges {
                    name: Some("a".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, MasterDataError::Repository(RepositoryError::Conflict(_))));
    }
}
