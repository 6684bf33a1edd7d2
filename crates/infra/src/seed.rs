//! Startup seeding of the permission catalogue, built-in roles and,
//! optionally, one demo account per built-in role.
//!
//! Seeding is idempotent: existing permissions and roles are reused and
//! built-in roles get their grants re-synced.

use chrono::Utc;
use serde_json::Value as JsonValue;
use thiserror::Error;

use pktracker_auth::permissions::CATALOGUE;
use pktracker_auth::roles::{self, BUILTIN_ROLES, builtin_role_permissions};
use pktracker_auth::user::CreateUser;
use pktracker_auth::{PasswordError, User, UserCommand, hash_password};
use pktracker_core::UserId;
use pktracker_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::{DispatchError, UserCommandDispatcher};
use crate::master_data::{MasterDataError, MasterDataService, NewPermission, NewRole, RoleChanges};
use crate::repository::UserRepository;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    MasterData(#[from] MasterDataError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Password(#[from] PasswordError),
}

/// What a seeding run created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub roles_created: usize,
    pub users_created: usize,
}

/// `(name, email, password, role)` for each demo account.
pub const DEMO_USERS: &[(&str, &str, &str, &str)] = &[
    ("Super Admin", "super@admin.com", "SuperAdmin123!", roles::SUPER_ADMIN),
    ("Admin User", "admin@admin.com", "Admin123!", roles::ADMIN),
    ("Moderator User", "moderator@example.com", "Moderator123!", roles::MODERATOR),
    ("Regular User", "user@example.com", "User123!", roles::USER),
];

pub fn seed_roles_and_permissions(master: &MasterDataService) -> Result<SeedReport, SeedError> {
    let mut report = SeedReport::default();

    for name in CATALOGUE {
        if master.permissions().find_by_name(name).map_err(MasterDataError::from)?.is_none() {
            master.create_permission(NewPermission {
                name: name.to_string(),
                guard_name: None,
            })?;
            report.permissions_created += 1;
        }
    }

    for role in BUILTIN_ROLES {
        let permissions: Vec<String> = builtin_role_permissions(role).into_iter().map(String::from).collect();
        match master.roles().find_by_name(role).map_err(MasterDataError::from)? {
            Some(existing) => {
                master.update_role(
                    existing.id,
                    RoleChanges {
                        permissions: Some(permissions),
                        ..Default::default()
                    },
                )?;
            }
            None => {
                master.create_role(NewRole {
                    name: role.to_string(),
                    guard_name: None,
                    permissions,
                })?;
                report.roles_created += 1;
            }
        }
    }

    tracing::info!(
        permissions_created = report.permissions_created,
        roles_created = report.roles_created,
        "roles and permissions seeded"
    );
    Ok(report)
}

/// Create the demo accounts that do not exist yet. Accounts are active and verified.
pub fn seed_demo_users<R, B>(
    master: &MasterDataService,
    dispatcher: &UserCommandDispatcher<R, B>,
) -> Result<Vec<User>, SeedError>
where
    R: UserRepository,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let mut created = Vec::new();

    for (name, email, password, role) in DEMO_USERS {
        if dispatcher.users().find_by_email(email).map_err(DispatchError::from)?.is_some() {
            continue;
        }
        let role_ids = master
            .roles()
            .find_by_name(role)
            .map_err(MasterDataError::from)?
            .map(|r| vec![r.id])
            .unwrap_or_default();

        let now = Utc::now();
        let user_id = UserId::new();
        let out = dispatcher.dispatch(
            user_id,
            UserCommand::Create(CreateUser {
                user_id,
                name: name.to_string(),
                email: email.to_string(),
                password_hash: hash_password(password)?,
                email_verified_at: Some(now),
                is_active: true,
                role_ids,
                occurred_at: now,
            }),
        )?;
        tracing::info!(user_id = %user_id, email = %email, role = %role, "demo user seeded");
        created.push(out.user);
    }

    Ok(created)
}

/// Seed the catalogue and, when `with_demo_users`, the demo accounts.
pub fn seed<R, B>(
    master: &MasterDataService,
    dispatcher: &UserCommandDispatcher<R, B>,
    with_demo_users: bool,
) -> Result<SeedReport, SeedError>
where
    R: UserRepository,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let mut report = seed_roles_and_permissions(master)?;
    if with_demo_users {
        report.users_created = seed_demo_users(master, dispatcher)?.len();
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pktracker_events::InMemoryEventBus;

    use super::*;
    use crate::repository::{InMemoryPermissionRepository, InMemoryRoleRepository, InMemoryUserRepository};

    fn setup() -> (
        MasterDataService,
        UserCommandDispatcher<Arc<InMemoryUserRepository>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>,
    ) {
        let users = Arc::new(InMemoryUserRepository::new());
        let master = MasterDataService::new(
            Arc::new(InMemoryRoleRepository::new()),
            Arc::new(InMemoryPermissionRepository::new()),
            users.clone(),
        );
        (master, UserCommandDispatcher::new(users, Arc::new(InMemoryEventBus::new())))
    }

    #[test]
    fn seeding_twice_creates_nothing_new() {
        let (master, dispatcher) = setup();
        let first = seed(&master, &dispatcher, false).unwrap();
        assert_eq!(first.permissions_created, CATALOGUE.len());
        assert_eq!(first.roles_created, BUILTIN_ROLES.len());

        let second = seed(&master, &dispatcher, false).unwrap();
        assert_eq!(second, SeedReport::default());
    }

    #[test]
    fn builtin_roles_get_their_grants() {
        let (master, dispatcher) = setup();
        seed(&master, &dispatcher, false).unwrap();

        assert_eq!(master.role_permission_names(roles::SUPER_ADMIN).len(), CATALOGUE.len());
        assert_eq!(master.role_permission_names(roles::USER), vec!["access-api"]);
        assert!(master.role_permission_names(roles::MODERATOR).contains(&"edit-users".to_string()));
    }

    #[test]
    fn demo_users_hold_their_role() {
        let (master, dispatcher) = setup();
        let report = seed(&master, &dispatcher, true).unwrap();
        assert_eq!(report.users_created, DEMO_USERS.len());

        let admin = dispatcher.users().find_by_email("admin@admin.com").unwrap().unwrap();
        assert!(admin.is_verified());
        let principal = master.principal_for(&admin).unwrap();
        assert!(principal.has_role(roles::ADMIN));
        assert!(principal.has_permission("create-users"));
        assert!(!principal.has_permission("delete-users"));

        assert_eq!(seed_demo_users(&master, &dispatcher).unwrap().len(), 0);
    }
}
