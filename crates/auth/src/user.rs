//! User account aggregate.
//!
//! State is stored (not replayed): repositories keep the latest `User` and the
//! dispatcher runs `handle` + `apply` for each command. Events still carry the
//! full change so listeners can audit it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pktracker_core::{Aggregate, AggregateRoot, DomainError, PermissionId, RoleId, UserId};
use pktracker_events::Event;

// ─────────────────────────────────────────────────────────────────────────────
// User Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// User account.
///
/// # Invariants
/// - `email` is trimmed and lower-cased.
/// - A soft-deleted user (`deleted_at` set) only accepts `Restore` and `ForceDelete`.
/// - Nobody deactivates or deletes their own account.
/// - Role and permission lists hold no duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub login_count: u64,
    pub two_factor_enabled: bool,
    pub role_ids: Vec<RoleId>,
    pub permission_ids: Vec<PermissionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub created: bool,
}

impl User {
    /// A not-yet-created user; only `Create` is accepted.
    pub fn empty(id: UserId) -> Self {
        let epoch = DateTime::<Utc>::default();
        Self {
            id,
            name: String::new(),
            email: String::new(),
            password_hash: String::new(),
            email_verified_at: None,
            is_active: true,
            last_login_at: None,
            last_login_ip: None,
            login_count: 0,
            two_factor_enabled: false,
            role_ids: Vec::new(),
            permission_ids: Vec::new(),
            created_at: epoch,
            updated_at: epoch,
            deleted_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }

    pub fn has_role(&self, role: RoleId) -> bool {
        self.role_ids.contains(&role)
    }

    pub fn has_direct_permission(&self, permission: PermissionId) -> bool {
        self.permission_ids.contains(&permission)
    }

    /// Up to two upper-cased initials from the name ("Jane Doe" → "JD").
    pub fn initials(&self) -> String {
        self.name
            .split_whitespace()
            .filter_map(|w| w.chars().next())
            .take(2)
            .flat_map(char::to_uppercase)
            .collect()
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created || self.is_trashed() {
            return Err(DomainError::not_found("User"));
        }
        Ok(())
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Normalise an email address the way it is stored.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), DomainError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(DomainError::validation("email", "invalid email format")),
    }
}

fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("name", "name cannot be empty"));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Create a new account. The password must already be hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateUser {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub role_ids: Vec<RoleId>,
    pub occurred_at: DateTime<Utc>,
}

/// Partial profile update; `None` fields are left alone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetActive {
    pub active: bool,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteUser {
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreUser {
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForceDeleteUser {
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Role membership change; used for assign, remove and sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRoles {
    pub role_ids: Vec<RoleId>,
    pub occurred_at: DateTime<Utc>,
}

/// Direct permission change; used for grant and revoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangePermissions {
    pub permission_ids: Vec<PermissionId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLogin {
    pub ip: String,
    pub occurred_at: DateTime<Utc>,
}

/// All user commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Create(CreateUser),
    UpdateProfile(UpdateProfile),
    SetActive(SetActive),
    Delete(DeleteUser),
    Restore(RestoreUser),
    ForceDelete(ForceDeleteUser),
    AssignRoles(ChangeRoles),
    RemoveRoles(ChangeRoles),
    SyncRoles(ChangeRoles),
    GrantPermissions(ChangePermissions),
    RevokePermissions(ChangePermissions),
    RecordLogin(RecordLogin),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────
//
// Password hashes are never serialized, so envelopes on the bus are safe to log.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub role_ids: Vec<RoleId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdated {
    pub user_id: UserId,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(skip)]
    pub password_hash: Option<String>,
    pub changed_fields: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Activation, deactivation, deletion, restore and purge all share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatusChanged {
    pub user_id: UserId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolesChanged {
    pub user_id: UserId,
    pub role_ids: Vec<RoleId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsChanged {
    pub user_id: UserId,
    pub permission_ids: Vec<PermissionId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedIn {
    pub user_id: UserId,
    pub ip: String,
    pub occurred_at: DateTime<Utc>,
}

/// All user events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum UserEvent {
    Created(UserCreated),
    ProfileUpdated(ProfileUpdated),
    Activated(UserStatusChanged),
    Deactivated(UserStatusChanged),
    Deleted(UserStatusChanged),
    Restored(UserStatusChanged),
    Purged(UserStatusChanged),
    /// Only the newly added roles.
    RolesAssigned(RolesChanged),
    /// Only the roles actually removed.
    RolesRemoved(RolesChanged),
    /// The complete new role set.
    RolesSynced(RolesChanged),
    PermissionsGranted(PermissionsChanged),
    PermissionsRevoked(PermissionsChanged),
    LoggedIn(LoggedIn),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => "auth.user.created",
            UserEvent::ProfileUpdated(_) => "auth.user.profile_updated",
            UserEvent::Activated(_) => "auth.user.activated",
            UserEvent::Deactivated(_) => "auth.user.deactivated",
            UserEvent::Deleted(_) => "auth.user.deleted",
            UserEvent::Restored(_) => "auth.user.restored",
            UserEvent::Purged(_) => "auth.user.purged",
            UserEvent::RolesAssigned(_) => "auth.user.roles_assigned",
            UserEvent::RolesRemoved(_) => "auth.user.roles_removed",
            UserEvent::RolesSynced(_) => "auth.user.roles_synced",
            UserEvent::PermissionsGranted(_) => "auth.user.permissions_granted",
            UserEvent::PermissionsRevoked(_) => "auth.user.permissions_revoked",
            UserEvent::LoggedIn(_) => "auth.user.logged_in",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Created(e) => e.occurred_at,
            UserEvent::ProfileUpdated(e) => e.occurred_at,
            UserEvent::Activated(e)
            | UserEvent::Deactivated(e)
            | UserEvent::Deleted(e)
            | UserEvent::Restored(e)
            | UserEvent::Purged(e) => e.occurred_at,
            UserEvent::RolesAssigned(e) | UserEvent::RolesRemoved(e) | UserEvent::RolesSynced(e) => {
                e.occurred_at
            }
            UserEvent::PermissionsGranted(e) | UserEvent::PermissionsRevoked(e) => e.occurred_at,
            UserEvent::LoggedIn(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Created(e) => self.apply_created(e),
            UserEvent::ProfileUpdated(e) => self.apply_profile_updated(e),
            UserEvent::Activated(_) => self.is_active = true,
            UserEvent::Deactivated(_) => self.is_active = false,
            UserEvent::Deleted(e) => self.deleted_at = Some(e.occurred_at),
            UserEvent::Restored(_) => self.deleted_at = None,
            UserEvent::Purged(_) => self.created = false,
            UserEvent::RolesAssigned(e) => self.role_ids.extend(e.role_ids.iter().copied()),
            UserEvent::RolesRemoved(e) => self.role_ids.retain(|r| !e.role_ids.contains(r)),
            UserEvent::RolesSynced(e) => self.role_ids = e.role_ids.clone(),
            UserEvent::PermissionsGranted(e) => {
                self.permission_ids.extend(e.permission_ids.iter().copied())
            }
            UserEvent::PermissionsRevoked(e) => {
                self.permission_ids.retain(|p| !e.permission_ids.contains(p))
            }
            UserEvent::LoggedIn(e) => {
                self.last_login_at = Some(e.occurred_at);
                self.last_login_ip = Some(e.ip.clone());
                self.login_count += 1;
            }
        }

        // Login bookkeeping does not count as an account modification.
        if !matches!(event, UserEvent::LoggedIn(_)) {
            self.updated_at = event.occurred_at();
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Create(cmd) => self.handle_create(cmd),
            UserCommand::UpdateProfile(cmd) => self.handle_update_profile(cmd),
            UserCommand::SetActive(cmd) => self.handle_set_active(cmd),
            UserCommand::Delete(cmd) => self.handle_delete(cmd),
            UserCommand::Restore(cmd) => self.handle_restore(cmd),
            UserCommand::ForceDelete(cmd) => self.handle_force_delete(cmd),
            UserCommand::AssignRoles(cmd) => self.handle_assign_roles(cmd),
            UserCommand::RemoveRoles(cmd) => self.handle_remove_roles(cmd),
            UserCommand::SyncRoles(cmd) => self.handle_sync_roles(cmd),
            UserCommand::GrantPermissions(cmd) => self.handle_grant_permissions(cmd),
            UserCommand::RevokePermissions(cmd) => self.handle_revoke_permissions(cmd),
            UserCommand::RecordLogin(cmd) => self.handle_record_login(cmd),
        }
    }
}

impl User {
    // ─────────────────────────────────────────────────────────────────────────
    // Command Handlers
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_create(&self, cmd: &CreateUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::invariant("user already exists"));
        }

        let email = normalize_email(&cmd.email);
        validate_email(&email)?;
        validate_name(&cmd.name)?;

        if cmd.password_hash.is_empty() {
            return Err(DomainError::validation("password", "password hash is required"));
        }

        Ok(vec![UserEvent::Created(UserCreated {
            user_id: cmd.user_id,
            name: cmd.name.trim().to_string(),
            email,
            password_hash: cmd.password_hash.clone(),
            email_verified_at: cmd.email_verified_at,
            is_active: cmd.is_active,
            role_ids: dedup(&cmd.role_ids),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_profile(&self, cmd: &UpdateProfile) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live()?;

        let mut changed_fields = Vec::new();

        let name = match &cmd.name {
            Some(name) => {
                validate_name(name)?;
                let name = name.trim().to_string();
                (name != self.name).then_some(name)
            }
            None => None,
        };
        if name.is_some() {
            changed_fields.push("name".to_string());
        }

        let email = match &cmd.email {
            Some(email) => {
                let email = normalize_email(email);
                validate_email(&email)?;
                (email != self.email).then_some(email)
            }
            None => None,
        };
        if email.is_some() {
            changed_fields.push("email".to_string());
        }

        if cmd.password_hash.is_some() {
            changed_fields.push("password".to_string());
        }

        if changed_fields.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![UserEvent::ProfileUpdated(ProfileUpdated {
            user_id: self.id,
            name,
            email,
            password_hash: cmd.password_hash.clone(),
            changed_fields,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_active(&self, cmd: &SetActive) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live()?;

        if cmd.actor == self.id {
            return Err(DomainError::invariant("You cannot deactivate your own account"));
        }
        if cmd.active == self.is_active {
            return Ok(vec![]);
        }

        let e = UserStatusChanged {
            user_id: self.id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        };
        Ok(vec![if cmd.active {
            UserEvent::Activated(e)
        } else {
            UserEvent::Deactivated(e)
        }])
    }

    fn handle_delete(&self, cmd: &DeleteUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live()?;

        if cmd.actor == self.id {
            return Err(DomainError::invariant("You cannot delete your own account"));
        }

        Ok(vec![UserEvent::Deleted(UserStatusChanged {
            user_id: self.id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restore(&self, cmd: &RestoreUser) -> Result<Vec<UserEvent>, DomainError> {
        if !self.created || !self.is_trashed() {
            return Err(DomainError::not_found("User"));
        }

        Ok(vec![UserEvent::Restored(UserStatusChanged {
            user_id: self.id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_force_delete(&self, cmd: &ForceDeleteUser) -> Result<Vec<UserEvent>, DomainError> {
        if !self.created || !self.is_trashed() {
            return Err(DomainError::not_found("User"));
        }

        Ok(vec![UserEvent::Purged(UserStatusChanged {
            user_id: self.id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign_roles(&self, cmd: &ChangeRoles) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live()?;

        let added: Vec<RoleId> = dedup(&cmd.role_ids)
            .into_iter()
            .filter(|r| !self.role_ids.contains(r))
            .collect();
        if added.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![UserEvent::RolesAssigned(RolesChanged {
            user_id: self.id,
            role_ids: added,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_roles(&self, cmd: &ChangeRoles) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live()?;

        let removed: Vec<RoleId> = dedup(&cmd.role_ids)
            .into_iter()
            .filter(|r| self.role_ids.contains(r))
            .collect();
        if removed.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![UserEvent::RolesRemoved(RolesChanged {
            user_id: self.id,
            role_ids: removed,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_sync_roles(&self, cmd: &ChangeRoles) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live()?;

        let target = dedup(&cmd.role_ids);
        let same = target.len() == self.role_ids.len() && target.iter().all(|r| self.role_ids.contains(r));
        if same {
            return Ok(vec![]);
        }

        Ok(vec![UserEvent::RolesSynced(RolesChanged {
            user_id: self.id,
            role_ids: target,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_grant_permissions(&self, cmd: &ChangePermissions) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live()?;

        let granted: Vec<PermissionId> = dedup(&cmd.permission_ids)
            .into_iter()
            .filter(|p| !self.permission_ids.contains(p))
            .collect();
        if granted.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![UserEvent::PermissionsGranted(PermissionsChanged {
            user_id: self.id,
            permission_ids: granted,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revoke_permissions(&self, cmd: &ChangePermissions) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live()?;

        let revoked: Vec<PermissionId> = dedup(&cmd.permission_ids)
            .into_iter()
            .filter(|p| self.permission_ids.contains(p))
            .collect();
        if revoked.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![UserEvent::PermissionsRevoked(PermissionsChanged {
            user_id: self.id,
            permission_ids: revoked,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_login(&self, cmd: &RecordLogin) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live()?;

        Ok(vec![UserEvent::LoggedIn(LoggedIn {
            user_id: self.id,
            ip: cmd.ip.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event Appliers
    // ─────────────────────────────────────────────────────────────────────────

    fn apply_created(&mut self, e: &UserCreated) {
        self.id = e.user_id;
        self.name = e.name.clone();
        self.email = e.email.clone();
        self.password_hash = e.password_hash.clone();
        self.email_verified_at = e.email_verified_at;
        self.is_active = e.is_active;
        self.role_ids = e.role_ids.clone();
        self.created_at = e.occurred_at;
        self.created = true;
    }

    fn apply_profile_updated(&mut self, e: &ProfileUpdated) {
        if let Some(name) = &e.name {
            self.name = name.clone();
        }
        if let Some(email) = &e.email {
            self.email = email.clone();
        }
        if let Some(hash) = &e.password_hash {
            self.password_hash = hash.clone();
        }
    }
}

/// Order-preserving de-duplication.
fn dedup<T: Copy + PartialEq>(items: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(item) {
            out.push(*item);
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pktracker_events::execute;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_user(role_ids: Vec<RoleId>) -> User {
        let user_id = UserId::new();
        let mut user = User::empty(user_id);
        execute(
            &mut user,
            &UserCommand::Create(CreateUser {
                user_id,
                name: "  Jane Doe ".to_string(),
                email: " Jane@Example.COM ".to_string(),
                password_hash: "$argon2id$stub".to_string(),
                email_verified_at: None,
                is_active: true,
                role_ids,
                occurred_at: now(),
            }),
        )
        .unwrap();
        user
    }

    #[test]
    fn create_normalizes_name_and_email() {
        let user = created_user(vec![]);
        assert!(user.created);
        assert_eq!(user.name, "Jane Doe");
        assert_eq!(user.email, "jane@example.com");
        assert_eq!(user.initials(), "JD");
        assert_eq!(user.version, 1);
    }

    #[test]
    fn create_rejects_bad_input() {
        let user = User::empty(UserId::new());
        let cmd = |name: &str, email: &str| {
            UserCommand::Create(CreateUser {
                user_id: user.id,
                name: name.to_string(),
                email: email.to_string(),
                password_hash: "h".to_string(),
                email_verified_at: None,
                is_active: true,
                role_ids: vec![],
                occurred_at: now(),
            })
        };

        assert!(matches!(user.handle(&cmd("Jane", "no-at-sign")), Err(DomainError::Validation { .. })));
        assert!(matches!(user.handle(&cmd("   ", "a@b.c")), Err(DomainError::Validation { .. })));
    }

    #[test]
    fn create_twice_is_an_invariant_violation() {
        let user = created_user(vec![]);
        let again = UserCommand::Create(CreateUser {
            user_id: user.id,
            name: "X".to_string(),
            email: "x@y.z".to_string(),
            password_hash: "h".to_string(),
            email_verified_at: None,
            is_active: true,
            role_ids: vec![],
            occurred_at: now(),
        });
        assert!(matches!(user.handle(&again), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn profile_update_reports_changed_fields_only() {
        let mut user = created_user(vec![]);

        let events = execute(
            &mut user,
            &UserCommand::UpdateProfile(UpdateProfile {
                name: Some("Jane Doe".to_string()),
                email: Some("NEW@example.com".to_string()),
                password_hash: None,
                occurred_at: now(),
            }),
        )
        .unwrap();

        let UserEvent::ProfileUpdated(e) = &events[0] else {
            panic!("expected ProfileUpdated");
        };
        assert_eq!(e.changed_fields, vec!["email"]);
        assert_eq!(user.email, "new@example.com");
    }

    #[test]
    fn noop_profile_update_emits_nothing() {
        let user = created_user(vec![]);
        let events = user
            .handle(&UserCommand::UpdateProfile(UpdateProfile {
                name: Some(user.name.clone()),
                occurred_at: now(),
                ..Default::default()
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn password_hash_is_not_serialized() {
        let user = created_user(vec![]);
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());

        let ev = UserEvent::ProfileUpdated(ProfileUpdated {
            user_id: user.id,
            name: None,
            email: None,
            password_hash: Some("secret-hash".to_string()),
            changed_fields: vec!["password".to_string()],
            occurred_at: now(),
        });
        assert!(!serde_json::to_string(&ev).unwrap().contains("secret-hash"));
    }

    #[test]
    fn cannot_deactivate_or_delete_self() {
        let user = created_user(vec![]);

        let deactivate = UserCommand::SetActive(SetActive {
            active: false,
            actor: user.id,
            occurred_at: now(),
        });
        assert!(matches!(user.handle(&deactivate), Err(DomainError::InvariantViolation(_))));

        let delete = UserCommand::Delete(DeleteUser {
            actor: user.id,
            occurred_at: now(),
        });
        assert!(matches!(user.handle(&delete), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn toggle_status_by_another_user() {
        let mut user = created_user(vec![]);
        let admin = UserId::new();

        let events = execute(
            &mut user,
            &UserCommand::SetActive(SetActive {
                active: false,
                actor: admin,
                occurred_at: now(),
            }),
        )
        .unwrap();
        assert!(matches!(events[0], UserEvent::Deactivated(_)));
        assert!(!user.is_active);

        // Already inactive: nothing to do.
        let events = user
            .handle(&UserCommand::SetActive(SetActive {
                active: false,
                actor: admin,
                occurred_at: now(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn soft_delete_restore_and_purge() {
        let mut user = created_user(vec![]);
        let admin = UserId::new();

        // Purge requires a prior soft delete.
        let purge = UserCommand::ForceDelete(ForceDeleteUser {
            actor: admin,
            occurred_at: now(),
        });
        assert_eq!(user.handle(&purge), Err(DomainError::not_found("User")));

        execute(
            &mut user,
            &UserCommand::Delete(DeleteUser {
                actor: admin,
                occurred_at: now(),
            }),
        )
        .unwrap();
        assert!(user.is_trashed());

        // Trashed users reject ordinary mutations.
        let login = UserCommand::RecordLogin(RecordLogin {
            ip: "127.0.0.1".to_string(),
            occurred_at: now(),
        });
        assert_eq!(user.handle(&login), Err(DomainError::not_found("User")));

        execute(
            &mut user,
            &UserCommand::Restore(RestoreUser {
                actor: admin,
                occurred_at: now(),
            }),
        )
        .unwrap();
        assert!(!user.is_trashed());

        // Restoring a live user is not found (nothing trashed to restore).
        let restore = UserCommand::Restore(RestoreUser {
            actor: admin,
            occurred_at: now(),
        });
        assert_eq!(user.handle(&restore), Err(DomainError::not_found("User")));

        execute(
            &mut user,
            &UserCommand::Delete(DeleteUser {
                actor: admin,
                occurred_at: now(),
            }),
        )
        .unwrap();
        let events = execute(&mut user, &purge).unwrap();
        assert!(matches!(events[0], UserEvent::Purged(_)));
        assert!(!user.created);
    }

    #[test]
    fn role_changes_are_idempotent() {
        let user_role = RoleId::new();
        let admin_role = RoleId::new();
        let mut user = created_user(vec![user_role]);

        let events = execute(
            &mut user,
            &UserCommand::AssignRoles(ChangeRoles {
                role_ids: vec![user_role, admin_role, admin_role],
                occurred_at: now(),
            }),
        )
        .unwrap();
        let UserEvent::RolesAssigned(e) = &events[0] else {
            panic!("expected RolesAssigned");
        };
        assert_eq!(e.role_ids, vec![admin_role]);
        assert_eq!(user.role_ids, vec![user_role, admin_role]);

        let again = user
            .handle(&UserCommand::AssignRoles(ChangeRoles {
                role_ids: vec![admin_role],
                occurred_at: now(),
            }))
            .unwrap();
        assert!(again.is_empty());

        execute(
            &mut user,
            &UserCommand::RemoveRoles(ChangeRoles {
                role_ids: vec![user_role, RoleId::new()],
                occurred_at: now(),
            }),
        )
        .unwrap();
        assert_eq!(user.role_ids, vec![admin_role]);

        execute(
            &mut user,
            &UserCommand::SyncRoles(ChangeRoles {
                role_ids: vec![user_role],
                occurred_at: now(),
            }),
        )
        .unwrap();
        assert_eq!(user.role_ids, vec![user_role]);
    }

    #[test]
    fn direct_permissions_grant_and_revoke() {
        let perm = PermissionId::new();
        let mut user = created_user(vec![]);

        execute(
            &mut user,
            &UserCommand::GrantPermissions(ChangePermissions {
                permission_ids: vec![perm],
                occurred_at: now(),
            }),
        )
        .unwrap();
        assert!(user.has_direct_permission(perm));

        let events = execute(
            &mut user,
            &UserCommand::RevokePermissions(ChangePermissions {
                permission_ids: vec![perm, perm],
                occurred_at: now(),
            }),
        )
        .unwrap();
        assert_eq!(events.len(), 1);
        assert!(user.permission_ids.is_empty());
    }

    #[test]
    fn login_updates_bookkeeping() {
        let mut user = created_user(vec![]);
        let updated_at = user.updated_at;

        for _ in 0..2 {
            execute(
                &mut user,
                &UserCommand::RecordLogin(RecordLogin {
                    ip: "10.0.0.7".to_string(),
                    occurred_at: now(),
                }),
            )
            .unwrap();
        }

        assert_eq!(user.login_count, 2);
        assert_eq!(user.last_login_ip.as_deref(), Some("10.0.0.7"));
        assert!(user.last_login_at.is_some());
        assert_eq!(user.updated_at, updated_at);
    }

    #[test]
    fn events_have_stable_names() {
        let user = created_user(vec![]);
        let ev = UserEvent::Deleted(UserStatusChanged {
            user_id: user.id,
            actor: UserId::new(),
            occurred_at: now(),
        });
        assert_eq!(ev.event_type(), "auth.user.deleted");
        assert_eq!(ev.version(), 1);
    }
}
