use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use pktracker_auth::User;
use pktracker_core::{Page, PageRequest, PermissionId, RoleId, UserId};

use super::{RepositoryError, matches_search};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    Active,
    Inactive,
    #[default]
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Name,
    Email,
    #[default]
    CreatedAt,
    UpdatedAt,
    LastLoginAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Listing filter. Trashed users are never listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    /// Matched case-insensitively against name and email.
    pub search: Option<String>,
    pub status: StatusFilter,
    pub role: Option<RoleId>,
    pub verified: Option<bool>,
    pub created_from: Option<NaiveDate>,
    pub created_to: Option<NaiveDate>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl UserFilter {
    fn matches(&self, user: &User) -> bool {
        if user.is_trashed() {
            return false;
        }
        if !matches_search(&[user.name.as_str(), user.email.as_str()], self.search.as_deref()) {
            return false;
        }
        match self.status {
            StatusFilter::Active if !user.is_active => return false,
            StatusFilter::Inactive if user.is_active => return false,
            _ => {}
        }
        if let Some(role) = self.role {
            if !user.has_role(role) {
                return false;
            }
        }
        if let Some(verified) = self.verified {
            if user.is_verified() != verified {
                return false;
            }
        }
        let created = user.created_at.date_naive();
        if self.created_from.is_some_and(|from| created < from) {
            return false;
        }
        if self.created_to.is_some_and(|to| created > to) {
            return false;
        }
        true
    }

    fn compare(&self, a: &User, b: &User) -> Ordering {
        let ord = match self.sort_by {
            SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortField::Email => a.email.cmp(&b.email),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortField::LastLoginAt => a.last_login_at.cmp(&b.last_login_at),
        };
        let ord = ord.then_with(|| a.id.cmp(&b.id));
        match self.sort_order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    }
}

/// Account counters for dashboards. Trashed users are excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UserStatistics {
    pub total_users: u64,
    pub active_users: u64,
    pub inactive_users: u64,
    pub verified_users: u64,
    pub unverified_users: u64,
    pub users_registered_today: u64,
    pub users_registered_this_week: u64,
    pub users_registered_this_month: u64,
}

/// Storage for user accounts, including soft-deleted ones.
pub trait UserRepository: Send + Sync {
    /// Insert a new account. Emails are unique across live and trashed users.
    fn insert(&self, user: User) -> Result<(), RepositoryError>;

    /// Replace a stored account, refusing if it changed since `expected_version`.
    fn save(&self, user: User, expected_version: u64) -> Result<(), RepositoryError>;

    /// Permanently remove an account.
    fn remove(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    fn get_with_trashed(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Every stored account, trashed ones included.
    fn all(&self) -> Result<Vec<User>, RepositoryError>;

    fn get(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.get_with_trashed(id)?.filter(|u| !u.is_trashed()))
    }

    fn get_trashed(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.get_with_trashed(id)?.filter(User::is_trashed))
    }

    fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let email = pktracker_auth::user::normalize_email(email);
        Ok(self.all()?.into_iter().find(|u| u.email == email))
    }

    fn list(&self, filter: &UserFilter, page: PageRequest) -> Result<Page<User>, RepositoryError> {
        let mut users: Vec<User> = self.all()?.into_iter().filter(|u| filter.matches(u)).collect();
        users.sort_by(|a, b| filter.compare(a, b));
        Ok(Page::paginate(users, page))
    }

    /// Accounts (trashed included) holding `role`.
    fn count_with_role(&self, role: RoleId) -> Result<u64, RepositoryError> {
        Ok(self.all()?.iter().filter(|u| u.has_role(role)).count() as u64)
    }

    /// Accounts (trashed included) holding `permission` as a direct grant.
    fn count_with_permission(&self, permission: PermissionId) -> Result<u64, RepositoryError> {
        Ok(self
            .all()?
            .iter()
            .filter(|u| u.has_direct_permission(permission))
            .count() as u64)
    }

    fn statistics(&self, now: DateTime<Utc>) -> Result<UserStatistics, RepositoryError> {
        let mut stats = UserStatistics::default();
        let today = now.date_naive();

        for user in self.all()?.iter().filter(|u| !u.is_trashed()) {
            stats.total_users += 1;
            if user.is_active {
                stats.active_users += 1;
            } else {
                stats.inactive_users += 1;
            }
            if user.is_verified() {
                stats.verified_users += 1;
            } else {
                stats.unverified_users += 1;
            }

            let created = user.created_at.date_naive();
            if created == today {
                stats.users_registered_today += 1;
            }
            if created.iso_week() == today.iso_week() {
                stats.users_registered_this_week += 1;
            }
            if created.year() == today.year() && created.month() == today.month() {
                stats.users_registered_this_month += 1;
            }
        }

        Ok(stats)
    }
}

impl<R> UserRepository for Arc<R>
where
    R: UserRepository + ?Sized,
{
    fn insert(&self, user: User) -> Result<(), RepositoryError> {
        (**self).insert(user)
    }

    fn save(&self, user: User, expected_version: u64) -> Result<(), RepositoryError> {
        (**self).save(user, expected_version)
    }

    fn remove(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        (**self).remove(id)
    }

    fn get_with_trashed(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        (**self).get_with_trashed(id)
    }

    fn all(&self) -> Result<Vec<User>, RepositoryError> {
        (**self).all()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    inner: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn email_taken(map: &HashMap<UserId, User>, email: &str, except: UserId) -> bool {
    map.values().any(|u| u.id != except && u.email == email)
}

impl UserRepository for InMemoryUserRepository {
    fn insert(&self, user: User) -> Result<(), RepositoryError> {
        let mut map = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;

        if map.contains_key(&user.id) {
            return Err(RepositoryError::Conflict(format!("user {} already exists", user.id)));
        }
        if email_taken(&map, &user.email, user.id) {
            return Err(RepositoryError::Conflict("The email has already been taken.".to_string()));
        }

        map.insert(user.id, user);
        Ok(())
    }

    fn save(&self, user: User, expected_version: u64) -> Result<(), RepositoryError> {
        let mut map = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;

        let stored = map.get(&user.id).ok_or(RepositoryError::NotFound)?;
        if stored.version != expected_version {
            return Err(RepositoryError::Conflict(format!(
                "user {} was modified concurrently (expected version {}, found {})",
                user.id, expected_version, stored.version
            )));
        }
        if email_taken(&map, &user.email, user.id) {
            return Err(RepositoryError::Conflict("The email has already been taken.".to_string()));
        }

        map.insert(user.id, user);
        Ok(())
    }

    fn remove(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let mut map = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        Ok(map.remove(&id))
    }

    fn get_with_trashed(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(map.get(&id).cloned())
    }

    fn all(&self) -> Result<Vec<User>, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(map.values().cloned().collect())
    }
}
