use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};

use pktracker_auth::AccessToken;
use pktracker_core::{TokenId, UserId};

use super::RepositoryError;

/// Issued access tokens, keyed by `jti`.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    inner: RwLock<HashMap<TokenId, AccessToken>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a new token for `user_id`.
    ///
    /// The user's revoked and expired tokens are dropped first, so a user
    /// never holds more records than live tokens plus the new one.
    pub fn issue(
        &self,
        user_id: UserId,
        name: &str,
        now: DateTime<Utc>,
        lifetime: Duration,
    ) -> Result<AccessToken, RepositoryError> {
        let token = AccessToken::issue(user_id, name, now, lifetime);
        let mut map = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        map.retain(|_, t| t.user_id != user_id || t.is_usable(now));
        map.insert(token.id, token.clone());
        Ok(token)
    }

    /// Drop every revoked or expired token; returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let mut map = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        let before = map.len();
        map.retain(|_, t| t.is_usable(now));
        Ok(before - map.len())
    }

    /// Stored records, usable or not.
    pub fn len(&self) -> Result<usize, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(map.len())
    }

    pub fn is_empty(&self) -> Result<bool, RepositoryError> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, id: TokenId) -> Result<Option<AccessToken>, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(map.get(&id).cloned())
    }

    /// Record use of a token.
    pub fn touch(&self, id: TokenId, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut map = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        let token = map.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        token.last_used_at = Some(now);
        Ok(())
    }

    /// Returns whether the token was live before the call.
    pub fn revoke(&self, id: TokenId) -> Result<bool, RepositoryError> {
        let mut map = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        let token = map.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        let was_live = !token.revoked;
        token.revoked = true;
        Ok(was_live)
    }

    /// Revoke every live token of a user; returns how many were revoked.
    pub fn revoke_all_for_user(&self, user_id: UserId) -> Result<usize, RepositoryError> {
        let mut map = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        let mut count = 0;
        for token in map.values_mut().filter(|t| t.user_id == user_id && !t.revoked) {
            token.revoked = true;
            count += 1;
        }
        Ok(count)
    }

    /// Usable tokens of a user, oldest first.
    pub fn active_for_user(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Vec<AccessToken>, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        let mut tokens: Vec<AccessToken> = map
            .values()
            .filter(|t| t.user_id == user_id && t.is_usable(now))
            .cloned()
            .collect();
        tokens.sort_by_key(|t| (t.created_at, t.id));
        Ok(tokens)
    }

    /// Drop every token of a user (account purge).
    pub fn purge_for_user(&self, user_id: UserId) -> Result<usize, RepositoryError> {
        let mut map = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        let before = map.len();
        map.retain(|_, t| t.user_id != user_id);
        Ok(before - map.len())
    }

    /// Revoke the oldest usable tokens so that at most `max` remain.
    pub fn prune_excess(&self, user_id: UserId, max: usize, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let active = self.active_for_user(user_id, now)?;
        if active.len() <= max {
            return Ok(0);
        }

        let excess = active.len() - max;
        let mut map = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        for token in active.iter().take(excess) {
            if let Some(stored) = map.get_mut(&token.id) {
                stored.revoked = true;
            }
        }
        Ok(excess)
    }
}
