use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

use pktracker_core::PermissionId;

use super::{RepositoryError, matches_search};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionRecord {
    pub id: PermissionId,
    pub name: String,
    pub guard_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Permission storage. Names are unique.
#[derive(Debug, Default)]
pub struct InMemoryPermissionRepository {
    inner: RwLock<HashMap<PermissionId, PermissionRecord>>,
}

impl InMemoryPermissionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: PermissionRecord) -> Result<(), RepositoryError> {
        let mut map = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        if map.values().any(|p| p.name == record.name) {
            return Err(RepositoryError::Conflict(format!(
                "permission '{}' already exists",
                record.name
            )));
        }
        map.insert(record.id, record);
        Ok(())
    }

    pub fn update(&self, record: PermissionRecord) -> Result<(), RepositoryError> {
        let mut map = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        if !map.contains_key(&record.id) {
            return Err(RepositoryError::NotFound);
        }
        if map.values().any(|p| p.id != record.id && p.name == record.name) {
            return Err(RepositoryError::Conflict(format!(
                "permission '{}' already exists",
                record.name
            )));
        }
        map.insert(record.id, record);
        Ok(())
    }

    pub fn remove(&self, id: PermissionId) -> Result<PermissionRecord, RepositoryError> {
        let mut map = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        map.remove(&id).ok_or(RepositoryError::NotFound)
    }

    pub fn get(&self, id: PermissionId) -> Result<Option<PermissionRecord>, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(map.get(&id).cloned())
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<PermissionRecord>, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(map.values().find(|p| p.name == name).cloned())
    }

    /// Resolve names to records; `Err(missing)` lists every unknown name.
    pub fn find_by_names(
        &self,
        names: &[String],
    ) -> Result<Result<Vec<PermissionRecord>, Vec<String>>, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        let mut found = Vec::with_capacity(names.len());
        let mut missing = Vec::new();

        for name in names {
            match map.values().find(|p| &p.name == name) {
                Some(p) => found.push(p.clone()),
                None => missing.push(name.clone()),
            }
        }

        Ok(if missing.is_empty() { Ok(found) } else { Err(missing) })
    }

    /// Names for the given ids; unknown ids are skipped.
    pub fn names_of(&self, ids: &[PermissionId]) -> Result<Vec<String>, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        let mut names: Vec<String> = ids.iter().filter_map(|id| map.get(id)).map(|p| p.name.clone()).collect();
        names.sort();
        Ok(names)
    }

    /// Filtered by search/guard, sorted by name.
    pub fn list(
        &self,
        search: Option<&str>,
        guard_name: Option<&str>,
    ) -> Result<Vec<PermissionRecord>, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        let mut out: Vec<PermissionRecord> = map
            .values()
            .filter(|p| matches_search(&[p.name.as_str()], search))
            .filter(|p| guard_name.is_none_or(|g| p.guard_name == g))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    pub fn count(&self) -> Result<u64, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(map.len() as u64)
    }
}
