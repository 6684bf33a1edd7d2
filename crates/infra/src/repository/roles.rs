use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

use pktracker_core::{PermissionId, RoleId};

use super::{RepositoryError, matches_search};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleRecord {
    pub id: RoleId,
    pub name: String,
    pub guard_name: String,
    pub permission_ids: Vec<PermissionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role storage. Names are unique.
#[derive(Debug, Default)]
pub struct InMemoryRoleRepository {
    inner: RwLock<HashMap<RoleId, RoleRecord>>,
}

impl InMemoryRoleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: RoleRecord) -> Result<(), RepositoryError> {
        let mut map = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        if map.values().any(|r| r.name == record.name) {
            return Err(RepositoryError::Conflict(format!("role '{}' already exists", record.name)));
        }
        map.insert(record.id, record);
        Ok(())
    }

    pub fn update(&self, record: RoleRecord) -> Result<(), RepositoryError> {
        let mut map = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        if !map.contains_key(&record.id) {
            return Err(RepositoryError::NotFound);
        }
        if map.values().any(|r| r.id != record.id && r.name == record.name) {
            return Err(RepositoryError::Conflict(format!("role '{}' already exists", record.name)));
        }
        map.insert(record.id, record);
        Ok(())
    }

    pub fn remove(&self, id: RoleId) -> Result<RoleRecord, RepositoryError> {
        let mut map = self.inner.write().map_err(|_| RepositoryError::Poisoned)?;
        map.remove(&id).ok_or(RepositoryError::NotFound)
    }

    pub fn get(&self, id: RoleId) -> Result<Option<RoleRecord>, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(map.get(&id).cloned())
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<RoleRecord>, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(map.values().find(|r| r.name == name).cloned())
    }

    /// Resolve names to records; `Err(missing)` lists every unknown name.
    pub fn find_by_names(
        &self,
        names: &[String],
    ) -> Result<Result<Vec<RoleRecord>, Vec<String>>, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        let mut found = Vec::with_capacity(names.len());
        let mut missing = Vec::new();

        for name in names {
            match map.values().find(|r| &r.name == name) {
                Some(r) => found.push(r.clone()),
                None => missing.push(name.clone()),
            }
        }

        Ok(if missing.is_empty() { Ok(found) } else { Err(missing) })
    }

    /// Records for the given ids, sorted by name; unknown ids are skipped.
    pub fn get_many(&self, ids: &[RoleId]) -> Result<Vec<RoleRecord>, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        let mut out: Vec<RoleRecord> = ids.iter().filter_map(|id| map.get(id)).cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    /// Filtered by search/guard, sorted by name.
    pub fn list(&self, search: Option<&str>, guard_name: Option<&str>) -> Result<Vec<RoleRecord>, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        let mut out: Vec<RoleRecord> = map
            .values()
            .filter(|r| matches_search(&[r.name.as_str()], search))
            .filter(|r| guard_name.is_none_or(|g| r.guard_name == g))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    pub fn count(&self) -> Result<u64, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(map.len() as u64)
    }

    /// Roles whose grants include `permission`.
    pub fn count_with_permission(&self, permission: PermissionId) -> Result<u64, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(map.values().filter(|r| r.permission_ids.contains(&permission)).count() as u64)
    }

    /// Distinct permissions granted by at least one role.
    pub fn granted_permission_ids(&self) -> Result<Vec<PermissionId>, RepositoryError> {
        let map = self.inner.read().map_err(|_| RepositoryError::Poisoned)?;
        let mut ids: Vec<PermissionId> = map.values().flat_map(|r| r.permission_ids.iter().copied()).collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, perms: Vec<PermissionId>) -> RoleRecord {
        let now = Utc::now();
        RoleRecord {
            id: RoleId::new(),
            name: name.to_string(),
            guard_name: "api".to_string(),
            permission_ids: perms,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn rename_onto_existing_name_conflicts() {
        let repo = InMemoryRoleRepository::new();
        repo.insert(record("admin", vec![])).unwrap();
        let mut editor = record("editor", vec![]);
        repo.insert(editor.clone()).unwrap();

        editor.name = "admin".to_string();
        assert!(matches!(repo.update(editor), Err(RepositoryError::Conflict(_))));
    }

    #[test]
    fn permission_usage_counts() {
        let repo = InMemoryRoleRepository::new();
        let p = PermissionId::new();
        repo.insert(record("a", vec![p])).unwrap();
        repo.insert(record("b", vec![p, PermissionId::new()])).unwrap();
        repo.insert(record("c", vec![])).unwrap();

        assert_eq!(repo.count_with_permission(p).unwrap(), 2);
        assert_eq!(repo.granted_permission_ids().unwrap().len(), 2);
    }

    #[test]
    fn find_by_names_reports_missing() {
        let repo = InMemoryRoleRepository::new();
        repo.insert(record("user", vec![])).unwrap();
        let res = repo
            .find_by_names(&["user".to_string(), "ghost".to_string()])
            .unwrap();
        assert_eq!(res.unwrap_err(), vec!["ghost".to_string()]);
    }
}
