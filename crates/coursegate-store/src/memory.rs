//! In-memory store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use coursegate_core::error::StoreError;
use coursegate_core::model::{ProgressKey, ProgressRecord, UserRecord};
use coursegate_core::traits::{ProgressStore, UserDirectory};

/// Progress records and users kept in process memory.
///
/// Also used as a test double: writes can be made to fail and are counted.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<ProgressKey, ProgressRecord>>,
    users: RwLock<HashMap<String, UserRecord>>,
    /// Number of successful record saves.
    save_count: AtomicU32,
    /// Number of successful skill writes.
    skill_writes: AtomicU32,
    fail_record_writes: AtomicBool,
    fail_user_access: AtomicBool,
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".into())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with users.
    pub fn with_users<'a>(users: impl IntoIterator<Item = (&'a str, Option<f64>)>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.users.write() {
            for (id, skill) in users {
                map.insert(
                    id.to_string(),
                    UserRecord {
                        user_id: id.to_string(),
                        skill,
                        updated_at: Utc::now(),
                    },
                );
            }
        }
        store
    }

    /// Make every subsequent record write fail.
    pub fn fail_record_writes(&self, fail: bool) {
        self.fail_record_writes.store(fail, Ordering::Relaxed);
    }

    /// Make every subsequent user read or write fail.
    pub fn fail_user_access(&self, fail: bool) {
        self.fail_user_access.store(fail, Ordering::Relaxed);
    }

    pub fn save_count(&self) -> u32 {
        self.save_count.load(Ordering::Relaxed)
    }

    pub fn skill_writes(&self) -> u32 {
        self.skill_writes.load(Ordering::Relaxed)
    }

    fn check_users(&self) -> Result<(), StoreError> {
        if self.fail_user_access.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("user directory offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn load(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>, StoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(key).cloned())
    }

    async fn save(&self, record: &ProgressRecord) -> Result<(), StoreError> {
        if self.fail_record_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("record writes disabled".into()));
        }
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.insert(record.key(), record.clone());
        self.save_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ProgressRecord>, StoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn user(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.check_users()?;
        let users = self.users.read().map_err(|_| poisoned())?;
        Ok(users.get(user_id).cloned())
    }

    async fn set_skill(&self, user_id: &str, skill: f64) -> Result<bool, StoreError> {
        self.check_users()?;
        let mut users = self.users.write().map_err(|_| poisoned())?;
        match users.get_mut(user_id) {
            Some(user) => {
                user.skill = Some(skill);
                user.updated_at = Utc::now();
                self.skill_writes.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn upsert_user(&self, user_id: &str, skill: Option<f64>) -> Result<UserRecord, StoreError> {
        self.check_users()?;
        let mut users = self.users.write().map_err(|_| poisoned())?;
        let user = users
            .entry(user_id.to_string())
            .or_insert_with(|| UserRecord {
                user_id: user_id.to_string(),
                skill: None,
                updated_at: Utc::now(),
            });
        if skill.is_some() {
            user.skill = skill;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_and_load() {
        let store = MemoryStore::new();
        let key = ProgressKey::new("u1", "c1");
        assert!(store.load(&key).await.unwrap().is_none());

        let record = ProgressRecord::new(&key, Utc::now());
        store.save(&record).await.unwrap();
        assert_eq!(store.load(&key).await.unwrap(), Some(record));
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn list_filters_by_user() {
        let store = MemoryStore::new();
        for (u, c) in [("u1", "a"), ("u1", "b"), ("u2", "a")] {
            store
                .save(&ProgressRecord::new(&ProgressKey::new(u, c), Utc::now()))
                .await
                .unwrap();
        }
        let list = store.list_for_user("u1").await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].course_id, "a");
        assert_eq!(list[1].course_id, "b");
    }

    #[tokio::test]
    async fn set_skill_on_missing_user() {
        let store = MemoryStore::with_users([("u1", Some(2.0))]);
        assert!(store.set_skill("u1", 2.5).await.unwrap());
        assert!(!store.set_skill("ghost", 2.5).await.unwrap());
        assert_eq!(store.user("u1").await.unwrap().unwrap().skill, Some(2.5));
        assert_eq!(store.skill_writes(), 1);
    }

    #[tokio::test]
    async fn upsert_keeps_skill_when_none_given() {
        let store = MemoryStore::new();
        store.upsert_user("u1", Some(3.0)).await.unwrap();
        let user = store.upsert_user("u1", None).await.unwrap();
        assert_eq!(user.skill, Some(3.0));
    }

    #[tokio::test]
    async fn injected_failures() {
        let store = MemoryStore::with_users([("u1", None)]);
        store.fail_record_writes(true);
        let record = ProgressRecord::new(&ProgressKey::new("u1", "c"), Utc::now());
        assert!(store.save(&record).await.is_err());
        store.fail_user_access(true);
        assert!(store.user("u1").await.is_err());
    }
}
