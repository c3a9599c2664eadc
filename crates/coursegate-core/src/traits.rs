//! Collaborator traits.
//!
//! The engine never owns course structure, user records or record storage.
//! These traits are implemented by the `coursegate-store` crate (and by test
//! doubles).

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{CourseStructure, ProgressKey, ProgressRecord, UserRecord};

// ---------------------------------------------------------------------------
// Course catalog
// ---------------------------------------------------------------------------

/// Read-only source of course structure.
pub trait CourseCatalog: Send + Sync {
    /// Look up a course by id.
    fn course(&self, course_id: &str) -> Option<CourseStructure>;

    /// Ids of every known course.
    fn course_ids(&self) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// Progress storage
// ---------------------------------------------------------------------------

/// Persistent storage for progress records.
///
/// The gating service serializes read-modify-write cycles per key within one
/// process and runs them through [`ProgressStore::update`]. Stores shared
/// between processes override `update` so the whole cycle runs under their
/// own lock.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Load a record, or `None` if it was never created.
    async fn load(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>, StoreError>;

    /// Insert or replace a record.
    async fn save(&self, record: &ProgressRecord) -> Result<(), StoreError>;

    /// All records belonging to a user, in course id order.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ProgressRecord>, StoreError>;

    /// Read-modify-write of one record. `apply` gets the stored record and
    /// returns the record to save, or `None` to leave storage untouched.
    async fn update(
        &self,
        key: &ProgressKey,
        apply: &mut (dyn FnMut(Option<ProgressRecord>) -> Option<ProgressRecord> + Send),
    ) -> Result<(), StoreError> {
        let current = self.load(key).await?;
        if let Some(record) = apply(current) {
            self.save(&record).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// User directory
// ---------------------------------------------------------------------------

/// Access to the per-user skill scalar.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a user, or `None` if the user does not exist.
    async fn user(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Overwrite a user's skill. Returns `false` if the user does not exist.
    async fn set_skill(&self, user_id: &str, skill: f64) -> Result<bool, StoreError>;

    /// Create a user (or replace its skill if it already exists).
    async fn upsert_user(&self, user_id: &str, skill: Option<f64>) -> Result<UserRecord, StoreError>;
}
