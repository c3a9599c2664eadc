//! JSON state-file store.
//!
//! The whole state (records and users) lives in a single JSON file that
//! several processes may share. Every operation takes an advisory lock on a
//! sidecar `<state>.lock` file (shared for reads, exclusive for writes) and
//! re-reads the state file under it, so no process writes from a stale copy.
//! Writes go to a temporary file in the same directory which then replaces
//! the state file, so a crash never leaves a half-written file behind.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use coursegate_core::error::StoreError;
use coursegate_core::model::{ProgressKey, ProgressRecord, UserRecord};
use coursegate_core::traits::{ProgressStore, UserDirectory};

const STATE_VERSION: u32 = 1;

/// On-disk layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    records: Vec<ProgressRecord>,
    #[serde(default)]
    users: Vec<UserRecord>,
}

#[derive(Default)]
struct State {
    records: BTreeMap<ProgressKey, ProgressRecord>,
    users: BTreeMap<String, UserRecord>,
}

impl State {
    fn read(path: &Path) -> Result<Self, StoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let file: StateFile = serde_json::from_str(&content)?;
        if file.version > STATE_VERSION {
            return Err(StoreError::Serialization(format!(
                "state file {} has unsupported version {}",
                path.display(),
                file.version
            )));
        }
        Ok(Self {
            records: file.records.into_iter().map(|r| (r.key(), r)).collect(),
            users: file
                .users
                .into_iter()
                .map(|u| (u.user_id.clone(), u))
                .collect(),
        })
    }

    fn to_file(&self) -> StateFile {
        StateFile {
            version: STATE_VERSION,
            records: self.records.values().cloned().collect(),
            users: self.users.values().cloned().collect(),
        }
    }
}

/// Advisory lock on the sidecar file, released on drop.
struct FileLock(File);

impl FileLock {
    fn acquire(path: &Path, exclusive: bool) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if exclusive {
            FileExt::lock_exclusive(&file)?;
        } else {
            FileExt::lock_shared(&file)?;
        }
        Ok(Self(file))
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.0) {
            tracing::warn!("failed to release state lock: {e}");
        }
    }
}

/// Store backed by a JSON file.
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
    /// Serializes this handle's own operations so tasks never block a runtime
    /// thread on the file lock held by a sibling task.
    gate: Mutex<()>,
}

impl FileStore {
    /// Open a state file, starting empty if it does not exist yet.
    ///
    /// An existing file is read once to reject corrupt or newer state early.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut lock_path = OsString::from(path.as_os_str());
        lock_path.push(".lock");
        let store = Self {
            lock_path: PathBuf::from(lock_path),
            path,
            gate: Mutex::new(()),
        };

        if store.path.exists() {
            let _lock = FileLock::acquire(&store.lock_path, false)?;
            State::read(&store.path)?;
        } else {
            tracing::debug!("state file {} not found, starting empty", store.path.display());
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Run `f` against a fresh copy of the state under a shared lock.
    async fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, StoreError> {
        let _gate = self.gate.lock().await;
        if !self.path.exists() {
            return Ok(f(&State::default()));
        }
        let _lock = FileLock::acquire(&self.lock_path, false)?;
        Ok(f(&State::read(&self.path)?))
    }

    /// Re-read the state under an exclusive lock, let `f` change it, and
    /// write it back. `f` returning `None` leaves the file untouched.
    async fn write<T>(&self, f: impl FnOnce(&mut State) -> Option<T>) -> Result<Option<T>, StoreError> {
        let _gate = self.gate.lock().await;
        std::fs::create_dir_all(self.dir())?;
        let _lock = FileLock::acquire(&self.lock_path, true)?;

        let mut state = State::read(&self.path)?;
        let Some(out) = f(&mut state) else {
            return Ok(None);
        };
        self.persist(&state)?;
        Ok(Some(out))
    }

    /// Write the full state atomically. Caller holds the exclusive lock.
    fn persist(&self, state: &State) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&state.to_file())?;
        let mut tmp = tempfile::NamedTempFile::new_in(self.dir())?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::Io(format!("failed to replace {}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for FileStore {
    async fn load(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>, StoreError> {
        self.read(|state| state.records.get(key).cloned()).await
    }

    async fn save(&self, record: &ProgressRecord) -> Result<(), StoreError> {
        self.write(|state| {
            state.records.insert(record.key(), record.clone());
            Some(())
        })
        .await?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ProgressRecord>, StoreError> {
        self.read(|state| {
            state
                .records
                .values()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect()
        })
        .await
    }

    /// The load, `apply` and save all happen under one exclusive lock.
    async fn update(
        &self,
        key: &ProgressKey,
        apply: &mut (dyn FnMut(Option<ProgressRecord>) -> Option<ProgressRecord> + Send),
    ) -> Result<(), StoreError> {
        self.write(|state| {
            let record = apply(state.records.get(key).cloned())?;
            state.records.insert(record.key(), record);
            Some(())
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for FileStore {
    async fn user(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.read(|state| state.users.get(user_id).cloned()).await
    }

    async fn set_skill(&self, user_id: &str, skill: f64) -> Result<bool, StoreError> {
        let written = self
            .write(|state| {
                let user = state.users.get_mut(user_id)?;
                user.skill = Some(skill);
                user.updated_at = Utc::now();
                Some(())
            })
            .await?;
        Ok(written.is_some())
    }

    async fn upsert_user(&self, user_id: &str, skill: Option<f64>) -> Result<UserRecord, StoreError> {
        let user = self
            .write(|state| {
                let user = state
                    .users
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
                Some(user.clone())
            })
            .await?;
        user.ok_or_else(|| StoreError::Io(format!("user {user_id} was not written")))
    }
}
