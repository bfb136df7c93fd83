//!
//! portal storage module
//! ----------------------
//! The user directory lives in a single JSON document (`users.json`) under the data folder.
//! The whole table is loaded at open and rewritten on every mutation: the new document is
//! written to a sibling temp file and renamed over the old one, so a crash mid-write leaves
//! the previous version intact.
//!
//! Key responsibilities:
//! - Unique username and (when present) unique email enforcement.
//! - Monotonic numeric identifiers that are never reused after deletion.
//! - Scoped access: callers obtain a connection with `SharedStore::connect`, which holds the
//!   table lock until the guard drops. The guard is not `Send`, so it cannot be held across
//!   an `.await` inside a request handler.
//!
//! With no path configured the table is purely in-memory, which is what the tests use.

use std::{fs, path::{Path, PathBuf}};
use std::sync::Arc;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const USERS_FILE: &str = "users.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("username already exists")]
    DuplicateUsername,
    #[error("email already exists")]
    DuplicateEmail,
    #[error("user {0} not found")]
    NotFound(u64),
    #[error("user table io: {0}")]
    Io(#[from] std::io::Error),
    #[error("user table is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// One stored user row. Serialized only into the table file, never onto the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub password_hash: String,
    pub role: String,
    #[serde(default)]
    pub disabled: bool,
}

/// Values for a row about to be inserted; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: String,
    pub disabled: bool,
}

/// Partial update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<String>,
    pub disabled: Option<bool>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
            && self.role.is_none()
            && self.disabled.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserTable {
    /// Last identifier handed out; ids start at 1.
    #[serde(default)]
    last_id: u64,
    #[serde(default)]
    users: Vec<UserRecord>,
}

impl UserTable {
    fn email_taken(&self, email: &str, except: Option<u64>) -> bool {
        self.users.iter().any(|u| {
            Some(u.id) != except
                && u.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email))
        })
    }
}

/// Handle to the user table.
#[derive(Debug)]
pub struct Store {
    path: Option<PathBuf>,
    table: UserTable,
}

impl Store {
    /// Open (or start) the table stored under `data_folder`.
    pub fn open(data_folder: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = data_folder.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(USERS_FILE);
        let table = if path.exists() {
            let text = fs::read_to_string(&path)?;
            if text.trim().is_empty() { UserTable::default() } else { serde_json::from_str(&text)? }
        } else {
            UserTable::default()
        };
        debug!(path = %path.display(), users = table.users.len(), "user table opened");
        Ok(Self { path: Some(path), table })
    }

    pub fn in_memory() -> Self {
        Self { path: None, table: UserTable::default() }
    }

    pub fn path(&self) -> Option<&Path> { self.path.as_deref() }

    pub fn len(&self) -> usize { self.table.users.len() }

    pub fn is_empty(&self) -> bool { self.table.users.is_empty() }

    pub fn find_by_id(&self, id: u64) -> Option<UserRecord> {
        self.table.users.iter().find(|u| u.id == id).cloned()
    }

    pub fn find_by_username(&self, username: &str) -> Option<UserRecord> {
        self.table.users.iter().find(|u| u.username == username).cloned()
    }

    /// All users ordered by id.
    pub fn list(&self) -> Vec<UserRecord> {
        let mut out = self.table.users.clone();
        out.sort_by_key(|u| u.id);
        out
    }

    pub fn insert(&mut self, new: NewUser) -> Result<UserRecord, StoreError> {
        if self.table.users.iter().any(|u| u.username == new.username) {
            return Err(StoreError::DuplicateUsername);
        }
        if let Some(email) = new.email.as_deref() {
            if self.table.email_taken(email, None) { return Err(StoreError::DuplicateEmail); }
        }
        let mut next = self.table.clone();
        next.last_id += 1;
        let rec = UserRecord {
            id: next.last_id,
            username: new.username,
            full_name: new.full_name,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            disabled: new.disabled,
        };
        next.users.push(rec.clone());
        self.commit(next)?;
        Ok(rec)
    }

    pub fn update(&mut self, id: u64, patch: UserPatch) -> Result<UserRecord, StoreError> {
        let mut next = self.table.clone();
        if let Some(email) = patch.email.as_deref() {
            if next.email_taken(email, Some(id)) { return Err(StoreError::DuplicateEmail); }
        }
        let row = next.users.iter_mut().find(|u| u.id == id).ok_or(StoreError::NotFound(id))?;
        if let Some(v) = patch.full_name { row.full_name = Some(v); }
        if let Some(v) = patch.email { row.email = Some(v); }
        if let Some(v) = patch.password_hash { row.password_hash = v; }
        if let Some(v) = patch.role { row.role = v; }
        if let Some(v) = patch.disabled { row.disabled = v; }
        let updated = row.clone();
        self.commit(next)?;
        Ok(updated)
    }

    pub fn delete(&mut self, id: u64) -> Result<UserRecord, StoreError> {
        let mut next = self.table.clone();
        let pos = next.users.iter().position(|u| u.id == id).ok_or(StoreError::NotFound(id))?;
        let removed = next.users.remove(pos);
        self.commit(next)?;
        Ok(removed)
    }

    /// Persist `next` and only then make it the live table.
    fn commit(&mut self, next: UserTable) -> Result<(), StoreError> {
        if let Some(path) = &self.path {
            let tmp = path.with_extension("json.tmp");
            let text = serde_json::to_string_pretty(&next)?;
            fs::write(&tmp, text)?;
            fs::rename(&tmp, path)?;
        }
        self.table = next;
        Ok(())
    }
}

/// A scoped connection to the user table. Dropping it releases the table.
pub type UserConn<'a> = MutexGuard<'a, Store>;

#[derive(Clone)]
pub struct SharedStore(pub Arc<Mutex<Store>>);

impl SharedStore {
    pub fn new(store: Store) -> Self { Self(Arc::new(Mutex::new(store))) }

    pub fn open(data_folder: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::new(Store::open(data_folder)?))
    }

    pub fn in_memory() -> Self { Self::new(Store::in_memory()) }

    pub fn connect(&self) -> UserConn<'_> { self.0.lock() }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod storage_tests;
