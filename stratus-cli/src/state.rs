//! Local state file and lock
//!
//! The state file records, for every managed resource, its cloud identifier
//! and last known attributes. A sibling `.lock` file guards mutating commands.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use stratus_core::resource::{ResourceId, State, Value};
use thiserror::Error;

/// Default lock timeout in seconds (15 minutes)
pub const DEFAULT_LOCK_TIMEOUT_SECS: i64 = 900;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("State is locked by {who} (lock ID: {lock_id}, operation: {operation})")]
    Locked {
        lock_id: String,
        who: String,
        operation: String,
    },

    #[error("Unsupported state file version {0}")]
    UnsupportedVersion(u32),

    #[error("State lineage mismatch: expected {expected}, got {actual}")]
    LineageMismatch { expected: String, actual: String },

    #[error("Invalid state file {path}: {source}")]
    Invalid {
        path: String,
        source: serde_json::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

impl StateError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Incremented on every write
    pub serial: u64,
    /// Unique identifier for this state's history
    pub lineage: String,
    /// Version of Stratus that last wrote this state
    pub stratus_version: String,
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage: uuid::Uuid::new_v4().to_string(),
            stratus_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.stratus_version = env!("CARGO_PKG_VERSION").to_string();
    }

    pub fn find_resource(&self, id: &ResourceId) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == id.resource_type && r.name == id.name)
    }

    /// Add or replace the entry for `state.id`
    pub fn upsert(&mut self, state: &State) {
        let entry = ResourceState::from_state(state);
        match self
            .resources
            .iter_mut()
            .find(|r| r.resource_type == entry.resource_type && r.name == entry.name)
        {
            Some(existing) => *existing = entry,
            None => self.resources.push(entry),
        }
    }

    pub fn remove(&mut self, id: &ResourceId) -> Option<ResourceState> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.resource_type == id.resource_type && r.name == id.name)?;
        Some(self.resources.remove(pos))
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub resource_type: String,
    pub name: String,
    pub identifier: String,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl ResourceState {
    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    pub fn from_state(state: &State) -> Self {
        Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            identifier: state.identifier.clone().unwrap_or_default(),
            attributes: state
                .attributes
                .iter()
                .filter_map(|(k, v)| v.to_json().map(|j| (k.clone(), j)))
                .collect(),
        }
    }

    /// The recorded state as the provider sees it
    pub fn to_state(&self) -> State {
        let attributes = self
            .attributes
            .iter()
            .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
            .collect();
        State::existing(self.id(), attributes).with_identifier(&self.identifier)
    }
}

/// Information about a state lock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub id: String,
    /// The command holding the lock (e.g., "apply", "destroy")
    pub operation: String,
    /// Who acquired the lock (username@hostname)
    pub who: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl LockInfo {
    pub fn new(operation: impl Into<String>) -> Self {
        Self::with_timeout(operation, DEFAULT_LOCK_TIMEOUT_SECS)
    }

    pub fn with_timeout(operation: impl Into<String>, timeout_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            who: lock_owner(),
            created: now,
            expires: now + Duration::seconds(timeout_secs),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires
    }
}

fn lock_owner() -> String {
    let username = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    format!("{}@{}", username, hostname)
}

/// State file on local disk
pub struct LocalState {
    path: PathBuf,
}

impl LocalState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Read the state, or a fresh one when no file exists yet
    pub fn load(&self) -> Result<StateFile, StateError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no state at {}, starting fresh", self.path.display());
                return Ok(StateFile::new());
            }
            Err(e) => return Err(StateError::io(&self.path, e)),
        };
        let state: StateFile =
            serde_json::from_str(&content).map_err(|source| StateError::Invalid {
                path: self.path.display().to_string(),
                source,
            })?;
        if state.version > StateFile::CURRENT_VERSION {
            return Err(StateError::UnsupportedVersion(state.version));
        }
        Ok(state)
    }

    /// Write `state` with its serial incremented. Refuses to overwrite a file
    /// from a different lineage.
    pub fn save(&self, state: &mut StateFile) -> Result<(), StateError> {
        if self.path.exists() {
            let current = self.load()?;
            if current.lineage != state.lineage {
                return Err(StateError::LineageMismatch {
                    expected: current.lineage,
                    actual: state.lineage.clone(),
                });
            }
        }
        state.increment_serial();
        let json = serde_json::to_string_pretty(state).map_err(|source| StateError::Invalid {
            path: self.path.display().to_string(),
            source,
        })?;

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).map_err(|e| StateError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| StateError::io(&self.path, e))
    }

    /// Take the lock for `operation`. An expired or unreadable lock is taken
    /// over once.
    ///
    /// The lock is written to a private file first and then hard-linked into
    /// place, which fails if a lock exists. Other processes never see a
    /// partially written lock.
    pub fn lock(&self, operation: &str) -> Result<StateLock, StateError> {
        let path = self.lock_path();
        let info = LockInfo::new(operation);
        let json = serde_json::to_string_pretty(&info).map_err(|source| StateError::Invalid {
            path: path.display().to_string(),
            source,
        })?;
        let mut pending = path.as_os_str().to_owned();
        pending.push(format!(".{}", info.id));
        let pending = PathBuf::from(pending);
        fs::write(&pending, json).map_err(|e| StateError::io(&pending, e))?;

        let result = publish_lock(&path, &pending);
        if let Err(e) = fs::remove_file(&pending) {
            warn!("failed to remove {}: {}", pending.display(), e);
        }
        result?;
        debug!("acquired state lock {}", info.id);
        Ok(StateLock { path, info })
    }
}

/// Link `pending` into place as the lock at `path`
fn publish_lock(path: &Path, pending: &Path) -> Result<(), StateError> {
    let mut took_over = false;
    loop {
        match fs::hard_link(pending, path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists && !took_over => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return match read_lock(path) {
                    Ok(Some(holder)) => Err(holder.into()),
                    Ok(None) | Err(_) => Err(StateError::io(path, e)),
                };
            }
            Err(e) => return Err(StateError::io(path, e)),
        }

        match read_lock(path) {
            Ok(Some(holder)) if !holder.is_expired() => return Err(holder.into()),
            Ok(Some(holder)) => {
                warn!(
                    "taking over expired lock {} held by {}",
                    holder.id, holder.who
                );
                remove_stale_lock(path, Some(&holder.id))?;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("replacing unreadable lock {}: {}", path.display(), e);
                remove_stale_lock(path, None)?;
            }
        }
        took_over = true;
    }
}

impl From<LockInfo> for StateError {
    fn from(holder: LockInfo) -> Self {
        StateError::Locked {
            lock_id: holder.id,
            who: holder.who,
            operation: holder.operation,
        }
    }
}

/// The lock recorded at `path`, `None` when there is none
fn read_lock(path: &Path) -> Result<Option<LockInfo>, StateError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StateError::io(path, e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| StateError::Invalid {
            path: path.display().to_string(),
            source,
        })
}

/// Remove the lock at `path` if it is still the stale one (`stale_id`, or an
/// unreadable file when `None`). The file is first moved aside so that a lock
/// created by another process in between can be put back untouched.
fn remove_stale_lock(path: &Path, stale_id: Option<&str>) -> Result<(), StateError> {
    let mut aside = path.as_os_str().to_owned();
    aside.push(format!(".{}", uuid::Uuid::new_v4()));
    let aside = PathBuf::from(aside);
    match fs::rename(path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StateError::io(path, e)),
    }
    if let Ok(Some(moved)) = read_lock(&aside)
        && Some(moved.id.as_str()) != stale_id
        && let Err(e) = fs::hard_link(&aside, path)
    {
        warn!("failed to restore lock {}: {}", moved.id, e);
    }
    fs::remove_file(&aside).map_err(|e| StateError::io(&aside, e))
}

/// Held state lock; released when dropped
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
    info: LockInfo,
}

impl StateLock {
    pub fn info(&self) -> &LockInfo {
        &self.info
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        match read_lock(&self.path) {
            Ok(Some(holder)) if holder.id == self.info.id => {
                if let Err(e) = fs::remove_file(&self.path) {
                    warn!("failed to release state lock {}: {}", self.path.display(), e);
                }
            }
            Ok(Some(holder)) => warn!(
                "state lock {} was taken over by {} ({}), leaving it in place",
                self.info.id, holder.who, holder.id
            ),
            Ok(None) => warn!("state lock {} was already removed", self.info.id),
            Err(e) => warn!("failed to release state lock {}: {}", self.path.display(), e),
        }
    }
}
