//! Persisted session identity: a JSON blob with the logged-in user and token.
//!
//! Absence means anonymous. A blob that exists but fails to parse is an
//! `Auth` error so the facade can force a logout instead of adopting a
//! half-readable identity. One process-wide identity; there is no per-tab
//! scoping here.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{Result, SyncError};
use crate::models::StoredIdentity;

pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<StoredIdentity>>;
    fn save(&self, identity: &StoredIdentity) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// File-backed store under the platform data directory.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new() -> Result<Self> {
        let base = dirs::data_dir()
            .ok_or_else(|| SyncError::Storage("no platform data directory".to_string()))?;
        Ok(Self::at(base.join("crew_sync").join("session.json")))
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<StoredIdentity>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::Storage(e.to_string())),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| SyncError::Auth(format!("malformed persisted identity: {e}")))
    }

    fn save(&self, identity: &StoredIdentity) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::Storage(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(identity)
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| SyncError::Storage(e.to_string()))
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::Storage(e.to_string())),
        }
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<StoredIdentity>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(identity: StoredIdentity) -> Self {
        Self {
            slot: Mutex::new(Some(identity)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<StoredIdentity>> {
        Ok(self.slot.lock().expect("store lock").clone())
    }

    fn save(&self, identity: &StoredIdentity) -> Result<()> {
        *self.slot.lock().expect("store lock") = Some(identity.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot.lock().expect("store lock") = None;
        Ok(())
    }
}
