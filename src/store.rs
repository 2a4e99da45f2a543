//! Durable storage for the current session record.
//!
//! ERROR HANDLING
//! ==============
//! `load` never fails: an absent record is an empty session and a record that
//! does not parse is deleted and treated the same way. Only writes surface
//! `AuthError::Storage`.

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{AuthError, Result};
use crate::token::{STORAGE_KEY, SessionToken};

/// Key/value persistence of the single session record.
pub trait TokenStore: Send + Sync {
    /// Read the persisted record, or an empty token if there is none.
    fn load(&self) -> SessionToken;

    /// Overwrite the persisted record.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Storage` if the record cannot be written.
    fn save(&self, token: &SessionToken) -> Result<()>;

    /// Remove the persisted record. Removing an absent record succeeds.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Storage` if the record exists but cannot be removed.
    fn clear(&self) -> Result<()>;
}

fn decode(raw: &str) -> Option<SessionToken> {
    match serde_json::from_str::<SessionToken>(raw) {
        Ok(token) => Some(token.normalized()),
        Err(e) => {
            tracing::warn!(error = %e, "discarding unparsable session record");
            None
        }
    }
}

fn encode(token: &SessionToken) -> Result<String> {
    serde_json::to_string(token).map_err(|e| AuthError::Storage(e.to_string()))
}

// =============================================================================
// FILE STORE
// =============================================================================

/// One JSON file per storage key.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Store the record at `<dir>/auth_token.json`.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self { path: dir.as_ref().join(format!("{STORAGE_KEY}.json")) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> SessionToken {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return SessionToken::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "session record unreadable");
                return SessionToken::default();
            }
        };
        if let Some(token) = decode(&raw) {
            return token;
        }
        if let Err(e) = self.clear() {
            tracing::warn!(error = %e, "failed to delete corrupt session record");
        }
        SessionToken::default()
    }

    fn save(&self, token: &SessionToken) -> Result<()> {
        let raw = encode(token)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| AuthError::Storage(e.to_string()))?;
            }
        }
        std::fs::write(&self.path, raw).map_err(|e| AuthError::Storage(e.to_string()))
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::Storage(e.to_string())),
        }
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Process-local store holding the raw serialized record.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    raw: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an arbitrary raw record.
    #[must_use]
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self { raw: Mutex::new(Some(raw.into())) }
    }

    /// The raw record currently held, if any.
    #[must_use]
    pub fn raw(&self) -> Option<String> {
        self.slot().clone()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.raw.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> SessionToken {
        let mut slot = self.slot();
        let Some(raw) = slot.as_deref() else {
            return SessionToken::default();
        };
        if let Some(token) = decode(raw) {
            return token;
        }
        *slot = None;
        SessionToken::default()
    }

    fn save(&self, token: &SessionToken) -> Result<()> {
        let raw = encode(token)?;
        *self.slot() = Some(raw);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}
