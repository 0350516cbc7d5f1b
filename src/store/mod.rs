//! Persistent provisioning state.
//!
//! - [`CredentialStore`]: bounded, recency-ordered list of known networks
//! - [`DeviceBinding`]: user id and locale delivered with the last
//!   successful WiFi-config command
//!
//! Durable storage is abstracted by [`CredentialBackend`]. The NVS backend
//! lives in [`crate::persistence`] (ESP32), the file backend in
//! [`crate::persistence_host`], and [`MemoryBackend`] serves tests.

mod credentials;

pub use credentials::{Credential, CredentialStore, DEFAULT_CAPACITY};

use crate::protocol::LocaleInfo;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

/// Errors raised by credential backends.
#[derive(Debug)]
pub enum StorageError {
    /// Reading or writing the underlying medium failed.
    Io(io::Error),
    /// Stored data could not be encoded or decoded.
    Serialization(String),
    /// Backend-specific failure (e.g. an NVS error code).
    Backend(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "storage I/O error: {}", e),
            Self::Serialization(msg) => write!(f, "storage serialization error: {}", msg),
            Self::Backend(msg) => write!(f, "storage backend error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Account binding persisted after a successful provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceBinding {
    /// User identifier supplied by the provisioning peer.
    pub uid: String,
    /// Set until the cloud side confirms the binding.
    pub need_activation: bool,
    /// Locale metadata from an extended-layout payload.
    pub locale: Option<LocaleInfo>,
}

/// Durable storage for the credential list and device binding.
///
/// `save` must replace the stored list atomically: after a crash the
/// previous list or the new list is visible, never a mix.
pub trait CredentialBackend: Send {
    fn load(&mut self) -> Result<Vec<Credential>, StorageError>;
    fn save(&mut self, credentials: &[Credential]) -> Result<(), StorageError>;
    fn load_binding(&mut self) -> Result<Option<DeviceBinding>, StorageError>;
    fn save_binding(&mut self, binding: &DeviceBinding) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    credentials: Vec<Credential>,
    binding: Option<DeviceBinding>,
    saves: usize,
    fail_saves: bool,
}

/// Volatile backend; clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-populated with a credential list.
    pub fn with_credentials(credentials: Vec<Credential>) -> Self {
        let backend = Self::default();
        backend.lock().credentials = credentials;
        backend
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every subsequent save fail.
    pub fn set_fail_saves(&self, fail: bool) {
        self.lock().fail_saves = fail;
    }

    /// Number of successful list saves.
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    /// Snapshot of the persisted list.
    pub fn stored(&self) -> Vec<Credential> {
        self.lock().credentials.clone()
    }

    /// Snapshot of the persisted binding.
    pub fn stored_binding(&self) -> Option<DeviceBinding> {
        self.lock().binding.clone()
    }
}

impl CredentialBackend for MemoryBackend {
    fn load(&mut self) -> Result<Vec<Credential>, StorageError> {
        Ok(self.lock().credentials.clone())
    }

    fn save(&mut self, credentials: &[Credential]) -> Result<(), StorageError> {
        let mut state = self.lock();
        if state.fail_saves {
            return Err(StorageError::Backend("injected save failure".into()));
        }
        state.credentials = credentials.to_vec();
        state.saves += 1;
        Ok(())
    }

    fn load_binding(&mut self) -> Result<Option<DeviceBinding>, StorageError> {
        Ok(self.lock().binding.clone())
    }

    fn save_binding(&mut self, binding: &DeviceBinding) -> Result<(), StorageError> {
        let mut state = self.lock();
        if state.fail_saves {
            return Err(StorageError::Backend("injected save failure".into()));
        }
        state.binding = Some(binding.clone());
        Ok(())
    }
}
