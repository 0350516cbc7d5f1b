//! Known-network list.
//!
//! Entries are ordered by recency: index 0 is the most recently added (or
//! explicitly promoted) network. The list is bounded; adding a new SSID to
//! a full list evicts the last entry.
//!
//! Every mutation builds the new list, hands it to the backend, and only
//! then replaces the in-memory copy. A failed save leaves both the backend
//! and memory at the previous state.
//!
//! # Example
//!
//! ```
//! use wifi_provision_esp32::store::{CredentialStore, MemoryBackend};
//!
//! let store = CredentialStore::open(MemoryBackend::new(), 10).unwrap();
//! store.add("Home", "secret123", None).unwrap();
//! store.add("Office", "hunter22", None).unwrap();
//! assert_eq!(store.list()[0].ssid, "Office");
//! ```

use super::{CredentialBackend, DeviceBinding, StorageError};
use crate::wifi::{Bssid, ScanRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Default number of stored networks.
pub const DEFAULT_CAPACITY: usize = 10;

/// A stored network.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    pub ssid: String,
    pub password: String,
    #[zeroize(skip)]
    pub bssid: Option<Bssid>,
}

impl Credential {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>, bssid: Option<Bssid>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
            bssid,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .field("bssid", &self.bssid)
            .finish()
    }
}

struct StoreState<B> {
    backend: B,
    entries: Vec<Credential>,
}

/// Bounded, persisted list of known networks.
///
/// All operations serialize through one lock, so concurrent callers never
/// lose each other's updates.
pub struct CredentialStore<B> {
    state: Mutex<StoreState<B>>,
    capacity: usize,
}

impl<B: CredentialBackend> CredentialStore<B> {
    /// Load the stored list from `backend`.
    ///
    /// A stored list longer than `capacity` is cut down to the most recent
    /// entries.
    pub fn open(mut backend: B, capacity: usize) -> Result<Self, StorageError> {
        let capacity = capacity.max(1);
        let mut entries = backend.load()?;
        if entries.len() > capacity {
            log::warn!(
                "Stored credential list has {} entries, keeping {}",
                entries.len(),
                capacity
            );
            entries.truncate(capacity);
        }
        log::info!("Loaded {} stored network(s)", entries.len());
        Ok(Self {
            state: Mutex::new(StoreState { backend, entries }),
            capacity,
        })
    }

    fn lock(&self) -> MutexGuard<'_, StoreState<B>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Persist `entries` and make them current.
    fn commit(state: &mut StoreState<B>, entries: Vec<Credential>) -> Result<(), StorageError> {
        state.backend.save(&entries)?;
        state.entries = entries;
        Ok(())
    }

    /// Add or update a network.
    ///
    /// An existing SSID (exact, case-sensitive match) keeps its position;
    /// its password is replaced and its BSSID is replaced only when `bssid`
    /// is `Some`. A new SSID goes to the front, evicting the last entry if
    /// the list is full.
    pub fn add(&self, ssid: &str, password: &str, bssid: Option<Bssid>) -> Result<(), StorageError> {
        let mut state = self.lock();
        let mut entries = state.entries.clone();

        if let Some(existing) = entries.iter_mut().find(|c| c.ssid == ssid) {
            log::info!("Updating stored network {:?}", ssid);
            existing.password = password.to_string();
            if bssid.is_some() {
                existing.bssid = bssid;
            }
        } else {
            if entries.len() >= self.capacity {
                if let Some(evicted) = entries.pop() {
                    log::warn!("Credential list full, evicting {:?}", evicted.ssid);
                }
            }
            log::info!("Storing new network {:?}", ssid);
            entries.insert(0, Credential::new(ssid, password, bssid));
        }

        Self::commit(&mut state, entries)
    }

    /// Remove the entry at `index`. Out-of-range indices are logged and ignored.
    pub fn remove(&self, index: usize) -> Result<(), StorageError> {
        let mut state = self.lock();
        if index >= state.entries.len() {
            log::warn!("Invalid credential index {}", index);
            return Ok(());
        }
        let mut entries = state.entries.clone();
        entries.remove(index);
        Self::commit(&mut state, entries)
    }

    /// Move the entry at `index` to the front. Out-of-range indices are
    /// logged and ignored.
    pub fn set_default(&self, index: usize) -> Result<(), StorageError> {
        let mut state = self.lock();
        if index >= state.entries.len() {
            log::warn!("Invalid credential index {}", index);
            return Ok(());
        }
        let mut entries = state.entries.clone();
        let entry = entries.remove(index);
        entries.insert(0, entry);
        Self::commit(&mut state, entries)
    }

    /// Forget every stored network.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut state = self.lock();
        log::info!("Clearing {} stored network(s)", state.entries.len());
        Self::commit(&mut state, Vec::new())
    }

    /// Snapshot of the list, most recent first.
    pub fn list(&self) -> Vec<Credential> {
        self.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stored networks visible in `records`, in the order of `records`.
    ///
    /// A named record matches by SSID. A hidden record (empty SSID) matches
    /// a stored entry with the same BSSID.
    pub fn match_scan(&self, records: &[ScanRecord]) -> Vec<Credential> {
        let state = self.lock();
        let mut matched: Vec<Credential> = Vec::new();
        for record in records {
            let found = state.entries.iter().find(|c| {
                if record.ssid.is_empty() {
                    c.bssid == Some(record.bssid)
                } else {
                    c.ssid == record.ssid
                }
            });
            if let Some(credential) = found {
                if !matched.iter().any(|m| m.ssid == credential.ssid) {
                    matched.push(credential.clone());
                }
            }
        }
        matched
    }

    /// Persist the device binding.
    pub fn save_binding(&self, binding: &DeviceBinding) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.backend.save_binding(binding)?;
        log::info!(
            "Saved device binding uid={:?} need_activation={}",
            binding.uid,
            binding.need_activation
        );
        Ok(())
    }

    /// Load the device binding, if one was saved.
    pub fn binding(&self) -> Result<Option<DeviceBinding>, StorageError> {
        self.lock().backend.load_binding()
    }
}
