//! Credential persistence for host (development) builds.
//!
//! Stores the credential list and device binding as one JSON document.
//! Uses `~/.wifi-provision-esp32/credentials.json` by default.
//!
//! # Usage
//!
//! ```ignore
//! use wifi_provision_esp32::persistence_host::FileBackend;
//! use wifi_provision_esp32::store::{CredentialStore, DEFAULT_CAPACITY};
//!
//! let backend = FileBackend::at_default_path()?;
//! let store = CredentialStore::open(backend, DEFAULT_CAPACITY)?;
//! ```

use crate::store::{Credential, CredentialBackend, DeviceBinding, StorageError};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Get the default credential file path.
///
/// Returns `~/.wifi-provision-esp32/credentials.json`
pub fn default_store_path() -> io::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home)
        .join(".wifi-provision-esp32")
        .join("credentials.json"))
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    credentials: Vec<Credential>,
    #[serde(default)]
    binding: Option<DeviceBinding>,
}

/// JSON file backend.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash leaves either the old or the new document.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn at_default_path() -> io::Result<Self> {
        Ok(Self::new(default_store_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoreFile, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No credential file at {:?}", self.path);
                Ok(StoreFile::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, file: &StoreFile) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(file)?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut out = File::create(&tmp)?;
            out.write_all(&bytes)?;
            out.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        sync_parent(&self.path)?;
        debug!("Credential file written to {:?}", self.path);
        Ok(())
    }
}

/// Flush the directory entry so the rename itself survives power loss.
#[cfg(unix)]
fn sync_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => File::open(dir)?.sync_all(),
        _ => File::open(".")?.sync_all(),
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> io::Result<()> {
    Ok(())
}

impl CredentialBackend for FileBackend {
    fn load(&mut self) -> Result<Vec<Credential>, StorageError> {
        let file = self.read()?;
        info!("Loaded {} credential(s) from {:?}", file.credentials.len(), self.path);
        Ok(file.credentials)
    }

    fn save(&mut self, credentials: &[Credential]) -> Result<(), StorageError> {
        let mut file = self.read()?;
        file.credentials = credentials.to_vec();
        self.write(&file)
    }

    fn load_binding(&mut self) -> Result<Option<DeviceBinding>, StorageError> {
        Ok(self.read()?.binding)
    }

    fn save_binding(&mut self, binding: &DeviceBinding) -> Result<(), StorageError> {
        let mut file = self.read()?;
        file.binding = Some(binding.clone());
        self.write(&file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CredentialStore;
    use crate::wifi::Bssid;
    use std::env;
    use std::sync::atomic::{AtomicU32, Ordering};

    // Counter to ensure unique test files even in parallel execution
    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_store_path() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        env::temp_dir().join(format!("wifi-provision-test-{}-{}.json", pid, id))
    }

    #[test]
    fn test_missing_file_is_empty() {
        let mut backend = FileBackend::new(unique_store_path());
        assert!(backend.load().unwrap().is_empty());
        assert_eq!(backend.load_binding().unwrap(), None);
    }

    #[test]
    fn test_store_survives_reopen() {
        let path = unique_store_path();
        let bssid: Bssid = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        {
            let store = CredentialStore::open(FileBackend::new(&path), 10).unwrap();
            store.add("Home", "secret123", Some(bssid)).unwrap();
            store.add("Office", "officepw", None).unwrap();
        }

        let store = CredentialStore::open(FileBackend::new(&path), 10).unwrap();
        let list = store.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].ssid, "Office");
        assert_eq!(list[1].bssid, Some(bssid));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_binding_and_credentials_coexist() {
        let path = unique_store_path();
        let mut backend = FileBackend::new(&path);
        backend
            .save(&[Credential::new("Home", "secret123", None)])
            .unwrap();
        let binding = DeviceBinding {
            uid: "user42".to_string(),
            need_activation: true,
            locale: None,
        };
        backend.save_binding(&binding).unwrap();

        assert_eq!(backend.load().unwrap().len(), 1);
        assert_eq!(backend.load_binding().unwrap(), Some(binding));
        assert!(!path.with_extension("json.tmp").exists());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_stale_temp_file_is_replaced() {
        let path = unique_store_path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, vec![b'x'; 4096]).unwrap();

        let mut backend = FileBackend::new(&path);
        backend
            .save(&[Credential::new("Home", "secret123", None)])
            .unwrap();

        assert!(!tmp.exists());
        let list = FileBackend::new(&path).load().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].ssid, "Home");

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let path = unique_store_path();
        fs::write(&path, b"{not json").unwrap();
        let mut backend = FileBackend::new(&path);
        assert!(matches!(backend.load(), Err(StorageError::Serialization(_))));
        let _ = fs::remove_file(&path);
    }
}
