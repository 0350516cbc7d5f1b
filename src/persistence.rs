//! Credential persistence in ESP32 Non-Volatile Storage (NVS).
//!
//! The credential list and the device binding are stored as JSON blobs
//! under the `wifi` namespace. Every write is read back and compared to
//! catch silent flash failures.
//!
//! # Usage
//!
//! ```ignore
//! use wifi_provision_esp32::persistence::{init_nvs, NvsBackend};
//! use wifi_provision_esp32::store::{CredentialStore, DEFAULT_CAPACITY};
//!
//! let nvs = init_nvs(partition.clone())?;
//! let store = CredentialStore::open(NvsBackend::new(nvs), DEFAULT_CAPACITY)?;
//! ```

use crate::store::{Credential, CredentialBackend, DeviceBinding, StorageError};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_sys::EspError;
use log::{debug, error, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use zeroize::Zeroizing;

/// NVS namespace for provisioning data.
const NVS_NAMESPACE: &str = "wifi";

/// NVS key for the credential list.
const CREDENTIALS_KEY: &str = "ssid_list";

/// NVS key for the device binding.
const BINDING_KEY: &str = "binding";

/// Upper bound of a serialized blob.
///
/// Ten credentials with maximum-length SSID, password and BSSID stay well
/// below this.
const MAX_BLOB_LEN: usize = 4096;

fn backend_error(context: &str, e: EspError) -> StorageError {
    StorageError::Backend(format!("{}: {:?}", context, e))
}

/// Open the provisioning namespace.
pub fn init_nvs(partition: EspDefaultNvsPartition) -> Result<EspNvs<NvsDefault>, EspError> {
    EspNvs::new(partition, NVS_NAMESPACE, true)
}

/// [`CredentialBackend`] over an NVS namespace.
pub struct NvsBackend {
    nvs: EspNvs<NvsDefault>,
}

impl NvsBackend {
    pub fn new(nvs: EspNvs<NvsDefault>) -> Self {
        Self { nvs }
    }

    fn read_blob<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let mut buf = Zeroizing::new(vec![0u8; MAX_BLOB_LEN]);
        match self.nvs.get_raw(key, &mut buf) {
            Ok(Some(bytes)) => Ok(Some(serde_json::from_slice(bytes)?)),
            Ok(None) => {
                debug!("No {} in NVS", key);
                Ok(None)
            }
            Err(e) => Err(backend_error("NVS read failed", e)),
        }
    }

    fn write_blob<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), StorageError> {
        let bytes = Zeroizing::new(serde_json::to_vec(value)?);
        if bytes.len() > MAX_BLOB_LEN {
            return Err(StorageError::Serialization(format!(
                "{} is {} bytes, limit {}",
                key,
                bytes.len(),
                MAX_BLOB_LEN
            )));
        }
        self.nvs
            .set_raw(key, &bytes)
            .map_err(|e| backend_error("NVS write failed", e))?;

        // Read back and verify to catch silent flash write failures
        let mut verify = Zeroizing::new(vec![0u8; MAX_BLOB_LEN]);
        let read_back = self
            .nvs
            .get_raw(key, &mut verify)
            .map_err(|e| backend_error("NVS read-back failed", e))?;
        if read_back != Some(&bytes[..]) {
            error!("NVS verification failed for {}", key);
            return Err(StorageError::Backend(format!("verification failed for {}", key)));
        }
        Ok(())
    }
}

impl CredentialBackend for NvsBackend {
    fn load(&mut self) -> Result<Vec<Credential>, StorageError> {
        let list: Vec<Credential> = self.read_blob(CREDENTIALS_KEY)?.unwrap_or_default();
        info!("Loaded {} credential(s) from NVS", list.len());
        Ok(list)
    }

    fn save(&mut self, credentials: &[Credential]) -> Result<(), StorageError> {
        self.write_blob(CREDENTIALS_KEY, credentials)?;
        debug!("Saved {} credential(s) to NVS", credentials.len());
        Ok(())
    }

    fn load_binding(&mut self) -> Result<Option<DeviceBinding>, StorageError> {
        self.read_blob(BINDING_KEY)
    }

    fn save_binding(&mut self, binding: &DeviceBinding) -> Result<(), StorageError> {
        self.write_blob(BINDING_KEY, binding)?;
        info!("Saved device binding (need_activation={})", binding.need_activation);
        Ok(())
    }
}
