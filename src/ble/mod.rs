//! BLE provisioning transport (ESP32 only).
//!
//! # GATT Service Structure
//!
//! ```text
//! Service: WiFi Provisioning
//! ├── Write (Write, Write Without Response) - inbound frames
//! └── Notify (Read, Notify) - outbound frames
//! ```
//!
//! NimBLE callbacks only queue inbound frames; a worker thread decodes them
//! so a running connect call never stalls the BLE host task.

mod service;

pub use service::{BleProvisioningService, BleServiceError, DEVICE_NAME};
