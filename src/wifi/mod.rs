//! WiFi station management.
//!
//! # Components
//!
//! - [`connection`] - connect/retry state machine driven by radio events
//! - [`reason`] - ESP-IDF disconnect reasons and driver error codes
//! - [`scan`] - BSSIDs and the ranked scan cache
//! - [`scheduler`] - periodic background scans
//! - [`simulated`] - in-process radio for host builds and tests
//! - `esp_radio` - ESP-IDF radio (ESP32 only)

pub mod connection;
pub mod reason;
pub mod scan;
pub mod scheduler;
pub mod simulated;

#[cfg(feature = "esp32")]
mod esp_radio;

pub use connection::{
    ConnectError, Connected, ConnectionManager, ConnectionState, FailureCause, Radio, RadioEvent,
};
pub use reason::{DisconnectReason, DriverError};
pub use scan::{Bssid, ScanCache, ScanEntry, ScanRecord, MAX_SCAN_RESULTS};
pub use scheduler::spawn_scan_scheduler;

#[cfg(feature = "esp32")]
pub use esp_radio::EspRadio;
