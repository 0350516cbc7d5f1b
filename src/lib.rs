//! WiFi provisioning firmware library.
//!
//! This library contains platform-independent components that can be tested
//! on the host machine without ESP32 hardware. ESP-IDF glue (radio, NVS,
//! NimBLE) is compiled only with the `esp32` feature.

#[cfg(feature = "esp32")]
pub mod ble;
pub mod config;
#[cfg(feature = "esp32")]
pub mod persistence;
pub mod persistence_host;
pub mod protocol;
pub mod provisioner;
pub mod store;
mod timing;
pub mod transport;
pub mod wifi;

// Re-export commonly used items
pub use config::{ConfigError, ProvisioningConfig};
pub use protocol::{
    parse_provisioning_command, Command, Fragmenter, ParsedCommand, ProtocolError, Reassembler,
};
pub use provisioner::{ProvisionError, Provisioner};
pub use store::{Credential, CredentialStore, StorageError};
pub use wifi::{ConnectError, ConnectionManager, FailureCause};
