//! Provisioning configuration.
//!
//! All tunables of the provisioning core live in [`ProvisioningConfig`].
//! The defaults match what deployed peers expect; tests shrink the delays.
//!
//! # Example
//!
//! ```
//! use wifi_provision_esp32::config::ProvisioningConfig;
//! use std::time::Duration;
//!
//! let config = ProvisioningConfig {
//!     retry_backoff: Duration::ZERO,
//!     ..Default::default()
//! };
//! assert_eq!(config.max_retries, 5);
//! assert!(config.validate().is_ok());
//! ```

use crate::protocol::response::{version_bytes, VERSION_LEN};
use crate::protocol::MAX_FRAME_PAYLOAD;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// SoftAP address the UDP provisioning socket listens on.
pub const SOFTAP_IP: Ipv4Addr = Ipv4Addr::new(10, 10, 100, 254);

/// UDP provisioning port.
pub const SOFTAP_UDP_PORT: u16 = 12414;

/// Default UDP provisioning endpoint.
pub const DEFAULT_UDP_ENDPOINT: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(SOFTAP_IP, SOFTAP_UDP_PORT));

/// Tunables for the connection state machine, stores and transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
    /// Connect attempts per provisioning request.
    pub max_retries: u32,
    /// Wait for an association outcome per attempt.
    pub attempt_timeout: Duration,
    /// Pause between failed attempts.
    pub retry_backoff: Duration,
    /// Pause after each outbound frame.
    pub frame_delay: Duration,
    /// Payload bytes per outbound frame.
    pub max_frame_payload: usize,
    /// Stored networks.
    pub credential_capacity: usize,
    /// Ranked scan entries kept.
    pub max_scan_results: usize,
    /// Period of background scans.
    pub scan_interval: Duration,
    /// Lifetime of a partially received message.
    pub reassembly_timeout: Duration,
    /// Reported in WiFi-config responses.
    pub hardware_version: [u8; VERSION_LEN],
    pub software_version: [u8; VERSION_LEN],
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            attempt_timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(1),
            frame_delay: Duration::from_millis(50),
            max_frame_payload: MAX_FRAME_PAYLOAD,
            credential_capacity: 10,
            max_scan_results: 30,
            scan_interval: Duration::from_secs(5),
            reassembly_timeout: Duration::from_secs(5),
            hardware_version: version_bytes("HW1.0"),
            software_version: version_bytes(env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ProvisioningConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1"));
        }
        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::Invalid("attempt_timeout must be non-zero"));
        }
        if self.max_frame_payload == 0 || self.max_frame_payload > MAX_FRAME_PAYLOAD {
            return Err(ConfigError::Invalid("max_frame_payload must be 1-251"));
        }
        if self.credential_capacity == 0 {
            return Err(ConfigError::Invalid("credential_capacity must be at least 1"));
        }
        Ok(())
    }
}

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProvisioningConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.attempt_timeout, Duration::from_secs(10));
        assert_eq!(config.retry_backoff, Duration::from_secs(1));
        assert_eq!(config.frame_delay, Duration::from_millis(50));
        assert_eq!(config.max_frame_payload, 251);
        assert_eq!(config.credential_capacity, 10);
        assert_eq!(config.max_scan_results, 30);
        assert_eq!(&config.hardware_version, b"HW1.0\0\0\0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            ProvisioningConfig { max_retries: 0, ..Default::default() },
            ProvisioningConfig { attempt_timeout: Duration::ZERO, ..Default::default() },
            ProvisioningConfig { max_frame_payload: 252, ..Default::default() },
            ProvisioningConfig { credential_capacity: 0, ..Default::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_softap_endpoint() {
        assert_eq!(DEFAULT_UDP_ENDPOINT.to_string(), "10.10.100.254:12414");
    }
}
