//! Radio failure codes.
//!
//! [`DisconnectReason`] wraps the 802.11/ESP-IDF disconnect reason carried
//! by asynchronous disassociation events. [`DriverError`] covers the
//! synchronous errors returned by the driver's configure/connect calls.

use std::fmt;

/// Reason code from a disassociation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisconnectReason(pub u16);

impl DisconnectReason {
    pub const UNSPECIFIED: Self = Self(1);
    pub const AUTH_EXPIRE: Self = Self(2);
    pub const AUTH_LEAVE: Self = Self(3);
    pub const ASSOC_EXPIRE: Self = Self(4);
    pub const ASSOC_TOOMANY: Self = Self(5);
    pub const NOT_AUTHED: Self = Self(6);
    pub const NOT_ASSOCED: Self = Self(7);
    pub const ASSOC_LEAVE: Self = Self(8);
    pub const ASSOC_NOT_AUTHED: Self = Self(9);
    pub const DISASSOC_PWRCAP_BAD: Self = Self(10);
    pub const DISASSOC_SUPCHAN_BAD: Self = Self(11);
    pub const BSS_TRANSITION_DISASSOC: Self = Self(12);
    pub const IE_INVALID: Self = Self(13);
    pub const MIC_FAILURE: Self = Self(14);
    pub const FOURWAY_HANDSHAKE_TIMEOUT: Self = Self(15);
    pub const GROUP_KEY_UPDATE_TIMEOUT: Self = Self(16);
    pub const IE_IN_4WAY_DIFFERS: Self = Self(17);
    pub const GROUP_CIPHER_INVALID: Self = Self(18);
    pub const PAIRWISE_CIPHER_INVALID: Self = Self(19);
    pub const AKMP_INVALID: Self = Self(20);
    pub const UNSUPP_RSN_IE_VERSION: Self = Self(21);
    pub const INVALID_RSN_IE_CAP: Self = Self(22);
    pub const IEEE_802_1X_AUTH_FAILED: Self = Self(23);
    pub const CIPHER_SUITE_REJECTED: Self = Self(24);
    pub const TDLS_PEER_UNREACHABLE: Self = Self(25);
    pub const TDLS_UNSPECIFIED: Self = Self(26);
    pub const SSP_REQUESTED_DISASSOC: Self = Self(27);
    pub const NO_SSP_ROAMING_AGREEMENT: Self = Self(28);
    pub const BAD_CIPHER_OR_AKM: Self = Self(29);
    pub const NOT_AUTHORIZED_THIS_LOCATION: Self = Self(30);
    pub const SERVICE_CHANGE_PRECLUDES_TS: Self = Self(31);
    pub const UNSPECIFIED_QOS: Self = Self(32);
    pub const NOT_ENOUGH_BANDWIDTH: Self = Self(33);
    pub const MISSING_ACKS: Self = Self(34);
    pub const EXCEEDED_TXOP: Self = Self(35);
    pub const STA_LEAVING: Self = Self(36);
    pub const END_BA: Self = Self(37);
    pub const UNKNOWN_BA: Self = Self(38);
    pub const TIMEOUT: Self = Self(39);
    pub const PEER_INITIATED: Self = Self(46);
    pub const AP_INITIATED: Self = Self(47);
    pub const INVALID_FT_ACTION_FRAME_COUNT: Self = Self(48);
    pub const INVALID_PMKID: Self = Self(49);
    pub const INVALID_MDE: Self = Self(50);
    pub const INVALID_FTE: Self = Self(51);
    pub const TRANSMISSION_LINK_ESTABLISH_FAILED: Self = Self(67);
    pub const ALTERNATIVE_CHANNEL_OCCUPIED: Self = Self(68);
    pub const BEACON_TIMEOUT: Self = Self(200);
    pub const NO_AP_FOUND: Self = Self(201);
    pub const AUTH_FAIL: Self = Self(202);
    pub const ASSOC_FAIL: Self = Self(203);
    pub const HANDSHAKE_TIMEOUT: Self = Self(204);
    pub const CONNECTION_FAIL: Self = Self(205);
    pub const AP_TSF_RESET: Self = Self(206);
    pub const ROAMING: Self = Self(207);
    pub const ASSOC_COMEBACK_TIME_TOO_LONG: Self = Self(208);
    pub const SA_QUERY_TIMEOUT: Self = Self(209);
    pub const NO_AP_FOUND_W_COMPATIBLE_SECURITY: Self = Self(210);
    pub const NO_AP_FOUND_IN_AUTHMODE_THRESHOLD: Self = Self(211);
    pub const NO_AP_FOUND_IN_RSSI_THRESHOLD: Self = Self(212);

    /// Raw reason code.
    pub fn code(self) -> u16 {
        self.0
    }

    /// Whether this reason points at wrong credentials.
    pub fn is_credential_failure(self) -> bool {
        matches!(
            self,
            Self::FOURWAY_HANDSHAKE_TIMEOUT
                | Self::AUTH_FAIL
                | Self::MIC_FAILURE
                | Self::CIPHER_SUITE_REJECTED
        )
    }

    /// Human-readable description.
    pub fn description(self) -> &'static str {
        match self.0 {
            1 => "Unspecified reason",
            2 => "Authentication expired",
            3 => "Authentication left",
            4 => "Association expired",
            5 => "Too many associations",
            6 => "Not authenticated",
            7 => "Not associated",
            8 => "Association left",
            9 => "Associated but not authenticated",
            10 => "Power capability mismatch",
            11 => "Supported channel mismatch",
            12 => "BSS transition disassociation",
            13 => "Invalid IE",
            14 => "MIC failure",
            15 => "4-way handshake timeout",
            16 => "Group key update timeout",
            17 => "4-way handshake IE differs",
            18 => "Group cipher invalid",
            19 => "Pairwise cipher invalid",
            20 => "AKMP invalid",
            21 => "Unsupported RSN IE version",
            22 => "Invalid RSN IE capability",
            23 => "802.1x authentication failed",
            24 => "Cipher suite rejected",
            25 => "TDLS peer unreachable",
            26 => "TDLS unspecified",
            27 => "SSP requested disassociation",
            28 => "No SSP roaming agreement",
            29 => "Bad cipher or AKM",
            30 => "Not authorized for this location",
            31 => "Service change precludes TS",
            32 => "Unspecified QoS",
            33 => "Not enough bandwidth",
            34 => "Missing ACKs",
            35 => "Exceeded TXOP",
            36 => "Station leaving",
            37 => "End BA",
            38 => "Unknown BA",
            39 => "Timeout",
            46 => "Peer initiated",
            47 => "AP initiated",
            48 => "Invalid FT action frame count",
            49 => "Invalid PMKID",
            50 => "Invalid MDE",
            51 => "Invalid FTE",
            67 => "Transmission link establish failed",
            68 => "Alternative channel occupied",
            200 => "Beacon timeout",
            201 => "No AP found",
            202 => "Authentication failed",
            203 => "Association failed",
            204 => "Handshake timeout",
            205 => "Connection failed",
            206 => "AP TSF reset",
            207 => "Roaming",
            208 => "Association comeback time too long",
            209 => "SA query timeout",
            210 => "No AP found with compatible security",
            211 => "No AP found in authmode threshold",
            212 => "No AP found in RSSI threshold",
            _ => "Unknown reason",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (reason {})", self.description(), self.0)
    }
}

/// Base of the ESP-IDF WiFi error code range.
const ESP_ERR_WIFI_BASE: i32 = 0x3000;

/// Error returned synchronously by the radio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverError {
    NotInit,
    NotStarted,
    Mode,
    State,
    Conn,
    Nvs,
    Ssid,
    Password,
    Timeout,
    /// Any other driver code.
    Other(i32),
}

impl DriverError {
    /// ESP-IDF error code.
    pub fn code(self) -> i32 {
        match self {
            Self::NotInit => ESP_ERR_WIFI_BASE + 1,
            Self::NotStarted => ESP_ERR_WIFI_BASE + 2,
            Self::Mode => ESP_ERR_WIFI_BASE + 5,
            Self::State => ESP_ERR_WIFI_BASE + 6,
            Self::Conn => ESP_ERR_WIFI_BASE + 7,
            Self::Nvs => ESP_ERR_WIFI_BASE + 8,
            Self::Ssid => ESP_ERR_WIFI_BASE + 10,
            Self::Password => ESP_ERR_WIFI_BASE + 11,
            Self::Timeout => ESP_ERR_WIFI_BASE + 12,
            Self::Other(code) => code,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code - ESP_ERR_WIFI_BASE {
            1 => Self::NotInit,
            2 => Self::NotStarted,
            5 => Self::Mode,
            6 => Self::State,
            7 => Self::Conn,
            8 => Self::Nvs,
            10 => Self::Ssid,
            11 => Self::Password,
            12 => Self::Timeout,
            _ => Self::Other(code),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotInit => "WiFi driver not initialized",
            Self::NotStarted => "WiFi driver not started",
            Self::Mode => "WiFi mode error",
            Self::State => "WiFi state error",
            Self::Conn => "WiFi connection error",
            Self::Nvs => "WiFi NVS error",
            Self::Ssid => "Invalid SSID",
            Self::Password => "Invalid password",
            Self::Timeout => "WiFi driver timeout",
            Self::Other(code) => return write!(f, "driver error 0x{:X}", code),
        };
        write!(f, "{} (0x{:X})", text, self.code())
    }
}

impl std::error::Error for DriverError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_failure_family() {
        for reason in [
            DisconnectReason::FOURWAY_HANDSHAKE_TIMEOUT,
            DisconnectReason::AUTH_FAIL,
            DisconnectReason::MIC_FAILURE,
            DisconnectReason::CIPHER_SUITE_REJECTED,
        ] {
            assert!(reason.is_credential_failure(), "{}", reason);
        }
        assert!(!DisconnectReason::NO_AP_FOUND.is_credential_failure());
        assert!(!DisconnectReason::HANDSHAKE_TIMEOUT.is_credential_failure());
    }

    #[test]
    fn test_reason_descriptions() {
        assert_eq!(DisconnectReason::AUTH_FAIL.description(), "Authentication failed");
        assert_eq!(DisconnectReason(45).description(), "Unknown reason");
        assert_eq!(
            DisconnectReason::NO_AP_FOUND.to_string(),
            "No AP found (reason 201)"
        );
    }

    #[test]
    fn test_driver_error_codes() {
        for err in [
            DriverError::NotInit,
            DriverError::NotStarted,
            DriverError::Mode,
            DriverError::State,
            DriverError::Conn,
            DriverError::Nvs,
            DriverError::Ssid,
            DriverError::Password,
            DriverError::Timeout,
        ] {
            assert_eq!(DriverError::from_code(err.code()), err);
        }
        assert_eq!(DriverError::Ssid.code(), 0x300A);
        assert_eq!(DriverError::from_code(0x101), DriverError::Other(0x101));
    }
}
