//! Outbound message encoders.
//!
//! # Response (cmd 0x41)
//!
//! ```text
//! [msg_id|ver][0x41][seq|frames][17][status][hw_ver:8][sw_ver:8]
//! ```
//!
//! 21 bytes total; `status` is 0x00 (OK) or 0x80 (error).
//!
//! # Status notification (cmd 0x42)
//!
//! Sent with message id [`NOTIFY_MSG_ID`] and payload
//! `[status][log_len][log...]`.
//!
//! # WiFi list (cmd 0x45)
//!
//! Payload is a run of `[ssid_len][ssid][level]` entries with no count
//! prefix, where `level` is `100 + rssi`. It may span several frames.

use super::{
    Frame, FrameHeader, ProtocolError, CMD_STATUS_NOTIFY, CMD_WIFI_CONFIG_RESPONSE,
    MAX_FRAME_PAYLOAD, MAX_MESSAGE_LEN,
};

/// Length of the version strings in a response.
pub const VERSION_LEN: usize = 8;

/// Payload length of a WiFi-config response.
pub const RESPONSE_PAYLOAD_LEN: u8 = 1 + 2 * VERSION_LEN as u8;

/// Message id used for status notifications.
pub const NOTIFY_MSG_ID: u8 = 0x04;

/// Longest log text carried by a notification.
pub const MAX_NOTIFY_LOG_LEN: usize = MAX_FRAME_PAYLOAD - 10;

/// Outcome byte of a WiFi-config response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    Error,
}

impl ResponseStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Ok => 0x00,
            Self::Error => 0x80,
        }
    }
}

/// Answer to a WiFi-config command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiConfigResponse {
    pub msg_id: u8,
    pub version: u8,
    pub status: ResponseStatus,
    pub hardware_version: [u8; VERSION_LEN],
    pub software_version: [u8; VERSION_LEN],
}

impl WifiConfigResponse {
    /// Encode into a single 21-byte frame.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut payload = Vec::with_capacity(RESPONSE_PAYLOAD_LEN as usize);
        payload.push(self.status.code());
        payload.extend_from_slice(&self.hardware_version);
        payload.extend_from_slice(&self.software_version);

        let header = FrameHeader::new(self.msg_id, CMD_WIFI_CONFIG_RESPONSE)
            .with_version(self.version);
        Frame::new(header, payload)?.to_bytes()
    }
}

/// Provisioning phase reported to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningEvent {
    InvalidPackage,
    Connecting,
    ConnectFailed,
    Registering,
    RegisterFailed,
    Provisioning,
    ProvisionFailed,
    ConnectingCloud,
    CloudConnectFailed,
    CloudConnected,
}

impl ProvisioningEvent {
    /// Wire status code (0x01-0x0A).
    pub fn code(self) -> u8 {
        match self {
            Self::InvalidPackage => 0x01,
            Self::Connecting => 0x02,
            Self::ConnectFailed => 0x03,
            Self::Registering => 0x04,
            Self::RegisterFailed => 0x05,
            Self::Provisioning => 0x06,
            Self::ProvisionFailed => 0x07,
            Self::ConnectingCloud => 0x08,
            Self::CloudConnectFailed => 0x09,
            Self::CloudConnected => 0x0A,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x01 => Self::InvalidPackage,
            0x02 => Self::Connecting,
            0x03 => Self::ConnectFailed,
            0x04 => Self::Registering,
            0x05 => Self::RegisterFailed,
            0x06 => Self::Provisioning,
            0x07 => Self::ProvisionFailed,
            0x08 => Self::ConnectingCloud,
            0x09 => Self::CloudConnectFailed,
            0x0A => Self::CloudConnected,
            _ => return None,
        })
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::InvalidPackage => "invalid package",
            Self::Connecting => "connecting to router",
            Self::ConnectFailed => "router connection failed",
            Self::Registering => "registering device",
            Self::RegisterFailed => "device registration failed",
            Self::Provisioning => "provisioning",
            Self::ProvisionFailed => "provisioning failed",
            Self::ConnectingCloud => "connecting to cloud",
            Self::CloudConnectFailed => "cloud connection failed",
            Self::CloudConnected => "cloud connected",
        }
    }
}

/// Status notification with optional log text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusNotification {
    pub event: ProvisioningEvent,
    pub log: String,
}

impl StatusNotification {
    pub fn new(event: ProvisioningEvent) -> Self {
        Self {
            event,
            log: String::new(),
        }
    }

    pub fn with_log(event: ProvisioningEvent, log: impl Into<String>) -> Self {
        Self {
            event,
            log: log.into(),
        }
    }

    /// Encode into a single frame; overlong logs are cut at a char boundary.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let log = truncate_utf8(&self.log, MAX_NOTIFY_LOG_LEN);
        let mut payload = Vec::with_capacity(2 + log.len());
        payload.push(self.event.code());
        payload.push(log.len() as u8);
        payload.extend_from_slice(log.as_bytes());

        Frame::new(FrameHeader::new(NOTIFY_MSG_ID, CMD_STATUS_NOTIFY), payload)?.to_bytes()
    }
}

/// Build the cmd 0x45 payload from ranked `(ssid, rssi)` pairs.
///
/// Entries are `[ssid_len][ssid][100 + rssi]` back to back. Entries that
/// would push the message past the 16-frame limit are dropped.
pub fn encode_wifi_list<'a, I>(entries: I) -> Vec<u8>
where
    I: IntoIterator<Item = (&'a str, i8)>,
{
    let mut payload = Vec::new();
    for (ssid, rssi) in entries {
        if ssid.len() > u8::MAX as usize {
            continue;
        }
        if payload.len() + ssid.len() + 2 > MAX_MESSAGE_LEN {
            break;
        }
        payload.push(ssid.len() as u8);
        payload.extend_from_slice(ssid.as_bytes());
        payload.push(signal_level(rssi));
    }
    payload
}

/// Map an RSSI in dBm onto the 0..=100 scale peers display.
pub fn signal_level(rssi: i8) -> u8 {
    (100 + i16::from(rssi)).clamp(0, u8::MAX as i16) as u8
}

/// Pad or cut a version string to exactly eight bytes.
pub fn version_bytes(version: &str) -> [u8; VERSION_LEN] {
    let mut out = [0u8; VERSION_LEN];
    let bytes = version.as_bytes();
    let len = bytes.len().min(VERSION_LEN);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
