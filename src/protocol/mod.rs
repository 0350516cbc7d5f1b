//! Provisioning wire protocol.
//!
//! This module contains the pure, transport-independent parts of the
//! protocol spoken over BLE and the SoftAP UDP socket:
//!
//! - [`header`]: 4-byte frame header codec
//! - [`wifi_config`]: WiFi-config payload parser (legacy and extended layouts)
//! - [`command`]: inbound command dispatch
//! - [`response`]: outbound response, notification and scan-list encoders
//! - [`fragmentation`]: outbound fragmentation and inbound reassembly

pub mod command;
mod error;
pub mod fragmentation;
pub mod header;
pub mod response;
pub mod wifi_config;

pub use command::{parse_provisioning_command, Command, ParsedCommand};
pub use error::ProtocolError;
pub use fragmentation::{Fragmenter, Message, Reassembler, SendError};
pub use header::{
    Frame, FrameHeader, PayloadFormat, HEADER_LEN, MAX_FRAMES, MAX_FRAME_PAYLOAD,
    MAX_MESSAGE_LEN, MAX_MSG_ID,
};
pub use response::{ProvisioningEvent, ResponseStatus, StatusNotification, WifiConfigResponse};
pub use wifi_config::{parse_wifi_config, LocaleInfo, PayloadLayout, WifiConfigRecord};

/// WiFi credentials from the peer.
pub const CMD_WIFI_CONFIG: u8 = 0x40;

/// Device response to a WiFi-config command.
pub const CMD_WIFI_CONFIG_RESPONSE: u8 = 0x41;

/// Provisioning phase notification.
pub const CMD_STATUS_NOTIFY: u8 = 0x42;

/// Request for the ranked scan list.
pub const CMD_GET_WIFI_LIST: u8 = 0x45;
