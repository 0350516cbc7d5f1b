//! Inbound command dispatch.
//!
//! A complete message (one frame, or several reassembled by
//! [`Reassembler`](super::Reassembler)) is turned into a [`ParsedCommand`]
//! by looking at its command code.

use super::fragmentation::Message;
use super::wifi_config::{parse_wifi_config, WifiConfigRecord};
use super::{Frame, ProtocolError, CMD_GET_WIFI_LIST, CMD_WIFI_CONFIG};

/// A command the device knows how to handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Connect to the given network and persist it.
    WifiConfig(WifiConfigRecord),
    /// Send back the ranked scan list.
    GetWifiList,
}

impl Command {
    /// Wire command code.
    pub fn code(&self) -> u8 {
        match self {
            Self::WifiConfig(_) => CMD_WIFI_CONFIG,
            Self::GetWifiList => CMD_GET_WIFI_LIST,
        }
    }
}

/// A command together with the header fields needed to answer it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Message id to echo in the response.
    pub msg_id: u8,
    /// Header version bits as sent by the peer.
    pub version: u8,
    /// The decoded command.
    pub command: Command,
}

impl ParsedCommand {
    /// Decode a reassembled message.
    pub fn from_message(message: &Message) -> Result<Self, ProtocolError> {
        let command = match message.cmd {
            CMD_WIFI_CONFIG => Command::WifiConfig(parse_wifi_config(&message.payload)?),
            CMD_GET_WIFI_LIST => Command::GetWifiList,
            other => return Err(ProtocolError::UnsupportedCommand(other)),
        };
        Ok(Self {
            msg_id: message.msg_id,
            version: message.version,
            command,
        })
    }
}

/// Parse a single self-contained frame into a command.
///
/// Multi-frame messages must go through a
/// [`Reassembler`](super::Reassembler) first; a frame that is only part of
/// a larger message is rejected with [`ProtocolError::InconsistentFrame`].
pub fn parse_provisioning_command(bytes: &[u8]) -> Result<ParsedCommand, ProtocolError> {
    let frame = Frame::from_bytes(bytes)?;
    frame.header.validate()?;
    if frame.header.total_frames != 1 {
        return Err(ProtocolError::InconsistentFrame(format!(
            "frame {} of {} needs reassembly",
            frame.header.seq, frame.header.total_frames
        )));
    }
    ParsedCommand::from_message(&Message::from_frame(frame))
}
