//! Frame header codec.
//!
//! Every provisioning frame starts with a 4-byte bit-packed header followed
//! by `frame_len` payload bytes. The same format is used on BLE and UDP.
//!
//! # Header Format
//!
//! ```text
//! byte 0: [reserved:1][ver:2][msg_id:5]     (msg_id in the low bits)
//! byte 1: [cmd:8]
//! byte 2: [frames:4][seq:4]                 (frames = total_frames - 1)
//! byte 3: [frame_len:8]
//! ```
//!
//! # Example
//!
//! ```
//! use wifi_provision_esp32::protocol::FrameHeader;
//!
//! let header = FrameHeader::new(3, 0x40).with_frames(1, 2).with_frame_len(20);
//! let bytes = header.encode().unwrap();
//! assert_eq!(bytes, [0x03, 0x40, 0x11, 20]);
//! assert_eq!(FrameHeader::decode(bytes), header);
//! ```

use super::ProtocolError;

/// Header size in bytes.
pub const HEADER_LEN: usize = 4;

/// Largest message identifier (5 bits).
pub const MAX_MSG_ID: u8 = 0x1F;

/// Largest payload format version (2 bits).
pub const MAX_VERSION: u8 = 0x03;

/// Largest frame sequence number (4 bits).
pub const MAX_SEQ: u8 = 0x0F;

/// Largest number of frames in one message (4-bit `frames` field + 1).
pub const MAX_FRAMES: u8 = 16;

/// Largest payload carried by a single frame.
pub const MAX_FRAME_PAYLOAD: usize = 251;

/// Largest logical message that can be expressed across all frames.
pub const MAX_MESSAGE_LEN: usize = MAX_FRAMES as usize * MAX_FRAME_PAYLOAD;

/// Payload format version carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Data-point layout used by the WiFi provisioning commands.
    Legacy,
    /// Alternate (protobuf) layout.
    Alternate,
    /// Opaque passthrough.
    Passthrough,
    /// Value 3, not assigned.
    Reserved,
}

impl PayloadFormat {
    /// Decode the 2-bit version field.
    pub fn from_bits(bits: u8) -> Self {
        match bits & MAX_VERSION {
            0 => Self::Legacy,
            1 => Self::Alternate,
            2 => Self::Passthrough,
            _ => Self::Reserved,
        }
    }

    /// The 2-bit value for this format.
    pub fn bits(self) -> u8 {
        match self {
            Self::Legacy => 0,
            Self::Alternate => 1,
            Self::Passthrough => 2,
            Self::Reserved => 3,
        }
    }
}

/// Decoded frame header.
///
/// `total_frames` is the real frame count (1-16); the wire field stores
/// `total_frames - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Message identifier (0-31).
    pub msg_id: u8,
    /// Payload format version (0-3).
    pub version: u8,
    /// Reserved bit, carried through unchanged.
    pub reserved: bool,
    /// Command code.
    pub cmd: u8,
    /// Index of this frame within the message (0-15).
    pub seq: u8,
    /// Number of frames in the message (1-16).
    pub total_frames: u8,
    /// Payload bytes in this frame.
    pub frame_len: u8,
}

impl FrameHeader {
    /// Header for a single-frame message with an empty payload.
    pub fn new(msg_id: u8, cmd: u8) -> Self {
        Self {
            msg_id,
            version: 0,
            reserved: false,
            cmd,
            seq: 0,
            total_frames: 1,
            frame_len: 0,
        }
    }

    /// Set the frame position within a multi-frame message.
    pub fn with_frames(mut self, seq: u8, total_frames: u8) -> Self {
        self.seq = seq;
        self.total_frames = total_frames;
        self
    }

    /// Set the payload length of this frame.
    pub fn with_frame_len(mut self, frame_len: u8) -> Self {
        self.frame_len = frame_len;
        self
    }

    /// Set the payload format version.
    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Payload format declared by the version bits.
    pub fn format(&self) -> PayloadFormat {
        PayloadFormat::from_bits(self.version)
    }

    /// Encode into the 4-byte wire representation.
    ///
    /// Fields that do not fit their bit width are rejected rather than
    /// truncated.
    pub fn encode(&self) -> Result<[u8; HEADER_LEN], ProtocolError> {
        check_range("msg_id", self.msg_id as usize, MAX_MSG_ID as usize)?;
        check_range("version", self.version as usize, MAX_VERSION as usize)?;
        check_range("seq", self.seq as usize, MAX_SEQ as usize)?;
        if self.total_frames == 0 {
            return Err(ProtocolError::OutOfRange {
                field: "total_frames",
                value: 0,
                max: MAX_FRAMES as usize,
            });
        }
        check_range(
            "total_frames",
            self.total_frames as usize,
            MAX_FRAMES as usize,
        )?;

        Ok([
            self.msg_id | (self.version << 5) | ((self.reserved as u8) << 7),
            self.cmd,
            self.seq | ((self.total_frames - 1) << 4),
            self.frame_len,
        ])
    }

    /// Decode the 4-byte wire representation.
    ///
    /// Pure bit extraction: every 4-byte input decodes. Use
    /// [`FrameHeader::validate`] to check the cross-field invariants.
    pub fn decode(bytes: [u8; HEADER_LEN]) -> Self {
        Self {
            msg_id: bytes[0] & MAX_MSG_ID,
            version: (bytes[0] >> 5) & MAX_VERSION,
            reserved: (bytes[0] >> 7) & 0x01 != 0,
            cmd: bytes[1],
            seq: bytes[2] & 0x0F,
            total_frames: ((bytes[2] >> 4) & 0x0F) + 1,
            frame_len: bytes[3],
        }
    }

    /// Decode the header at the start of `bytes`.
    pub fn decode_prefix(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let head: [u8; HEADER_LEN] = bytes
            .get(..HEADER_LEN)
            .and_then(|h| h.try_into().ok())
            .ok_or(ProtocolError::TooShort {
                len: bytes.len(),
                min: HEADER_LEN,
            })?;
        Ok(Self::decode(head))
    }

    /// Check that the sequence number lies within the declared frame count.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.seq >= self.total_frames {
            return Err(ProtocolError::InconsistentFrame(format!(
                "seq {} outside {} frames",
                self.seq, self.total_frames
            )));
        }
        Ok(())
    }
}

fn check_range(field: &'static str, value: usize, max: usize) -> Result<(), ProtocolError> {
    if value > max {
        return Err(ProtocolError::OutOfRange { field, value, max });
    }
    Ok(())
}

/// A single frame: header plus exactly `frame_len` payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded header.
    pub header: FrameHeader,
    /// Payload bytes of this frame.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a frame, filling in `frame_len` from the payload.
    pub fn new(header: FrameHeader, payload: Vec<u8>) -> Result<Self, ProtocolError> {
        if payload.len() > u8::MAX as usize {
            return Err(ProtocolError::OutOfRange {
                field: "frame_len",
                value: payload.len(),
                max: u8::MAX as usize,
            });
        }
        let header = header.with_frame_len(payload.len() as u8);
        Ok(Self { header, payload })
    }

    /// Parse one frame from raw transport bytes.
    ///
    /// The trailing byte count must equal the header's `frame_len`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let header = FrameHeader::decode_prefix(bytes)?;
        let payload = &bytes[HEADER_LEN..];
        if payload.len() != header.frame_len as usize {
            return Err(ProtocolError::LengthMismatch {
                declared: header.frame_len as usize,
                actual: payload.len(),
            });
        }
        Ok(Self {
            header,
            payload: payload.to_vec(),
        })
    }

    /// Serialize to header + payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len());
        bytes.extend_from_slice(&self.header.encode()?);
        bytes.extend_from_slice(&self.payload);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Header Codec Tests ====================

    #[test]
    fn test_encode_known_bytes() {
        let header = FrameHeader {
            msg_id: 0x1F,
            version: 2,
            reserved: true,
            cmd: 0x45,
            seq: 3,
            total_frames: 4,
            frame_len: 251,
        };
        assert_eq!(header.encode().unwrap(), [0xDF, 0x45, 0x33, 251]);
    }

    #[test]
    fn test_decode_known_bytes() {
        let header = FrameHeader::decode([0x24, 0x40, 0x00, 0x10]);
        assert_eq!(header.msg_id, 4);
        assert_eq!(header.version, 1);
        assert!(!header.reserved);
        assert_eq!(header.cmd, 0x40);
        assert_eq!(header.seq, 0);
        assert_eq!(header.total_frames, 1);
        assert_eq!(header.frame_len, 16);
        assert_eq!(header.format(), PayloadFormat::Alternate);
    }

    #[test]
    fn test_roundtrip_field_extremes() {
        for msg_id in [0, 1, 17, MAX_MSG_ID] {
            for version in 0..=MAX_VERSION {
                for reserved in [false, true] {
                    for (seq, total) in [(0, 1), (15, 1), (0, 16), (7, 9), (15, 16)] {
                        for frame_len in [0u8, 1, 128, 255] {
                            let header = FrameHeader {
                                msg_id,
                                version,
                                reserved,
                                cmd: msg_id.wrapping_mul(9),
                                seq,
                                total_frames: total,
                                frame_len,
                            };
                            let bytes = header.encode().unwrap();
                            assert_eq!(FrameHeader::decode(bytes), header);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_encode_rejects_msg_id_overflow() {
        let header = FrameHeader::new(32, 0x40);
        assert_eq!(
            header.encode(),
            Err(ProtocolError::OutOfRange {
                field: "msg_id",
                value: 32,
                max: 31
            })
        );
    }

    #[test]
    fn test_encode_rejects_bad_frame_counts() {
        assert!(FrameHeader::new(1, 0x40).with_frames(16, 16).encode().is_err());
        assert!(FrameHeader::new(1, 0x40).with_frames(0, 0).encode().is_err());
        assert!(FrameHeader::new(1, 0x40).with_frames(0, 17).encode().is_err());
        assert!(FrameHeader::new(1, 0x40).with_version(4).encode().is_err());
    }

    #[test]
    fn test_validate_seq_within_total() {
        assert!(FrameHeader::new(1, 0x40).with_frames(1, 2).validate().is_ok());
        assert!(matches!(
            FrameHeader::new(1, 0x40).with_frames(2, 2).validate(),
            Err(ProtocolError::InconsistentFrame(_))
        ));
    }

    #[test]
    fn test_payload_format_bits() {
        for bits in 0..=MAX_VERSION {
            assert_eq!(PayloadFormat::from_bits(bits).bits(), bits);
        }
        assert_eq!(PayloadFormat::from_bits(2), PayloadFormat::Passthrough);
    }

    // ==================== Frame Tests ====================

    #[test]
    fn test_frame_from_bytes() {
        let frame = Frame::from_bytes(&[0x02, 0x45, 0x00, 0x02, 0xAA, 0xBB]).unwrap();
        assert_eq!(frame.header.msg_id, 2);
        assert_eq!(frame.header.cmd, 0x45);
        assert_eq!(frame.payload, vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_frame_length_mismatch() {
        assert_eq!(
            Frame::from_bytes(&[0x02, 0x45, 0x00, 0x03, 0xAA]),
            Err(ProtocolError::LengthMismatch {
                declared: 3,
                actual: 1
            })
        );
    }

    #[test]
    fn test_frame_too_short() {
        assert!(matches!(
            Frame::from_bytes(&[0x02, 0x45]),
            Err(ProtocolError::TooShort { len: 2, min: 4 })
        ));
    }

    #[test]
    fn test_frame_new_sets_len() {
        let frame = Frame::new(FrameHeader::new(5, 0x41), vec![1, 2, 3]).unwrap();
        assert_eq!(frame.header.frame_len, 3);
        assert_eq!(frame.to_bytes().unwrap(), vec![0x05, 0x41, 0x00, 3, 1, 2, 3]);
        assert!(Frame::new(FrameHeader::new(5, 0x41), vec![0; 256]).is_err());
    }
}
