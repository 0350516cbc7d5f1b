//! Message fragmentation and reassembly.
//!
//! A logical message longer than one frame is split into up to 16 frames.
//! Every frame carries the shared `msg_id`, its 0-based `seq` and the total
//! frame count; concatenating the payloads in `seq` order yields the
//! original message.
//!
//! # Peer Tracking
//!
//! The [`Reassembler`] keys partial messages by `(peer, msg_id)`, so two
//! peers (BLE connection handles, UDP socket addresses) can interleave
//! frames without corrupting each other.
//!
//! # Example
//!
//! ```
//! use wifi_provision_esp32::protocol::{Fragmenter, Reassembler};
//! use std::time::Duration;
//!
//! let fragmenter = Fragmenter::try_new(251, Duration::ZERO).unwrap();
//! let payload: Vec<u8> = (0..=255).cycle().take(600).collect();
//! let frames = fragmenter.fragment(3, 0x45, &payload).unwrap();
//! assert_eq!(frames.len(), 3);
//!
//! let mut reassembler = Reassembler::new(Duration::from_secs(5));
//! let mut complete = None;
//! for frame in frames {
//!     complete = reassembler.add_frame("peer", frame).unwrap();
//! }
//! assert_eq!(complete.unwrap().payload, payload);
//! ```

use super::{Frame, FrameHeader, ProtocolError, MAX_FRAMES, MAX_FRAME_PAYLOAD, MAX_MESSAGE_LEN};
use crate::timing::sleep_unless_cancelled;
use crate::transport::FrameSink;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::io;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Default maximum number of concurrent pending reassemblies.
const DEFAULT_MAX_PENDING: usize = 8;

/// A complete logical message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_id: u8,
    pub version: u8,
    pub cmd: u8,
    pub payload: Vec<u8>,
}

impl Message {
    /// Wrap a single-frame message.
    pub fn from_frame(frame: Frame) -> Self {
        Self {
            msg_id: frame.header.msg_id,
            version: frame.header.version,
            cmd: frame.header.cmd,
            payload: frame.payload,
        }
    }
}

/// Errors from [`Fragmenter::send`].
#[derive(Debug)]
pub enum SendError {
    /// The message cannot be framed.
    Protocol(ProtocolError),
    /// The transport rejected a frame.
    Io(io::Error),
    /// Cancelled between frames.
    Cancelled,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(e) => write!(f, "framing error: {}", e),
            Self::Io(e) => write!(f, "transport error: {}", e),
            Self::Cancelled => write!(f, "send cancelled"),
        }
    }
}

impl std::error::Error for SendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Protocol(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Cancelled => None,
        }
    }
}

impl From<ProtocolError> for SendError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<io::Error> for SendError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Splits outbound messages into frames and paces their delivery.
#[derive(Debug, Clone)]
pub struct Fragmenter {
    /// Maximum payload bytes per frame.
    max_payload: usize,
    /// Pause after every frame handed to the transport.
    frame_delay: Duration,
}

impl Default for Fragmenter {
    fn default() -> Self {
        Self {
            max_payload: MAX_FRAME_PAYLOAD,
            frame_delay: Duration::from_millis(50),
        }
    }
}

impl Fragmenter {
    /// Create a fragmenter.
    ///
    /// `max_payload` must be between 1 and 251 bytes.
    pub fn try_new(max_payload: usize, frame_delay: Duration) -> Result<Self, ProtocolError> {
        if max_payload == 0 || max_payload > MAX_FRAME_PAYLOAD {
            return Err(ProtocolError::OutOfRange {
                field: "max_payload",
                value: max_payload,
                max: MAX_FRAME_PAYLOAD,
            });
        }
        Ok(Self {
            max_payload,
            frame_delay,
        })
    }

    /// Get the maximum payload size per frame.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Number of frames needed for a payload of `len` bytes (at least 1).
    pub fn frame_count(&self, len: usize) -> usize {
        len.div_ceil(self.max_payload).max(1)
    }

    /// Split a message into frames.
    ///
    /// An empty payload still produces one frame.
    pub fn fragment(&self, msg_id: u8, cmd: u8, payload: &[u8]) -> Result<Vec<Frame>, ProtocolError> {
        let total = self.frame_count(payload.len());
        if total > MAX_FRAMES as usize {
            return Err(ProtocolError::MessageTooLong {
                len: payload.len(),
                max: (MAX_FRAMES as usize * self.max_payload).min(MAX_MESSAGE_LEN),
            });
        }

        let mut frames = Vec::with_capacity(total);
        for seq in 0..total {
            let start = seq * self.max_payload;
            let end = (start + self.max_payload).min(payload.len());
            let header = FrameHeader::new(msg_id, cmd).with_frames(seq as u8, total as u8);
            frames.push(Frame::new(header, payload[start..end].to_vec())?);
        }
        Ok(frames)
    }

    /// Fragment a message and hand each frame to `sink`, pausing
    /// `frame_delay` after every frame.
    ///
    /// Cancellation is checked before each frame and during the pauses.
    pub fn send<S>(
        &self,
        msg_id: u8,
        cmd: u8,
        payload: &[u8],
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<usize, SendError>
    where
        S: FrameSink + ?Sized,
    {
        let frames = self.fragment(msg_id, cmd, payload)?;
        let count = frames.len();
        for frame in frames {
            if cancel.is_cancelled() {
                return Err(SendError::Cancelled);
            }
            sink.send_frame(&frame.to_bytes()?)?;
            if !sleep_unless_cancelled(self.frame_delay, cancel) {
                return Err(SendError::Cancelled);
            }
        }
        log::debug!(
            "Sent msg_id={} cmd=0x{:02X} in {} frame(s), {} bytes",
            msg_id,
            cmd,
            count,
            payload.len()
        );
        Ok(count)
    }
}

/// State for a message being reassembled.
#[derive(Debug)]
struct PendingMessage {
    cmd: u8,
    version: u8,
    /// One slot per expected frame.
    frames: Vec<Option<Vec<u8>>>,
    received: usize,
    started: Instant,
}

impl PendingMessage {
    fn new(header: &FrameHeader) -> Self {
        Self {
            cmd: header.cmd,
            version: header.version,
            frames: vec![None; header.total_frames as usize],
            received: 0,
            started: Instant::now(),
        }
    }

    fn matches(&self, header: &FrameHeader) -> bool {
        self.cmd == header.cmd && self.frames.len() == header.total_frames as usize
    }

    fn is_complete(&self) -> bool {
        self.received == self.frames.len()
    }

    fn assemble(self) -> Vec<u8> {
        self.frames.into_iter().flatten().flatten().collect()
    }
}

/// Reassembles inbound frames into complete messages.
///
/// # Memory Safety
///
/// At most `max_pending` partial messages are held (default: 8); when the
/// limit is reached the oldest is evicted. Partial messages older than the
/// timeout are discarded.
pub struct Reassembler<P> {
    pending: HashMap<(P, u8), PendingMessage>,
    timeout: Duration,
    max_pending: usize,
}

impl<P: Copy + Eq + Hash + fmt::Debug> Reassembler<P> {
    /// Create a reassembler with the default pending limit.
    pub fn new(timeout: Duration) -> Self {
        Self::with_limits(timeout, DEFAULT_MAX_PENDING)
    }

    /// Create a reassembler with a custom pending limit.
    pub fn with_limits(timeout: Duration, max_pending: usize) -> Self {
        Self {
            pending: HashMap::new(),
            timeout,
            max_pending: max_pending.max(1),
        }
    }

    /// Add a frame from `peer`.
    ///
    /// Returns `Ok(Some(message))` once every frame of a message has
    /// arrived, `Ok(None)` while more frames are needed (duplicates are
    /// ignored), and an error for frames that contradict the header
    /// invariants or the message they claim to belong to. A rejected frame
    /// discards the partial message.
    pub fn add_frame(&mut self, peer: P, frame: Frame) -> Result<Option<Message>, ProtocolError> {
        frame.header.validate()?;
        self.cleanup_expired();

        let header = frame.header;
        let key = (peer, header.msg_id);

        if header.total_frames == 1 {
            if self.pending.remove(&key).is_some() {
                log::debug!("Single frame replaced partial msg_id={} from {:?}", header.msg_id, peer);
            }
            return Ok(Some(Message::from_frame(frame)));
        }

        if let Some(existing) = self.pending.get(&key) {
            let restart = header.seq == 0 && existing.frames[0].is_some();
            if restart {
                log::debug!("Restarting msg_id={} from {:?}", header.msg_id, peer);
                self.pending.remove(&key);
            } else if !existing.matches(&header) {
                self.pending.remove(&key);
                if header.seq != 0 {
                    return Err(ProtocolError::InconsistentFrame(format!(
                        "msg_id {} frame {} does not match pending message",
                        header.msg_id, header.seq
                    )));
                }
            }
        }

        if !self.pending.contains_key(&key) {
            if self.pending.len() >= self.max_pending {
                if let Some(oldest) = self.find_oldest_pending() {
                    log::warn!("Reassembly limit reached, evicting {:?}", oldest);
                    self.pending.remove(&oldest);
                }
            }
            self.pending.insert(key, PendingMessage::new(&header));
        }

        let Some(pending) = self.pending.get_mut(&key) else {
            return Ok(None);
        };
        let slot = &mut pending.frames[header.seq as usize];
        if slot.is_some() {
            log::debug!("Duplicate frame {} for msg_id={}", header.seq, header.msg_id);
            return Ok(None);
        }
        *slot = Some(frame.payload);
        pending.received += 1;

        if !pending.is_complete() {
            return Ok(None);
        }

        let Some(pending) = self.pending.remove(&key) else {
            return Ok(None);
        };
        let (cmd, version) = (pending.cmd, pending.version);
        let payload = pending.assemble();
        if payload.len() > MAX_MESSAGE_LEN {
            return Err(ProtocolError::MessageTooLong {
                len: payload.len(),
                max: MAX_MESSAGE_LEN,
            });
        }
        Ok(Some(Message {
            msg_id: header.msg_id,
            version,
            cmd,
            payload,
        }))
    }

    fn find_oldest_pending(&self) -> Option<(P, u8)> {
        self.pending
            .iter()
            .min_by_key(|(_, p)| p.started)
            .map(|(k, _)| *k)
    }

    /// Remove expired pending reassemblies.
    fn cleanup_expired(&mut self) {
        let now = Instant::now();
        let timeout = self.timeout;
        self.pending.retain(|key, pending| {
            let alive = now.saturating_duration_since(pending.started) < timeout;
            if !alive {
                log::debug!("Dropping stale partial message {:?}", key);
            }
            alive
        });
    }

    /// Get the number of pending reassemblies.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop all partial messages from one peer (e.g. on disconnect).
    pub fn forget_peer(&mut self, peer: P) {
        self.pending.retain(|(p, _), _| *p != peer);
    }

    /// Clear all pending reassemblies.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
