//! Per-transport frame handling.

use super::{FrameSink, MessageHandler};
use crate::protocol::{Frame, Message, ProtocolError, Reassembler};
use log::{debug, warn};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Decodes frames from many peers and dispatches complete messages.
///
/// `P` identifies a peer: a socket address for UDP, a connection handle
/// for BLE.
pub struct ProvisioningSession<P, H: ?Sized> {
    reassembler: Reassembler<P>,
    handler: Arc<H>,
}

impl<P, H> ProvisioningSession<P, H>
where
    P: Copy + Eq + Hash + Debug,
    H: MessageHandler + ?Sized,
{
    pub fn new(handler: Arc<H>, reassembly_timeout: Duration) -> Self {
        Self {
            reassembler: Reassembler::new(reassembly_timeout),
            handler,
        }
    }

    /// Feed one received datagram or characteristic write.
    ///
    /// Returns the message that was dispatched, if this frame completed
    /// one. Undecodable frames are reported to the peer and returned as
    /// errors.
    pub fn on_bytes<S>(
        &mut self,
        peer: P,
        bytes: &[u8],
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<Option<Message>, ProtocolError>
    where
        S: FrameSink,
    {
        let completed = Frame::from_bytes(bytes).and_then(|frame| {
            debug!(
                "Frame from {:?}: msg_id={} cmd=0x{:02X} seq={}/{} len={}",
                peer,
                frame.header.msg_id,
                frame.header.cmd,
                frame.header.seq,
                frame.header.total_frames,
                frame.header.frame_len
            );
            self.reassembler.add_frame(peer, frame)
        });

        match completed {
            Ok(Some(message)) => {
                self.handler.handle_message(&message, sink, cancel);
                Ok(Some(message))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!("Dropping frame from {:?}: {}", peer, e);
                self.handler.report_invalid(&e.to_string(), sink);
                Err(e)
            }
        }
    }

    /// Drop partial messages of a peer that went away.
    pub fn disconnect(&mut self, peer: P) {
        self.reassembler.forget_peer(peer);
    }

    pub fn pending_messages(&self) -> usize {
        self.reassembler.pending_count()
    }
}
