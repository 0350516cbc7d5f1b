//! Provisioning transports.
//!
//! Transports deliver raw frames from peers and send frames back. They
//! share one [`ProvisioningSession`] implementation per transport, which
//! reassembles multi-frame messages and hands complete messages to a
//! [`MessageHandler`].
//!
//! - [`udp`] - SoftAP UDP socket (host and ESP32)
//! - [`crate::ble`] - NimBLE GATT service (ESP32 only)

mod session;
pub mod udp;

pub use session::ProvisioningSession;
pub use udp::UdpProvisioningServer;

use crate::protocol::Message;
use std::io;
use tokio_util::sync::CancellationToken;

/// Outbound half of a transport.
pub trait FrameSink {
    /// Transmit one encoded frame.
    fn send_frame(&mut self, frame: &[u8]) -> io::Result<()>;
}

impl<F> FrameSink for F
where
    F: FnMut(&[u8]) -> io::Result<()>,
{
    fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self(frame)
    }
}

/// Consumer of complete inbound messages.
pub trait MessageHandler: Send + Sync {
    /// Process one message, replying through `sink`.
    fn handle_message(&self, message: &Message, sink: &mut dyn FrameSink, cancel: &CancellationToken);

    /// Tell the peer a frame could not be decoded.
    fn report_invalid(&self, reason: &str, sink: &mut dyn FrameSink);
}
