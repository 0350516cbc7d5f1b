//! UDP provisioning over the SoftAP network.
//!
//! Each datagram carries exactly one frame. Replies go back to the
//! datagram's source address.

use super::{MessageHandler, ProvisioningSession};
use crate::protocol::HEADER_LEN;
use crate::timing::CANCEL_POLL;
use log::{debug, info, warn};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Largest datagram accepted.
const MAX_DATAGRAM: usize = HEADER_LEN + u8::MAX as usize;

/// Blocking UDP server feeding a [`ProvisioningSession`].
pub struct UdpProvisioningServer<H: ?Sized> {
    socket: UdpSocket,
    session: ProvisioningSession<SocketAddr, H>,
}

impl<H: MessageHandler + ?Sized> UdpProvisioningServer<H> {
    /// Bind to `addr`.
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        handler: Arc<H>,
        reassembly_timeout: Duration,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(CANCEL_POLL))?;
        info!("UDP provisioning listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            session: ProvisioningSession::new(handler, reassembly_timeout),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serve until `cancel` fires.
    pub fn run(&mut self, cancel: &CancellationToken) -> io::Result<()> {
        let mut buf = [0u8; MAX_DATAGRAM];
        while !cancel.is_cancelled() {
            let (len, peer) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            debug!("Datagram from {} ({} bytes)", peer, len);

            let socket = &self.socket;
            let mut reply = |frame: &[u8]| -> io::Result<()> {
                socket.send_to(frame, peer)?;
                Ok(())
            };
            if let Err(e) = self.session.on_bytes(peer, &buf[..len], &mut reply, cancel) {
                warn!("Bad datagram from {}: {}", peer, e);
            }
        }
        info!("UDP provisioning stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Frame, FrameHeader, Message, CMD_GET_WIFI_LIST};
    use crate::transport::FrameSink;
    use std::sync::Mutex;
    use std::thread;

    struct Echo {
        seen: Mutex<Vec<u8>>,
    }

    impl MessageHandler for Echo {
        fn handle_message(&self, message: &Message, sink: &mut dyn FrameSink, _cancel: &CancellationToken) {
            self.seen.lock().unwrap().push(message.msg_id);
            sink.send_frame(&[message.msg_id, message.cmd]).unwrap();
        }

        fn report_invalid(&self, _reason: &str, sink: &mut dyn FrameSink) {
            sink.send_frame(&[0xFF]).unwrap();
        }
    }

    #[test]
    fn test_udp_round_trip_and_shutdown() {
        let handler = Arc::new(Echo { seen: Mutex::new(Vec::new()) });
        let mut server =
            UdpProvisioningServer::bind("127.0.0.1:0", handler.clone(), Duration::from_secs(5)).unwrap();
        let addr = server.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server_cancel = cancel.clone();
        let worker = thread::spawn(move || server.run(&server_cancel));

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let request = Frame::new(FrameHeader::new(9, CMD_GET_WIFI_LIST), Vec::new())
            .unwrap()
            .to_bytes()
            .unwrap();
        client.send_to(&request, addr).unwrap();

        let mut buf = [0u8; 16];
        let (len, _) = client.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[9, CMD_GET_WIFI_LIST]);

        client.send_to(&[1, 2], addr).unwrap();
        let (len, _) = client.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[0xFF]);

        cancel.cancel();
        worker.join().unwrap().unwrap();
        assert_eq!(*handler.seen.lock().unwrap(), vec![9]);
    }
}
