//! NimBLE GATT server feeding provisioning frames to a session worker.
//!
//! The write characteristic queues frames per connection handle and the
//! notify characteristic carries every outbound frame back to the peer.

use crate::transport::{FrameSink, MessageHandler, ProvisioningSession};
use crate::timing::CANCEL_POLL;
use esp32_nimble::utilities::mutex::Mutex as NimbleMutex;
use esp32_nimble::utilities::BleUuid;
use esp32_nimble::{
    uuid128, BLEAdvertisementData, BLECharacteristic, BLEDevice, BLEError, NimbleProperties,
};
use log::{debug, info, warn};
use std::fmt;
use std::io;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// WiFi Provisioning service.
const PROVISION_SERVICE_UUID: BleUuid = uuid128!("0000ffe0-0000-1000-8000-00805f9b34fb");

/// Inbound frame characteristic.
const WRITE_CHAR_UUID: BleUuid = uuid128!("0000ffe1-0000-1000-8000-00805f9b34fb");

/// Outbound frame characteristic.
const NOTIFY_CHAR_UUID: BleUuid = uuid128!("0000ffe2-0000-1000-8000-00805f9b34fb");

/// BLE advertisement name.
pub const DEVICE_NAME: &str = "WiFi-Provision";

enum Inbound {
    Frame(u16, Vec<u8>),
    Disconnected(u16),
}

/// Errors starting the BLE service.
#[derive(Debug)]
pub enum BleServiceError {
    /// NimBLE rejected the advertising setup.
    Ble(BLEError),
    /// The worker thread could not be spawned.
    Worker(io::Error),
}

impl fmt::Display for BleServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ble(e) => write!(f, "BLE error: {:?}", e),
            Self::Worker(e) => write!(f, "BLE worker spawn failed: {}", e),
        }
    }
}

impl std::error::Error for BleServiceError {}

impl From<BLEError> for BleServiceError {
    fn from(e: BLEError) -> Self {
        Self::Ble(e)
    }
}

/// Sends frames as notifications on the outbound characteristic.
struct NotifySink {
    characteristic: Arc<NimbleMutex<BLECharacteristic>>,
}

impl FrameSink for NotifySink {
    fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.characteristic.lock().set_value(frame).notify();
        Ok(())
    }
}

/// Registered GATT service plus its worker thread.
pub struct BleProvisioningService {
    worker: Option<JoinHandle<()>>,
}

impl BleProvisioningService {
    /// Register the service on the NimBLE server and start the worker.
    pub fn start<H>(
        handler: Arc<H>,
        reassembly_timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<Self, BleServiceError>
    where
        H: MessageHandler + ?Sized + 'static,
    {
        let device = BLEDevice::take();
        let server = device.get_server();
        let (tx, rx) = channel();

        let disconnect_tx = tx.clone();
        server.on_disconnect(move |desc, reason| {
            debug!("BLE peer {} disconnected: {:?}", desc.conn_handle(), reason);
            let _ = disconnect_tx.send(Inbound::Disconnected(desc.conn_handle()));
        });

        let service = server.create_service(PROVISION_SERVICE_UUID);

        let notify_char = service.lock().create_characteristic(
            NOTIFY_CHAR_UUID,
            NimbleProperties::READ | NimbleProperties::NOTIFY,
        );

        let write_char = service.lock().create_characteristic(
            WRITE_CHAR_UUID,
            NimbleProperties::WRITE | NimbleProperties::WRITE_NO_RSP,
        );
        let write_tx: Sender<Inbound> = tx;
        write_char.lock().on_write(move |args| {
            let peer = args.desc().conn_handle();
            if write_tx
                .send(Inbound::Frame(peer, args.recv_data().to_vec()))
                .is_err()
            {
                warn!("BLE worker gone, dropping frame from {}", peer);
            }
        });

        let advertising = device.get_advertising();
        advertising.lock().set_data(
            BLEAdvertisementData::new()
                .name(DEVICE_NAME)
                .add_service_uuid(PROVISION_SERVICE_UUID),
        )?;
        advertising.lock().start()?;
        info!("BLE provisioning advertising as {}", DEVICE_NAME);

        let session = ProvisioningSession::new(handler, reassembly_timeout);
        let sink = NotifySink {
            characteristic: notify_char,
        };
        let worker = thread::Builder::new()
            .name("ble-provision".into())
            .stack_size(16 * 1024)
            .spawn(move || run_worker(session, sink, rx, cancel))
            .map_err(BleServiceError::Worker)?;

        Ok(Self {
            worker: Some(worker),
        })
    }

    /// Wait for the worker to exit after cancellation.
    pub fn join(mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker<H>(
    mut session: ProvisioningSession<u16, H>,
    mut sink: NotifySink,
    rx: Receiver<Inbound>,
    cancel: CancellationToken,
) where
    H: MessageHandler + ?Sized,
{
    while !cancel.is_cancelled() {
        match rx.recv_timeout(CANCEL_POLL) {
            Ok(Inbound::Frame(peer, bytes)) => {
                if let Err(e) = session.on_bytes(peer, &bytes, &mut sink, &cancel) {
                    warn!("Bad BLE frame from {}: {}", peer, e);
                }
            }
            Ok(Inbound::Disconnected(peer)) => session.disconnect(peer),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    info!("BLE provisioning worker stopped");
}
