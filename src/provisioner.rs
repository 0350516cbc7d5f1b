//! Provisioning composition root.
//!
//! [`Provisioner`] ties the pieces together: it answers decoded peer
//! commands, drives the [`ConnectionManager`], persists working networks
//! in the [`CredentialStore`], and reports progress back to the peer.
//!
//! # WiFi-config flow
//!
//! ```text
//! peer ── 0x40 WiFi config ──> device
//! peer <── 0x42 Connecting ─── device
//!                               connect (up to max_retries attempts)
//!                               persist credential (+ binding if uid)
//! peer <── 0x42 ConnectFailed ─ device   (only on failure)
//! peer <── 0x41 OK / ERROR ──── device
//! ```

use crate::config::{ConfigError, ProvisioningConfig};
use crate::protocol::response::encode_wifi_list;
use crate::protocol::{
    Command, Fragmenter, Message, ParsedCommand, ProtocolError, ProvisioningEvent, ResponseStatus,
    SendError, StatusNotification, WifiConfigRecord, WifiConfigResponse, CMD_GET_WIFI_LIST,
};
use crate::store::{CredentialBackend, CredentialStore, DeviceBinding, StorageError};
use crate::transport::{FrameSink, MessageHandler};
use crate::wifi::{Bssid, ConnectError, Connected, ConnectionManager, Radio, ScanEntry};
use log::{error, info, warn};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Errors surfaced by [`Provisioner`].
#[derive(Debug)]
pub enum ProvisionError {
    Connect(ConnectError),
    Storage(StorageError),
    Protocol(ProtocolError),
    Send(SendError),
    Config(ConfigError),
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(e) => write!(f, "{}", e),
            Self::Storage(e) => write!(f, "{}", e),
            Self::Protocol(e) => write!(f, "{}", e),
            Self::Send(e) => write!(f, "{}", e),
            Self::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ProvisionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connect(e) => Some(e),
            Self::Storage(e) => Some(e),
            Self::Protocol(e) => Some(e),
            Self::Send(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

impl From<ConnectError> for ProvisionError {
    fn from(e: ConnectError) -> Self {
        Self::Connect(e)
    }
}

impl From<StorageError> for ProvisionError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ProtocolError> for ProvisionError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<SendError> for ProvisionError {
    fn from(e: SendError) -> Self {
        Self::Send(e)
    }
}

impl From<std::io::Error> for ProvisionError {
    fn from(e: std::io::Error) -> Self {
        Self::Send(SendError::Io(e))
    }
}

impl From<ConfigError> for ProvisionError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Answers provisioning commands from any transport.
pub struct Provisioner<R, B> {
    connection: Arc<ConnectionManager<R>>,
    store: Arc<CredentialStore<B>>,
    fragmenter: Fragmenter,
}

impl<R: Radio, B: CredentialBackend> Provisioner<R, B> {
    /// Build from already constructed collaborators.
    ///
    /// Tunables are taken from the connection manager's configuration.
    pub fn new(
        connection: Arc<ConnectionManager<R>>,
        store: Arc<CredentialStore<B>>,
    ) -> Result<Self, ProvisionError> {
        let config = connection.config();
        config.validate()?;
        let fragmenter = Fragmenter::try_new(config.max_frame_payload, config.frame_delay)?;
        Ok(Self {
            connection,
            store,
            fragmenter,
        })
    }

    pub fn connection(&self) -> &Arc<ConnectionManager<R>> {
        &self.connection
    }

    pub fn store(&self) -> &Arc<CredentialStore<B>> {
        &self.store
    }

    fn config(&self) -> &ProvisioningConfig {
        self.connection.config()
    }

    /// Connect to a network and remember it on success.
    pub fn connect_and_persist(&self, ssid: &str, password: &str) -> Result<Connected, ProvisionError> {
        self.connect_and_persist_with_cancel(ssid, password, None, &CancellationToken::new())
    }

    /// Like [`connect_and_persist`](Self::connect_and_persist), with a BSSID
    /// hint stored when the driver cannot report one.
    pub fn connect_and_persist_with_cancel(
        &self,
        ssid: &str,
        password: &str,
        bssid_hint: Option<Bssid>,
        cancel: &CancellationToken,
    ) -> Result<Connected, ProvisionError> {
        let connected = self.connection.connect_with_cancel(ssid, password, cancel)?;
        self.store
            .add(ssid, password, connected.bssid.or(bssid_hint))?;
        Ok(connected)
    }

    /// Latest scan, strongest signal first.
    pub fn get_ranked_scan_results(&self) -> Vec<ScanEntry> {
        self.connection.scan_cache().ranked()
    }

    /// Try stored networks visible in the latest scan, strongest first.
    ///
    /// Returns the SSID that connected, or `None` when no candidate did.
    pub fn connect_known_networks(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, ProvisionError> {
        let records = self.connection.scan_cache().records();
        let candidates = self.store.match_scan(&records);
        if candidates.is_empty() {
            info!("No stored network visible ({} access points)", records.len());
            return Ok(None);
        }

        for candidate in &candidates {
            match self.connection.connect_with_cancel(&candidate.ssid, &candidate.password, cancel) {
                Ok(connected) => {
                    self.store.add(
                        &candidate.ssid,
                        &candidate.password,
                        connected.bssid.or(candidate.bssid),
                    )?;
                    return Ok(Some(candidate.ssid.clone()));
                }
                Err(e @ (ConnectError::Cancelled | ConnectError::Busy)) => return Err(e.into()),
                Err(e) => warn!("Stored network {:?} failed: {}", candidate.ssid, e),
            }
        }
        Ok(None)
    }

    /// Send a single-frame status notification.
    pub fn notify<S>(&self, notification: &StatusNotification, sink: &mut S) -> Result<(), ProvisionError>
    where
        S: FrameSink + ?Sized,
    {
        sink.send_frame(&notification.encode()?)?;
        Ok(())
    }

    /// Process one complete message.
    pub fn process_message<S>(
        &self,
        message: &Message,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<(), ProvisionError>
    where
        S: FrameSink + ?Sized,
    {
        let parsed = match ParsedCommand::from_message(message) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Rejecting msg_id={} cmd=0x{:02X}: {}", message.msg_id, message.cmd, e);
                let notice = StatusNotification::with_log(ProvisioningEvent::InvalidPackage, e.to_string());
                self.notify(&notice, sink)?;
                return Err(e.into());
            }
        };

        match &parsed.command {
            Command::WifiConfig(record) => self.handle_wifi_config(&parsed, record, sink, cancel),
            Command::GetWifiList => {
                let ranked = self.get_ranked_scan_results();
                let payload = encode_wifi_list(ranked.iter().map(|e| (e.ssid.as_str(), e.rssi)));
                let frames = self
                    .fragmenter
                    .send(parsed.msg_id, CMD_GET_WIFI_LIST, &payload, sink, cancel)?;
                info!("Sent WiFi list ({} networks, {} frame(s))", ranked.len(), frames);
                Ok(())
            }
        }
    }

    fn handle_wifi_config<S>(
        &self,
        parsed: &ParsedCommand,
        record: &WifiConfigRecord,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<(), ProvisionError>
    where
        S: FrameSink + ?Sized,
    {
        info!(
            "WiFi config: ssid={:?} password={} bytes bssid={} bytes uid={}",
            record.ssid,
            record.password.len(),
            record.bssid.len(),
            record.uid.is_some()
        );
        self.notify(
            &StatusNotification::with_log(
                ProvisioningEvent::Connecting,
                format!("Attempting to connect to WiFi: {}", record.ssid),
            ),
            sink,
        )?;

        let outcome = self
            .connect_and_persist_with_cancel(
                &record.ssid,
                &record.password,
                Bssid::from_slice(&record.bssid),
                cancel,
            )
            .and_then(|connected| {
                if let Some(uid) = &record.uid {
                    self.store.save_binding(&DeviceBinding {
                        uid: uid.clone(),
                        need_activation: true,
                        locale: record.locale().cloned(),
                    })?;
                }
                Ok(connected)
            });

        if matches!(outcome, Err(ProvisionError::Connect(ConnectError::Cancelled))) {
            warn!("Provisioning of {:?} cancelled", record.ssid);
            return outcome.map(|_| ());
        }

        let status = match &outcome {
            Ok(connected) => {
                match connected.bssid {
                    Some(bssid) => info!("Provisioned {:?} (BSSID {})", record.ssid, bssid),
                    None => info!("Provisioned {:?}", record.ssid),
                }
                ResponseStatus::Ok
            }
            Err(e) => {
                error!("Provisioning of {:?} failed: {}", record.ssid, e);
                self.notify(
                    &StatusNotification::with_log(
                        ProvisioningEvent::ConnectFailed,
                        format!("Failed to connect to WiFi: {}: {}", record.ssid, e),
                    ),
                    sink,
                )?;
                ResponseStatus::Error
            }
        };

        let config = self.config();
        let response = WifiConfigResponse {
            msg_id: parsed.msg_id,
            version: parsed.version,
            status,
            hardware_version: config.hardware_version,
            software_version: config.software_version,
        };
        sink.send_frame(&response.encode()?)?;
        outcome.map(|_| ())
    }
}

impl<R: Radio, B: CredentialBackend> MessageHandler for Provisioner<R, B> {
    fn handle_message(&self, message: &Message, sink: &mut dyn FrameSink, cancel: &CancellationToken) {
        if let Err(e) = self.process_message(message, sink, cancel) {
            warn!("msg_id={} cmd=0x{:02X} not completed: {}", message.msg_id, message.cmd, e);
        }
    }

    fn report_invalid(&self, reason: &str, sink: &mut dyn FrameSink) {
        let notice = StatusNotification::with_log(ProvisioningEvent::InvalidPackage, reason);
        if let Err(e) = self.notify(&notice, sink) {
            warn!("Failed to report invalid frame: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wifi_config::tests::build_payload;
    use crate::protocol::{Frame, CMD_STATUS_NOTIFY, CMD_WIFI_CONFIG, CMD_WIFI_CONFIG_RESPONSE};
    use crate::store::MemoryBackend;
    use crate::wifi::simulated::{SimulatedNetwork, SimulatedRadio};
    use crate::wifi::{RadioEvent, ScanCache, ScanRecord};
    use std::io;
    use std::sync::mpsc::Receiver;
    use std::time::Duration;

    struct Fixture {
        provisioner: Provisioner<SimulatedRadio, MemoryBackend>,
        backend: MemoryBackend,
        cancel: CancellationToken,
        pump: Option<std::thread::JoinHandle<()>>,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            self.cancel.cancel();
            if let Some(pump) = self.pump.take() {
                let _ = pump.join();
            }
        }
    }

    fn spawn_pump(
        manager: Arc<ConnectionManager<SimulatedRadio>>,
        events: Receiver<RadioEvent>,
        cancel: CancellationToken,
    ) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || manager.run_event_loop(&events, &cancel))
    }

    fn fixture() -> Fixture {
        let config = ProvisioningConfig {
            max_retries: 2,
            attempt_timeout: Duration::from_millis(200),
            retry_backoff: Duration::ZERO,
            frame_delay: Duration::ZERO,
            ..Default::default()
        };
        let (radio, events) = SimulatedRadio::new(vec![
            SimulatedNetwork::new("Home", "secret123", -40),
            SimulatedNetwork::new("Office", "officepw", -70),
        ]);
        let manager = Arc::new(ConnectionManager::new(radio, Arc::new(ScanCache::default()), config));
        let backend = MemoryBackend::new();
        let store = Arc::new(CredentialStore::open(backend.clone(), 10).unwrap());
        let cancel = CancellationToken::new();
        let pump = spawn_pump(manager.clone(), events, cancel.clone());
        Fixture {
            provisioner: Provisioner::new(manager, store).unwrap(),
            backend,
            cancel,
            pump: Some(pump),
        }
    }

    fn run(fixture: &Fixture, message: &Message) -> (Result<(), ProvisionError>, Vec<Frame>) {
        let mut sent = Vec::new();
        let mut sink = |bytes: &[u8]| -> io::Result<()> {
            sent.push(Frame::from_bytes(bytes).unwrap());
            Ok(())
        };
        let result = fixture
            .provisioner
            .process_message(message, &mut sink, &CancellationToken::new());
        (result, sent)
    }

    fn wifi_config(msg_id: u8, ssid: &str, password: &str, uid: &str) -> Message {
        Message {
            msg_id,
            version: 0,
            cmd: CMD_WIFI_CONFIG,
            payload: build_payload(1, &[ssid.as_bytes(), b"", password.as_bytes(), uid.as_bytes()], &[]),
        }
    }

    // ==================== WiFi Config Tests ====================

    #[test]
    fn test_wifi_config_success() {
        let f = fixture();
        let (result, sent) = run(&f, &wifi_config(5, "Home", "secret123", "user42"));
        assert!(result.is_ok());

        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].header.cmd, CMD_STATUS_NOTIFY);
        assert_eq!(sent[0].payload[0], ProvisioningEvent::Connecting.code());
        assert_eq!(sent[1].header.cmd, CMD_WIFI_CONFIG_RESPONSE);
        assert_eq!(sent[1].header.msg_id, 5);
        assert_eq!(sent[1].payload[0], ResponseStatus::Ok.code());

        let stored = f.backend.stored();
        assert_eq!(stored[0].ssid, "Home");
        assert!(stored[0].bssid.is_some());
        let binding = f.backend.stored_binding().unwrap();
        assert_eq!(binding.uid, "user42");
        assert!(binding.need_activation);
    }

    #[test]
    fn test_wifi_config_failure() {
        let f = fixture();
        let (result, sent) = run(&f, &wifi_config(6, "Home", "wrongpass", "user42"));
        assert!(matches!(
            result,
            Err(ProvisionError::Connect(ConnectError::Failed(_)))
        ));

        let codes: Vec<u8> = sent.iter().map(|frame| frame.header.cmd).collect();
        assert_eq!(codes, vec![CMD_STATUS_NOTIFY, CMD_STATUS_NOTIFY, CMD_WIFI_CONFIG_RESPONSE]);
        assert_eq!(sent[1].payload[0], ProvisioningEvent::ConnectFailed.code());
        assert_eq!(sent[2].payload[0], ResponseStatus::Error.code());
        assert!(f.backend.stored().is_empty());
        assert_eq!(f.backend.stored_binding(), None);
    }

    #[test]
    fn test_storage_failure_reports_error() {
        let f = fixture();
        f.backend.set_fail_saves(true);
        let (result, sent) = run(&f, &wifi_config(7, "Home", "secret123", ""));
        assert!(matches!(result, Err(ProvisionError::Storage(_))));
        assert_eq!(sent.last().unwrap().payload[0], ResponseStatus::Error.code());
    }

    #[test]
    fn test_malformed_payload_notifies_invalid() {
        let f = fixture();
        let message = Message {
            msg_id: 1,
            version: 0,
            cmd: CMD_WIFI_CONFIG,
            payload: vec![0, 0],
        };
        let (result, sent) = run(&f, &message);
        assert!(matches!(result, Err(ProvisionError::Protocol(_))));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload[0], ProvisioningEvent::InvalidPackage.code());
    }

    // ==================== Scan Tests ====================

    #[test]
    fn test_get_wifi_list() {
        let f = fixture();
        f.provisioner.connection().scan_cache().replace(vec![
            ScanRecord { ssid: "Weak".into(), bssid: Bssid([2, 0, 0, 0, 0, 1]), rssi: -80 },
            ScanRecord { ssid: String::new(), bssid: Bssid([2, 0, 0, 0, 0, 2]), rssi: -20 },
            ScanRecord { ssid: "Strong".into(), bssid: Bssid([2, 0, 0, 0, 0, 3]), rssi: -30 },
        ]);
        let message = Message {
            msg_id: 3,
            version: 0,
            cmd: CMD_GET_WIFI_LIST,
            payload: Vec::new(),
        };
        let (result, sent) = run(&f, &message);
        assert!(result.is_ok());
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].header.cmd, CMD_GET_WIFI_LIST);
        assert_eq!(sent[0].header.msg_id, 3);

        let payload = &sent[0].payload;
        assert_eq!(&payload[..2], &[0, 80]);
        assert_eq!(&payload[2..9], b"\x06Strong");
        assert_eq!(payload[9], 70);
        assert_eq!(&payload[10..], b"\x04Weak\x14");
    }

    #[test]
    fn test_connect_known_networks() {
        let f = fixture();
        let store = f.provisioner.store();
        store.add("Office", "officepw", None).unwrap();
        store.add("Cafe", "latte", None).unwrap();
        store.add("Home", "stale-password", None).unwrap();

        f.provisioner.connection().scan_cache().replace(vec![
            ScanRecord { ssid: "Home".into(), bssid: Bssid([2, 0, 0, 0, 0, 1]), rssi: -40 },
            ScanRecord { ssid: "Office".into(), bssid: Bssid([2, 0, 0, 0, 0, 2]), rssi: -70 },
        ]);

        let connected = f
            .provisioner
            .connect_known_networks(&CancellationToken::new())
            .unwrap();
        assert_eq!(connected.as_deref(), Some("Office"));
        let office = store.list().into_iter().find(|c| c.ssid == "Office").unwrap();
        assert!(office.bssid.is_some());
    }

    #[test]
    fn test_connect_known_networks_none_visible() {
        let f = fixture();
        f.provisioner.store().add("Elsewhere", "password", None).unwrap();
        assert_eq!(
            f.provisioner
                .connect_known_networks(&CancellationToken::new())
                .unwrap(),
            None
        );
    }
}
