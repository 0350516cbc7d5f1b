//! In-process radio for host builds and tests.
//!
//! [`SimulatedRadio`] answers connect and scan requests by posting
//! [`RadioEvent`]s on a channel, the same way the ESP-IDF event loop does
//! on device. Outcomes follow the configured networks unless a test queues
//! a scripted outcome through [`RadioScript`].

use super::connection::{Radio, RadioEvent, MAX_SSID_LEN};
use super::reason::{DisconnectReason, DriverError};
use super::scan::{Bssid, ScanRecord};
use crate::protocol::wifi_config::MAX_PASSWORD_FIELD_LEN;
use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

/// An access point visible to the simulated radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedNetwork {
    pub ssid: String,
    pub password: String,
    pub bssid: Bssid,
    pub rssi: i8,
}

impl SimulatedNetwork {
    /// Network with a BSSID derived from its SSID.
    pub fn new(ssid: &str, password: &str, rssi: i8) -> Self {
        let mut mac = [0x02, 0, 0, 0, 0, 0];
        for (i, b) in ssid.bytes().enumerate() {
            mac[1 + i % 5] ^= b;
        }
        Self {
            ssid: ssid.to_string(),
            password: password.to_string(),
            bssid: Bssid(mac),
            rssi,
        }
    }

    pub fn with_bssid(mut self, bssid: Bssid) -> Self {
        self.bssid = bssid;
        self
    }
}

/// Override for the next connect request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    /// The connect call itself fails.
    Fail(DriverError),
    /// The call succeeds and this event is posted.
    Event(RadioEvent),
    /// The call succeeds and nothing is ever posted.
    Silent,
}

#[derive(Debug, Default)]
struct ScriptState {
    outcomes: VecDeque<ScriptedOutcome>,
    configure_error: Option<DriverError>,
    connect_calls: usize,
    scan_calls: usize,
}

/// Shared handle for steering a [`SimulatedRadio`] after it has been moved
/// into a connection manager.
#[derive(Debug, Clone, Default)]
pub struct RadioScript {
    state: Arc<Mutex<ScriptState>>,
}

impl RadioScript {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, outcome: ScriptedOutcome) {
        self.lock().outcomes.push_back(outcome);
    }

    /// Make every following `configure` call fail.
    pub fn fail_configure(&self, error: DriverError) {
        self.lock().configure_error = Some(error);
    }

    pub fn connect_calls(&self) -> usize {
        self.lock().connect_calls
    }

    pub fn scan_calls(&self) -> usize {
        self.lock().scan_calls
    }
}

/// Radio backed by a fixed list of networks.
pub struct SimulatedRadio {
    networks: Vec<SimulatedNetwork>,
    events: Sender<RadioEvent>,
    script: RadioScript,
    ssid: String,
    password: String,
    associated: Option<Bssid>,
}

impl SimulatedRadio {
    /// Create a radio and the receiving end of its event channel.
    pub fn new(networks: Vec<SimulatedNetwork>) -> (Self, Receiver<RadioEvent>) {
        let (tx, rx) = channel();
        let radio = Self {
            networks,
            events: tx,
            script: RadioScript::default(),
            ssid: String::new(),
            password: String::new(),
            associated: None,
        };
        (radio, rx)
    }

    pub fn script(&self) -> RadioScript {
        self.script.clone()
    }

    fn post(&self, event: RadioEvent) {
        if self.events.send(event).is_err() {
            log::debug!("Radio event dropped: no listener");
        }
    }

    fn natural_outcome(&mut self) -> RadioEvent {
        match self.networks.iter().find(|n| n.ssid == self.ssid) {
            None => RadioEvent::Disassociated(DisconnectReason::NO_AP_FOUND),
            Some(n) if n.password != self.password => {
                RadioEvent::Disassociated(DisconnectReason::AUTH_FAIL)
            }
            Some(n) => {
                self.associated = Some(n.bssid);
                RadioEvent::Associated
            }
        }
    }
}

impl Radio for SimulatedRadio {
    fn configure(&mut self, ssid: &str, password: &str) -> Result<(), DriverError> {
        if let Some(e) = self.script.lock().configure_error {
            return Err(e);
        }
        if ssid.is_empty() || ssid.len() > MAX_SSID_LEN {
            return Err(DriverError::Ssid);
        }
        if password.len() > MAX_PASSWORD_FIELD_LEN {
            return Err(DriverError::Password);
        }
        self.ssid = ssid.to_string();
        self.password = password.to_string();
        self.associated = None;
        Ok(())
    }

    fn connect(&mut self) -> Result<(), DriverError> {
        let scripted = {
            let mut script = self.script.lock();
            script.connect_calls += 1;
            script.outcomes.pop_front()
        };
        let event = match scripted {
            Some(ScriptedOutcome::Fail(e)) => return Err(e),
            Some(ScriptedOutcome::Silent) => return Ok(()),
            Some(ScriptedOutcome::Event(event)) => event,
            None => self.natural_outcome(),
        };
        self.post(event);
        Ok(())
    }

    fn current_bssid(&mut self) -> Option<Bssid> {
        self.associated
    }

    fn start_scan(&mut self) -> Result<(), DriverError> {
        self.script.lock().scan_calls += 1;
        let records = self
            .networks
            .iter()
            .map(|n| ScanRecord {
                ssid: n.ssid.clone(),
                bssid: n.bssid,
                rssi: n.rssi,
            })
            .collect();
        self.post(RadioEvent::ScanDone(records));
        Ok(())
    }
}
