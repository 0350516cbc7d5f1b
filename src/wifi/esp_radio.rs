//! ESP-IDF station radio.
//!
//! Wraps the non-blocking `EspWifi` driver in AP+STA mode: the open SoftAP
//! carries UDP provisioning while the station joins the target network.
//! Connect and scan outcomes are picked up from the system event loop and
//! forwarded as [`RadioEvent`]s.

use super::connection::{Radio, RadioEvent};
use super::reason::{DisconnectReason, DriverError};
use super::scan::{Bssid, ScanRecord};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi, WifiEvent,
};
use esp_idf_sys::{self as sys, EspError};
use std::sync::mpsc::{channel, Receiver, Sender};

/// SoftAP network name.
const SOFTAP_SSID: &str = "WiFi-Provision";

fn driver_error(e: EspError) -> DriverError {
    DriverError::from_code(e.code())
}

/// Radio backed by ESP-IDF.
pub struct EspRadio {
    wifi: EspWifi<'static>,
    access_point: AccessPointConfiguration,
    _subscription: EspSubscription<'static, System>,
}

impl EspRadio {
    /// Bring up the driver and route its events into a channel.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> Result<(Self, Receiver<RadioEvent>), EspError> {
        let mut wifi = EspWifi::new(modem, sysloop.clone(), nvs)?;
        let access_point = AccessPointConfiguration {
            ssid: SOFTAP_SSID.try_into().unwrap_or_default(),
            auth_method: AuthMethod::None,
            ..Default::default()
        };
        wifi.set_configuration(&Configuration::Mixed(
            ClientConfiguration::default(),
            access_point.clone(),
        ))?;
        wifi.start()?;

        let (tx, rx) = channel();
        let subscription = sysloop.subscribe::<WifiEvent, _>(move |event| forward_event(&tx, event))?;

        log::info!("WiFi driver started, SoftAP {:?}", SOFTAP_SSID);
        Ok((
            Self {
                wifi,
                access_point,
                _subscription: subscription,
            },
            rx,
        ))
    }
}

fn forward_event(tx: &Sender<RadioEvent>, event: WifiEvent) {
    let radio_event = match event {
        WifiEvent::StaConnected(_) => RadioEvent::Associated,
        WifiEvent::StaDisconnected(info) => {
            RadioEvent::Disassociated(DisconnectReason(info.reason()))
        }
        WifiEvent::ScanDone(_) => RadioEvent::ScanDone(read_scan_records()),
        _ => return,
    };
    if tx.send(radio_event).is_err() {
        log::warn!("Radio event dropped: event loop stopped");
    }
}

/// Drain the driver's full AP list after a completed scan.
///
/// Ranking and capping are left to [`ScanCache::replace`](super::ScanCache::replace).
fn read_scan_records() -> Vec<ScanRecord> {
    let mut count: u16 = 0;
    // SAFETY: only writes the number of APs found into `count`.
    if let Err(e) = unsafe { sys::esp!(sys::esp_wifi_scan_get_ap_num(&mut count)) } {
        log::warn!("Failed to read scan result count: {:?}", e);
        return Vec::new();
    }
    if count == 0 {
        return Vec::new();
    }

    let mut aps: Vec<sys::wifi_ap_record_t> = Vec::with_capacity(count as usize);
    // SAFETY: the driver writes at most `count` records into the buffer and
    // reports how many it wrote back through `count`.
    let fetched = unsafe {
        let ok = sys::esp!(sys::esp_wifi_scan_get_ap_records(&mut count, aps.as_mut_ptr()));
        if ok.is_ok() {
            aps.set_len(count as usize);
        }
        ok
    };
    if let Err(e) = fetched {
        log::warn!("Failed to read scan records: {:?}", e);
        return Vec::new();
    }
    log::debug!("Scan found {} access points", aps.len());

    aps.iter()
        .map(|ap| ScanRecord {
            ssid: std::ffi::CStr::from_bytes_until_nul(&ap.ssid)
                .ok()
                .and_then(|s| s.to_str().ok())
                .unwrap_or("")
                .to_string(),
            bssid: Bssid(ap.bssid),
            rssi: ap.rssi,
        })
        .collect()
}

impl Radio for EspRadio {
    fn configure(&mut self, ssid: &str, password: &str) -> Result<(), DriverError> {
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let client = ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| DriverError::Ssid)?,
            password: password.try_into().map_err(|_| DriverError::Password)?,
            auth_method,
            ..Default::default()
        };
        let config = Configuration::Mixed(client, self.access_point.clone());
        self.wifi.set_configuration(&config).map_err(driver_error)
    }

    fn connect(&mut self) -> Result<(), DriverError> {
        self.wifi.connect().map_err(driver_error)
    }

    fn current_bssid(&mut self) -> Option<Bssid> {
        // SAFETY: `ap_info` is a plain C struct filled in by the driver.
        unsafe {
            let mut ap_info: sys::wifi_ap_record_t = std::mem::zeroed();
            sys::esp!(sys::esp_wifi_sta_get_ap_info(&mut ap_info))
                .ok()
                .map(|()| Bssid(ap_info.bssid))
        }
    }

    fn start_scan(&mut self) -> Result<(), DriverError> {
        self.wifi
            .start_scan(&Default::default(), false)
            .map_err(driver_error)
    }
}
