//! WiFi provisioning firmware binary.

#[cfg(feature = "esp32")]
fn main() {
    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();

    // Initialize ESP-IDF logger for log crate integration
    esp_idf_svc::log::EspLogger::initialize_default();

    if let Err(e) = firmware::run() {
        log::error!("Provisioning firmware failed: {}", e);
    }
}

#[cfg(feature = "esp32")]
mod firmware {
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use std::error::Error;
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use wifi_provision_esp32::ble::BleProvisioningService;
    use wifi_provision_esp32::config::{ProvisioningConfig, SOFTAP_UDP_PORT};
    use wifi_provision_esp32::persistence::{init_nvs, NvsBackend};
    use wifi_provision_esp32::transport::UdpProvisioningServer;
    use wifi_provision_esp32::wifi::{spawn_scan_scheduler, EspRadio, ScanCache};
    use wifi_provision_esp32::{ConnectionManager, CredentialStore, Provisioner};

    pub fn run() -> Result<(), Box<dyn Error>> {
        let config = ProvisioningConfig::default();
        config.validate()?;

        let peripherals = Peripherals::take()?;
        let sysloop = EspSystemEventLoop::take()?;
        let partition = EspDefaultNvsPartition::take()?;

        let store = Arc::new(CredentialStore::open(
            NvsBackend::new(init_nvs(partition.clone())?),
            config.credential_capacity,
        )?);
        let (radio, events) = EspRadio::new(peripherals.modem, sysloop, Some(partition))?;
        let scan_cache = Arc::new(ScanCache::new(config.max_scan_results));
        let manager = Arc::new(ConnectionManager::new(radio, scan_cache, config.clone()));
        let cancel = CancellationToken::new();

        let pump = {
            let manager = manager.clone();
            let cancel = cancel.clone();
            std::thread::Builder::new()
                .name("wifi-events".into())
                .spawn(move || manager.run_event_loop(&events, &cancel))?
        };
        let scanner = spawn_scan_scheduler(manager.clone(), config.scan_interval, cancel.clone())?;

        // Give the first background scan a chance to land
        for _ in 0..50 {
            if !manager.scan_cache().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        let provisioner = Arc::new(Provisioner::new(manager, store)?);
        match provisioner.connect_known_networks(&cancel) {
            Ok(Some(ssid)) => log::info!("Reconnected to stored network {:?}", ssid),
            Ok(None) => log::info!("No stored network reachable, waiting for provisioning"),
            Err(e) => log::warn!("Stored network reconnect failed: {}", e),
        }

        let ble = BleProvisioningService::start(
            provisioner.clone(),
            config.reassembly_timeout,
            cancel.clone(),
        )?;
        let udp_addr = (Ipv4Addr::UNSPECIFIED, SOFTAP_UDP_PORT);
        let mut udp = UdpProvisioningServer::bind(udp_addr, provisioner, config.reassembly_timeout)?;
        udp.run(&cancel)?;

        cancel.cancel();
        ble.join();
        let _ = scanner.join();
        let _ = pump.join();
        Ok(())
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    println!("This binary requires the 'esp32' feature.");
    println!("Use 'cargo test' for host testing or run the host-provisioner binary.");
}
