//! Host-based provisioning device for development and testing.
//!
//! Runs the UDP provisioning transport against a simulated radio and a
//! file-backed credential store, so peer apps can be exercised without
//! hardware.
//!
//! # Usage
//!
//! ```bash
//! PROVISION_NETWORKS="Home:secret123,Office:officepw" cargo run --bin host-provisioner
//! ```
//!
//! # Environment
//!
//! - `PROVISION_BIND` - UDP bind address (default `0.0.0.0:12414`)
//! - `PROVISION_STORE` - credential file (default `~/.wifi-provision-esp32/credentials.json`)
//! - `PROVISION_NETWORKS` - `ssid:password` pairs the simulated radio accepts

use log::{error, info, warn};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wifi_provision_esp32::config::SOFTAP_UDP_PORT;
use wifi_provision_esp32::persistence_host::FileBackend;
use wifi_provision_esp32::transport::UdpProvisioningServer;
use wifi_provision_esp32::wifi::simulated::{SimulatedNetwork, SimulatedRadio};
use wifi_provision_esp32::wifi::{spawn_scan_scheduler, ScanCache};
use wifi_provision_esp32::{ConnectionManager, CredentialStore, ProvisioningConfig, Provisioner};

/// Parse `ssid:password,ssid:password`; signal strengths descend from -40 dBm.
fn parse_networks(list: &str) -> Vec<SimulatedNetwork> {
    list.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .enumerate()
        .filter_map(|(i, entry)| match entry.trim().split_once(':') {
            Some((ssid, password)) => {
                let rssi = (-40 - 5 * i as i32).max(-100) as i8;
                Some(SimulatedNetwork::new(ssid, password, rssi))
            }
            None => {
                warn!("Ignoring network {:?}: expected ssid:password", entry);
                None
            }
        })
        .collect()
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=== WiFi Provisioning Host starting ===");

    let bind: SocketAddr = match std::env::var("PROVISION_BIND") {
        Ok(addr) => match addr.parse() {
            Ok(addr) => addr,
            Err(e) => {
                error!("Invalid PROVISION_BIND {:?}: {}", addr, e);
                std::process::exit(1);
            }
        },
        Err(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, SOFTAP_UDP_PORT)),
    };
    let backend = match std::env::var("PROVISION_STORE") {
        Ok(path) => FileBackend::new(path),
        Err(_) => match FileBackend::at_default_path() {
            Ok(backend) => backend,
            Err(e) => {
                error!("Cannot locate credential file: {}", e);
                std::process::exit(1);
            }
        },
    };
    let networks = parse_networks(&std::env::var("PROVISION_NETWORKS").unwrap_or_default());
    info!("Simulating {} network(s)", networks.len());

    let config = ProvisioningConfig::default();
    let store = match CredentialStore::open(backend, config.credential_capacity) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open credential store: {}", e);
            std::process::exit(1);
        }
    };

    let (radio, events) = SimulatedRadio::new(networks);
    let scan_cache = Arc::new(ScanCache::new(config.max_scan_results));
    let manager = Arc::new(ConnectionManager::new(radio, scan_cache, config.clone()));
    let cancel = CancellationToken::new();

    let pump_manager = manager.clone();
    let pump_cancel = cancel.clone();
    let pump = tokio::task::spawn_blocking(move || pump_manager.run_event_loop(&events, &pump_cancel));

    let scanner = match spawn_scan_scheduler(manager.clone(), config.scan_interval, cancel.clone()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Failed to start scan scheduler: {}", e);
            None
        }
    };

    let provisioner = match Provisioner::new(manager, store) {
        Ok(provisioner) => Arc::new(provisioner),
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let mut server = match UdpProvisioningServer::bind(bind, provisioner, config.reassembly_timeout) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to bind {}: {}", bind, e);
            std::process::exit(1);
        }
    };

    let server_cancel = cancel.clone();
    let server_task = tokio::task::spawn_blocking(move || server.run(&server_cancel));

    info!("Waiting for provisioning requests (Ctrl+C to exit)...");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("UDP server error: {}", e),
                Err(e) => error!("UDP server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
    }

    cancel.cancel();
    if let Some(scanner) = scanner {
        let _ = scanner.join();
    }
    let _ = pump.await;

    info!("Shutdown complete");
}
