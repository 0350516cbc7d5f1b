//! Scan results and access point addresses.
//!
//! The [`ScanCache`] is replaced wholesale on every completed scan. It is
//! shared between the radio event context (writer) and the provisioning
//! handlers (readers), so all access goes through one mutex.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

/// Default number of ranked scan entries kept.
pub const MAX_SCAN_RESULTS: usize = 30;

/// Access point hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bssid(pub [u8; 6]);

impl Bssid {
    /// Build from a raw slice; anything other than 6 bytes yields `None`.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for Bssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Error parsing a textual BSSID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidBssid(pub String);

impl fmt::Display for InvalidBssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid BSSID: {:?}", self.0)
    }
}

impl std::error::Error for InvalidBssid {}

impl FromStr for Bssid {
    type Err = InvalidBssid;

    /// Parse `aa:bb:cc:dd:ee:ff` in either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| InvalidBssid(s.to_string()))?;
            if part.len() != 2 {
                return Err(InvalidBssid(s.to_string()));
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| InvalidBssid(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(InvalidBssid(s.to_string()));
        }
        Ok(Self(bytes))
    }
}

/// One access point as reported by the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    /// Network name; empty for hidden networks.
    pub ssid: String,
    pub bssid: Bssid,
    /// Signal strength in dBm.
    pub rssi: i8,
}

/// Ranked cache entry exposed to peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub ssid: String,
    pub rssi: i8,
}

/// Most recent scan, strongest signal first.
#[derive(Debug)]
pub struct ScanCache {
    records: Mutex<Vec<ScanRecord>>,
    capacity: usize,
}

impl Default for ScanCache {
    fn default() -> Self {
        Self::new(MAX_SCAN_RESULTS)
    }
}

impl ScanCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ScanRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the cache with a new scan, ranking by RSSI descending.
    ///
    /// Nothing from the previous scan survives.
    pub fn replace(&self, mut records: Vec<ScanRecord>) {
        records.sort_by(|a, b| b.rssi.cmp(&a.rssi));
        records.truncate(self.capacity);
        log::debug!("Scan cache updated: {} access points", records.len());
        *self.lock() = records;
    }

    /// Full records of the latest scan, strongest first.
    pub fn records(&self) -> Vec<ScanRecord> {
        self.lock().clone()
    }

    /// Ranked `(ssid, rssi)` pairs, strongest first.
    pub fn ranked(&self) -> Vec<ScanEntry> {
        self.lock()
            .iter()
            .map(|r| ScanEntry {
                ssid: r.ssid.clone(),
                rssi: r.rssi,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ssid: &str, last: u8, rssi: i8) -> ScanRecord {
        ScanRecord {
            ssid: ssid.to_string(),
            bssid: Bssid([0x02, 0, 0, 0, 0, last]),
            rssi,
        }
    }

    // ==================== Bssid Tests ====================

    #[test]
    fn test_bssid_display_lowercase() {
        let bssid = Bssid([0xAA, 0xBB, 0xCC, 0x01, 0x02, 0x03]);
        assert_eq!(bssid.to_string(), "aa:bb:cc:01:02:03");
    }

    #[test]
    fn test_bssid_parse() {
        let expected = Bssid([0xAA, 0xBB, 0xCC, 0x01, 0x02, 0x03]);
        assert_eq!("aa:bb:cc:01:02:03".parse::<Bssid>().unwrap(), expected);
        assert_eq!("AA:BB:CC:01:02:03".parse::<Bssid>().unwrap(), expected);
        assert!("aa:bb:cc:01:02".parse::<Bssid>().is_err());
        assert!("aa:bb:cc:01:02:03:04".parse::<Bssid>().is_err());
        assert!("aa:bb:cc:01:02:zz".parse::<Bssid>().is_err());
        assert!("aabbcc010203".parse::<Bssid>().is_err());
    }

    #[test]
    fn test_bssid_from_slice() {
        assert_eq!(Bssid::from_slice(&[1, 2, 3, 4, 5, 6]), Some(Bssid([1, 2, 3, 4, 5, 6])));
        assert_eq!(Bssid::from_slice(&[]), None);
        assert_eq!(Bssid::from_slice(&[1, 2, 3]), None);
    }

    // ==================== ScanCache Tests ====================

    #[test]
    fn test_scan_cache_ranks_by_rssi() {
        let cache = ScanCache::default();
        cache.replace(vec![record("weak", 1, -80), record("strong", 2, -30), record("mid", 3, -55)]);

        let ranked: Vec<String> = cache.ranked().into_iter().map(|e| e.ssid).collect();
        assert_eq!(ranked, vec!["strong", "mid", "weak"]);
    }

    #[test]
    fn test_scan_cache_replaces_wholesale() {
        let cache = ScanCache::default();
        cache.replace(vec![record("old", 1, -40)]);
        cache.replace(vec![record("new", 2, -60)]);

        let ranked = cache.ranked();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].ssid, "new");
    }

    #[test]
    fn test_scan_cache_truncates() {
        let cache = ScanCache::new(3);
        let records = (0..10).map(|i| record("ap", i, -(i as i8) - 20)).collect();
        cache.replace(records);

        assert_eq!(cache.len(), 3);
        let rssi: Vec<i8> = cache.records().iter().map(|r| r.rssi).collect();
        assert_eq!(rssi, vec![-20, -21, -22]);
    }

    #[test]
    fn test_scan_cache_keeps_strong_ap_past_driver_order() {
        let cache = ScanCache::default();
        let mut records: Vec<ScanRecord> =
            (0..40).map(|i| record("far", i, -90)).collect();
        records.push(record("near", 200, -25));
        cache.replace(records);

        assert_eq!(cache.len(), MAX_SCAN_RESULTS);
        assert_eq!(cache.ranked()[0].ssid, "near");
    }

    #[test]
    fn test_scan_cache_empty_replace() {
        let cache = ScanCache::default();
        cache.replace(vec![record("a", 1, -40)]);
        cache.replace(Vec::new());
        assert!(cache.is_empty());
    }
}
