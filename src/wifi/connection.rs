//! WiFi connection state machine.
//!
//! [`ConnectionManager::connect`] drives a bounded retry loop against a
//! [`Radio`]. Association outcomes arrive asynchronously as
//! [`RadioEvent`]s, delivered by whoever owns the driver's event context
//! through [`ConnectionManager::handle_event`] (usually via
//! [`ConnectionManager::run_event_loop`] on a dedicated thread).
//!
//! # States
//!
//! ```text
//! Idle ──connect──> Connecting ──associated──> Connected
//!                        │
//!                        └──retries exhausted──> Failed
//! ```
//!
//! # Failure Classification
//!
//! Every failed attempt is counted in a bucket keyed by its cause: a
//! synchronous driver error from the connect call, an asynchronous
//! disconnect reason, or a timeout. When all attempts fail, any
//! credential-related disconnect reason wins and is reported as
//! [`FailureCause::PasswordIncorrect`]; otherwise the most frequent cause
//! is reported, ties going to the most recent one.

use super::reason::{DisconnectReason, DriverError};
use super::scan::{Bssid, ScanCache, ScanRecord};
use crate::config::ProvisioningConfig;
use crate::timing::{sleep_unless_cancelled, CANCEL_POLL};
use std::fmt;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Maximum SSID length per IEEE 802.11.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum number of distinct failure causes tracked per connect call.
pub const MAX_CAUSES: usize = 10;

/// Abstract station-mode radio.
///
/// `connect` and `start_scan` only issue requests; their outcomes are
/// reported later as [`RadioEvent`]s.
pub trait Radio: Send {
    /// Apply station credentials. Failure here is fatal to a connect call.
    fn configure(&mut self, ssid: &str, password: &str) -> Result<(), DriverError>;

    /// Request association with the configured network.
    fn connect(&mut self) -> Result<(), DriverError>;

    /// BSSID of the access point we are associated with.
    fn current_bssid(&mut self) -> Option<Bssid>;

    /// Request a background scan.
    fn start_scan(&mut self) -> Result<(), DriverError>;
}

/// Asynchronous notification from the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    Associated,
    Disassociated(DisconnectReason),
    ScanDone(Vec<ScanRecord>),
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Failed,
}

/// Classified reason a connect call gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    /// Credential-related disconnects, summed over all attempts.
    PasswordIncorrect { occurrences: u32 },
    /// The connect request itself was rejected by the driver.
    ConnectCall(DriverError),
    /// The access point disassociated us.
    Disconnected(DisconnectReason),
    /// No association outcome within the attempt timeout.
    Timeout,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PasswordIncorrect { occurrences } => {
                write!(f, "password incorrect ({} occurrences)", occurrences)
            }
            Self::ConnectCall(e) => write!(f, "connect call failed: {}", e),
            Self::Disconnected(reason) => write!(f, "disconnected: {}", reason),
            Self::Timeout => write!(f, "connection timed out"),
        }
    }
}

/// Errors returned by [`ConnectionManager::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// SSID is empty or longer than 32 bytes.
    InvalidSsid,
    /// Another connect call is in progress.
    Busy,
    /// The radio rejected the credentials outright.
    Configuration(DriverError),
    /// All attempts failed.
    Failed(FailureCause),
    /// Aborted through the cancellation token.
    Cancelled,
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "invalid SSID"),
            Self::Busy => write!(f, "connection attempt already in progress"),
            Self::Configuration(e) => write!(f, "radio configuration failed: {}", e),
            Self::Failed(cause) => write!(f, "connection failed: {}", cause),
            Self::Cancelled => write!(f, "connection cancelled"),
        }
    }
}

impl std::error::Error for ConnectError {}

/// Successful association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connected {
    /// Access point we associated with, if the driver reports it.
    pub bssid: Option<Bssid>,
}

/// Key of a failure bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    ConnectCall(DriverError),
    Disconnect(DisconnectReason),
    Timeout,
}

/// Occurrences of one cause during a connect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CauseBucket {
    pub cause: Cause,
    pub count: u32,
    /// Attempt index of the most recent occurrence.
    pub last_attempt: u32,
}

/// Per-call failure statistics.
#[derive(Debug, Clone, Default)]
pub struct ErrorTally {
    buckets: Vec<CauseBucket>,
    attempt: u32,
}

impl ErrorTally {
    fn reset(&mut self) {
        self.buckets.clear();
        self.attempt = 0;
    }

    /// Count one occurrence of `cause` at the current attempt.
    pub fn record(&mut self, cause: Cause) {
        let attempt = self.attempt;
        if let Some(bucket) = self.buckets.iter_mut().find(|b| b.cause == cause) {
            bucket.count += 1;
            bucket.last_attempt = attempt;
            return;
        }
        if self.buckets.len() >= MAX_CAUSES {
            log::warn!("Failure table full, dropping {:?}", cause);
            return;
        }
        self.buckets.push(CauseBucket {
            cause,
            count: 1,
            last_attempt: attempt,
        });
    }

    pub fn buckets(&self) -> &[CauseBucket] {
        &self.buckets
    }

    /// Pick the most actionable cause.
    pub fn classify(&self) -> FailureCause {
        let credential_failures: u32 = self
            .buckets
            .iter()
            .filter(|b| matches!(b.cause, Cause::Disconnect(r) if r.is_credential_failure()))
            .map(|b| b.count)
            .sum();
        if credential_failures > 0 {
            return FailureCause::PasswordIncorrect {
                occurrences: credential_failures,
            };
        }

        let worst = self
            .buckets
            .iter()
            .max_by(|a, b| (a.count, a.last_attempt).cmp(&(b.count, b.last_attempt)));
        match worst.map(|b| b.cause) {
            Some(Cause::ConnectCall(e)) => FailureCause::ConnectCall(e),
            Some(Cause::Disconnect(r)) => FailureCause::Disconnected(r),
            Some(Cause::Timeout) | None => FailureCause::Timeout,
        }
    }
}

const CONNECTED_BIT: u8 = 0x01;
const FAILED_BIT: u8 = 0x02;

/// Two-bit completion signal with clear-on-consume semantics.
#[derive(Debug, Default)]
struct CompletionSignal {
    bits: Mutex<u8>,
    cond: Condvar,
}

impl CompletionSignal {
    fn lock(&self) -> MutexGuard<'_, u8> {
        self.bits.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set(&self, bit: u8) {
        *self.lock() |= bit;
        self.cond.notify_all();
    }

    fn clear(&self) {
        *self.lock() = 0;
    }

    /// Wait for any bit, consuming all of them.
    ///
    /// Returns `Ok(0)` on timeout and `Err(())` when cancelled.
    fn wait(&self, timeout: Duration, cancel: &CancellationToken) -> Result<u8, ()> {
        let deadline = Instant::now() + timeout;
        let mut bits = self.lock();
        loop {
            if *bits != 0 {
                return Ok(std::mem::take(&mut *bits));
            }
            if cancel.is_cancelled() {
                return Err(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(0);
            }
            bits = self
                .cond
                .wait_timeout(bits, remaining.min(CANCEL_POLL))
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }
}

/// Drives association attempts and tracks connection state.
pub struct ConnectionManager<R> {
    radio: Mutex<R>,
    state: Mutex<ConnectionState>,
    signal: CompletionSignal,
    tally: Mutex<ErrorTally>,
    scan_cache: Arc<ScanCache>,
    config: ProvisioningConfig,
}

impl<R: Radio> ConnectionManager<R> {
    pub fn new(radio: R, scan_cache: Arc<ScanCache>, config: ProvisioningConfig) -> Self {
        Self {
            radio: Mutex::new(radio),
            state: Mutex::new(ConnectionState::Idle),
            signal: CompletionSignal::default(),
            tally: Mutex::new(ErrorTally::default()),
            scan_cache,
            config,
        }
    }

    fn lock_radio(&self) -> MutexGuard<'_, R> {
        self.radio.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_tally(&self) -> MutexGuard<'_, ErrorTally> {
        self.tally.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: ConnectionState) {
        *self.lock_state() = state;
    }

    pub fn state(&self) -> ConnectionState {
        *self.lock_state()
    }

    pub fn is_connecting(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    /// Failure statistics of the most recent connect call.
    pub fn last_tally(&self) -> ErrorTally {
        self.lock_tally().clone()
    }

    pub fn scan_cache(&self) -> &Arc<ScanCache> {
        &self.scan_cache
    }

    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    /// Connect to `ssid`, retrying up to `max_retries` times.
    pub fn connect(&self, ssid: &str, password: &str) -> Result<Connected, ConnectError> {
        self.connect_with_cancel(ssid, password, &CancellationToken::new())
    }

    /// Like [`connect`](Self::connect), but aborts within ~100 ms of
    /// `cancel` firing.
    pub fn connect_with_cancel(
        &self,
        ssid: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<Connected, ConnectError> {
        if ssid.is_empty() || ssid.len() > MAX_SSID_LEN {
            return Err(ConnectError::InvalidSsid);
        }

        {
            let mut state = self.lock_state();
            if *state == ConnectionState::Connecting {
                log::warn!("Connect to {:?} rejected: attempt in progress", ssid);
                return Err(ConnectError::Busy);
            }
            *state = ConnectionState::Connecting;
        }

        let result = self.run_attempts(ssid, password, cancel);
        self.set_state(match &result {
            Ok(_) => ConnectionState::Connected,
            Err(ConnectError::Cancelled) => ConnectionState::Idle,
            Err(_) => ConnectionState::Failed,
        });
        result
    }

    fn run_attempts(
        &self,
        ssid: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<Connected, ConnectError> {
        self.lock_tally().reset();

        self.lock_radio().configure(ssid, password).map_err(|e| {
            log::error!("Radio rejected configuration for {:?}: {}", ssid, e);
            ConnectError::Configuration(e)
        })?;

        let max_retries = self.config.max_retries;
        for attempt in 0..max_retries {
            if cancel.is_cancelled() {
                return Err(ConnectError::Cancelled);
            }
            self.lock_tally().attempt = attempt;

            // Drop any completion left over from an earlier attempt.
            let issued = {
                let mut radio = self.lock_radio();
                self.signal.clear();
                radio.connect()
            };
            match issued {
                Err(e) => {
                    log::error!("Connect call failed: {} (try {}/{})", e, attempt + 1, max_retries);
                    self.lock_tally().record(Cause::ConnectCall(e));
                }
                Ok(()) => {
                    log::info!("Connecting to {:?} (try {}/{})", ssid, attempt + 1, max_retries);
                    let bits = self
                        .signal
                        .wait(self.config.attempt_timeout, cancel)
                        .map_err(|()| ConnectError::Cancelled)?;

                    if bits & CONNECTED_BIT != 0 {
                        let bssid = self.lock_radio().current_bssid();
                        match bssid {
                            Some(b) => log::info!("Connected to {:?} via {}", ssid, b),
                            None => log::warn!("Connected to {:?}, BSSID unavailable", ssid),
                        }
                        return Ok(Connected { bssid });
                    } else if bits & FAILED_BIT != 0 {
                        log::warn!("Association with {:?} failed (try {}/{})", ssid, attempt + 1, max_retries);
                    } else {
                        log::warn!("Connection timeout for {:?} (try {}/{})", ssid, attempt + 1, max_retries);
                        self.lock_tally().record(Cause::Timeout);
                    }
                }
            }

            if attempt + 1 < max_retries && !sleep_unless_cancelled(self.config.retry_backoff, cancel) {
                return Err(ConnectError::Cancelled);
            }
        }

        let tally = self.lock_tally();
        log::info!("Failure statistics after {} attempts:", max_retries);
        for bucket in tally.buckets() {
            log::info!(
                "  {:?}: {} time(s), last at try {}",
                bucket.cause,
                bucket.count,
                bucket.last_attempt + 1
            );
        }
        let cause = tally.classify();
        log::error!("Giving up on {:?}: {}", ssid, cause);
        Err(ConnectError::Failed(cause))
    }

    /// Feed one radio event into the state machine.
    pub fn handle_event(&self, event: RadioEvent) {
        match event {
            RadioEvent::Associated => {
                if self.is_connecting() {
                    self.signal.set(CONNECTED_BIT);
                } else {
                    log::debug!("Association outside a connect call");
                }
            }
            RadioEvent::Disassociated(reason) => {
                let mut state = self.lock_state();
                let current = *state;
                match current {
                    ConnectionState::Connecting => {
                        drop(state);
                        log::warn!("WiFi disconnect during attempt: {}", reason);
                        self.lock_tally().record(Cause::Disconnect(reason));
                        self.signal.set(FAILED_BIT);
                    }
                    ConnectionState::Connected => {
                        log::warn!("WiFi connection lost: {}", reason);
                        *state = ConnectionState::Idle;
                    }
                    _ => log::debug!("Disassociated while idle: {}", reason),
                }
            }
            RadioEvent::ScanDone(records) => self.scan_cache.replace(records),
        }
    }

    /// Dispatch events from `events` until the sender hangs up or `cancel`
    /// fires.
    pub fn run_event_loop(&self, events: &Receiver<RadioEvent>, cancel: &CancellationToken) {
        while !cancel.is_cancelled() {
            match events.recv_timeout(CANCEL_POLL) {
                Ok(event) => self.handle_event(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        log::debug!("Radio event loop stopped");
    }

    /// Ask the radio for a scan unless a connect call is running.
    ///
    /// Returns whether a scan was requested.
    pub fn request_scan(&self) -> Result<bool, DriverError> {
        if self.is_connecting() {
            log::debug!("Skipping scan while connecting");
            return Ok(false);
        }
        self.lock_radio().start_scan()?;
        Ok(true)
    }
}
