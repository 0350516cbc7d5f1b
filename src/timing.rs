//! Cancellable blocking waits.

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Granularity at which blocking waits observe cancellation.
pub(crate) const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Sleep for `duration`, waking early on cancellation.
///
/// Returns `false` if the token was cancelled.
pub(crate) fn sleep_unless_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        std::thread::sleep(remaining.min(CANCEL_POLL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_completes() {
        let start = Instant::now();
        assert!(sleep_unless_cancelled(Duration::from_millis(20), &CancellationToken::new()));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_sleep_cancelled_early() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            trigger.cancel();
        });
        let start = Instant::now();
        assert!(!sleep_unless_cancelled(Duration::from_secs(10), &cancel));
        assert!(start.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }
}
