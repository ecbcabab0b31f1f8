//! An injectable clock (§9: "All timestamps are a monotonic integer
//! (milliseconds) sourced from a single injectable clock to make scenario
//! tests deterministic.").

use std::sync::RwLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Supplies both a monotonic instant (for interval math: retransmit
/// backoff, staleness checks) and wall-clock milliseconds (for the
/// wire-visible last-contact timestamps).
pub trait TimeProvider: Send + Sync {
    fn now_instant(&self) -> Instant;
    fn now_system_ms(&self) -> i64;
}

/// The real clock, for production use.
#[derive(Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_instant(&self) -> Instant {
        Instant::now()
    }

    fn now_system_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// A settable/advanceable clock for deterministic scenario tests.
pub struct ManualTimeProvider {
    instant: RwLock<Instant>,
    system_ms: RwLock<i64>,
}

impl ManualTimeProvider {
    pub fn new(system_ms: i64) -> Self {
        ManualTimeProvider {
            instant: RwLock::new(Instant::now()),
            system_ms: RwLock::new(system_ms),
        }
    }

    pub fn set_time(&self, system_ms: i64) {
        *self.system_ms.write().unwrap() = system_ms;
    }

    pub fn advance(&self, delta_ms: i64) {
        let mut instant = self.instant.write().unwrap();
        *instant += std::time::Duration::from_millis(delta_ms.max(0) as u64);
        let mut ms = self.system_ms.write().unwrap();
        *ms += delta_ms;
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now_instant(&self) -> Instant {
        *self.instant.read().unwrap()
    }

    fn now_system_ms(&self) -> i64 {
        *self.system_ms.read().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_both_clocks_forward() {
        let clock = ManualTimeProvider::new(1_000);
        let before_instant = clock.now_instant();
        clock.advance(500);
        assert_eq!(clock.now_system_ms(), 1_500);
        assert!(clock.now_instant() >= before_instant);
    }
}
