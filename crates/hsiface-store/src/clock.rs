use std::time::Instant;

use chrono::{DateTime, Utc};

/// Converts between the process-relative `Instant`s `hsiface-core` uses and
/// the wall-clock timestamps the store persists, anchored once at process
/// start. `Instant` carries no epoch of its own, so this is the only way to
/// give a deadline a representation that survives a restart.
#[derive(Debug, Clone, Copy)]
pub struct ProcessClock {
    instant_anchor: Instant,
    utc_anchor: DateTime<Utc>,
}

impl ProcessClock {
    pub fn new(instant_anchor: Instant, utc_anchor: DateTime<Utc>) -> Self {
        ProcessClock {
            instant_anchor,
            utc_anchor,
        }
    }

    pub fn started_now() -> Self {
        ProcessClock::new(Instant::now(), Utc::now())
    }

    pub fn to_utc(self, instant: Instant) -> DateTime<Utc> {
        match instant.checked_duration_since(self.instant_anchor) {
            Some(elapsed) => self.utc_anchor + elapsed,
            None => self.utc_anchor - self.instant_anchor.duration_since(instant),
        }
    }

    pub fn to_instant(self, utc: DateTime<Utc>) -> Instant {
        match (utc - self.utc_anchor).to_std() {
            Ok(elapsed) => self.instant_anchor + elapsed,
            Err(_) => {
                let behind = (self.utc_anchor - utc).to_std().unwrap_or_default();
                self.instant_anchor - behind
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn round_trips_through_utc() {
        let clock = ProcessClock::started_now();
        let later = Instant::now() + Duration::from_secs(30);
        let utc = clock.to_utc(later);
        let back = clock.to_instant(utc);
        // Sub-microsecond drift from the chrono round trip is fine; the
        // deadline only needs second-level precision in practice.
        let diff = if back >= later {
            back - later
        } else {
            later - back
        };
        assert!(diff < Duration::from_millis(1));
    }
}
