//! Injectable clock.
//!
//! Wall-clock time enters the engine in exactly four places: run-id
//! generation, the manifest timestamp, the decision timestamp, and override
//! expiry comparison. All of them go through this trait so tests pin
//! timestamps deterministically.

use chrono::{DateTime, SecondsFormat, Utc};

pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Production clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Run identifier derived from the clock: `YYYYMMDDTHHMMSSZ`.
pub fn run_id_from(clock: &dyn Clock) -> String {
    clock.now_utc().format("%Y%m%dT%H%M%SZ").to_string()
}

/// RFC 3339 UTC timestamp with second precision.
pub fn timestamp_utc(clock: &dyn Clock) -> String {
    clock
        .now_utc()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_id_format() {
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap());
        assert_eq!(run_id_from(&clock), "20260314T092653Z");
        assert_eq!(timestamp_utc(&clock), "2026-03-14T09:26:53Z");
    }
}
