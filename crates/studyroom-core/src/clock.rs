//! Wall-clock sources.
//!
//! The rollover scheduler and the checklist both need "local now". Production
//! code reads the system clock; tests anchor a fixed wall time to tokio's
//! monotonic clock so that `tokio::time::pause()`/`advance()` move both.

use chrono::{DateTime, FixedOffset, Local, TimeZone};

/// Source of the current local wall time.
pub trait Clock: Send + Sync + 'static {
    type Tz: TimeZone + Send + Sync;

    fn now(&self) -> DateTime<Self::Tz>;
}

/// The machine's local clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Tz = Local;

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A wall clock pinned to `anchor` at construction time that then advances
/// with `tokio::time::Instant`.
#[derive(Debug, Clone)]
pub struct AnchoredClock {
    anchor: DateTime<FixedOffset>,
    started: tokio::time::Instant,
}

impl AnchoredClock {
    pub fn new(anchor: DateTime<FixedOffset>) -> Self {
        Self {
            anchor,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for AnchoredClock {
    type Tz = FixedOffset;

    fn now(&self) -> DateTime<FixedOffset> {
        let elapsed = self.started.elapsed();
        let elapsed = chrono::Duration::from_std(elapsed).unwrap_or(chrono::Duration::zero());
        self.anchor + elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn anchored_clock_follows_tokio_time() {
        let anchor = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 1, 23, 59, 58)
            .unwrap();
        let clock = AnchoredClock::new(anchor);
        assert_eq!(clock.now(), anchor);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(clock.now(), anchor + chrono::Duration::seconds(2));
    }
}
