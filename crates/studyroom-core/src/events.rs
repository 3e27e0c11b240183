use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::Phase;

/// Every state change in the system produces an Event.
/// The CLI prints them; observers subscribe to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        phase: Phase,
        remaining_secs: u32,
        at: DateTime<Utc>,
    },
    TimerPaused {
        phase: Phase,
        remaining_secs: u32,
        at: DateTime<Utc>,
    },
    TimerReset {
        remaining_secs: u32,
        at: DateTime<Utc>,
    },
    /// A countdown hit zero and the timer switched to the other phase.
    PhaseEnded {
        ended: Phase,
        next: Phase,
        remaining_secs: u32,
        at: DateTime<Utc>,
    },
    /// A configured duration changed.
    DurationChanged {
        phase: Phase,
        duration_secs: u32,
        remaining_secs: u32,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        phase: Phase,
        running: bool,
        remaining_secs: u32,
        work_duration_secs: u32,
        break_duration_secs: u32,
        display: String,
        at: DateTime<Utc>,
    },
    /// Completed checklist items of `day` were cleared at the day boundary.
    RolloverCompleted {
        user_id: String,
        day: NaiveDate,
        cleared: usize,
        at: DateTime<Utc>,
    },
    RolloverFailed {
        user_id: String,
        day: NaiveDate,
        message: String,
        at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = Event::PhaseEnded {
            ended: Phase::Work,
            next: Phase::Break,
            remaining_secs: 300,
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PhaseEnded");
        assert_eq!(json["ended"], "work");
        assert_eq!(json["next"], "break");
    }
}
