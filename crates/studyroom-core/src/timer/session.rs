//! Work/break session timer.
//!
//! The timer is a plain state machine with no internal thread: something
//! else (normally [`super::TimerRunner`]) calls `tick()` once per second while
//! it is running.
//!
//! ## State Transitions
//!
//! ```text
//! Idle-Work  --start-->  Running-Work  --tick@0-->  Running-Break
//!     ^                      |                           |
//!     +-------- reset -------+---- pause --> Idle-*  <---+
//! ```
//!
//! Every mutation writes the whole record to the key-value store under
//! [`TIMER_STATE_KEY`]. A failed write is logged; the in-memory state stays
//! authoritative for the rest of the session.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::state::{format_mm_ss, Phase, PersistedTimer, TimerState, MIN_DURATION_SECS};
use crate::events::Event;
use crate::notify::{phase_end_message, Notifier, Permission};
use crate::storage::KvStore;

/// Fixed key of the persisted timer record.
pub const TIMER_STATE_KEY: &str = "pomodoroTimerState";

/// Largest minute count whose seconds still fit the record.
const MAX_MINUTES: i64 = (u32::MAX / 60) as i64;

/// Called on every phase switch with `true` when work just ended.
pub type PhaseObserver = Box<dyn FnMut(bool) + Send>;

pub struct SessionTimer<S, N> {
    state: TimerState,
    store: S,
    notifier: N,
    observer: Option<PhaseObserver>,
}

impl<S: KvStore, N: Notifier> SessionTimer<S, N> {
    /// Restore the timer from `store`, or start from `defaults` when nothing
    /// usable is stored there.
    pub fn load(store: S, notifier: N, defaults: TimerState) -> Self {
        let state = match store.get(TIMER_STATE_KEY) {
            Ok(Some(json)) => match serde_json::from_str::<PersistedTimer>(&json) {
                Ok(record) => record.into_state(&defaults),
                Err(e) => {
                    warn!(error = %e, "discarding unreadable timer record");
                    defaults
                }
            },
            Ok(None) => defaults,
            Err(e) => {
                warn!(error = %e, "timer store unavailable, using defaults");
                defaults
            }
        };
        debug!(?state, "timer loaded");
        Self {
            state,
            store,
            notifier,
            observer: None,
        }
    }

    /// Register the phase-end observer, replacing any previous one.
    pub fn set_observer(&mut self, observer: impl FnMut(bool) + Send + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn with_observer(mut self, observer: impl FnMut(bool) + Send + 'static) -> Self {
        self.set_observer(observer);
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn remaining_secs(&self) -> u32 {
        self.state.remaining_secs
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        Event::StateSnapshot {
            phase: self.state.phase,
            running: self.state.running,
            remaining_secs: self.state.remaining_secs,
            work_duration_secs: self.state.work_duration_secs,
            break_duration_secs: self.state.break_duration_secs,
            display: format!(
                "{}: {}",
                self.state.phase.label(),
                format_mm_ss(self.state.remaining_secs)
            ),
            at: Utc::now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self) -> Option<Event> {
        if self.state.running {
            return None;
        }
        self.state.running = true;
        self.persist();
        info!(phase = ?self.state.phase, remaining = self.state.remaining_secs, "timer started");
        Some(Event::TimerStarted {
            phase: self.state.phase,
            remaining_secs: self.state.remaining_secs,
            at: Utc::now(),
        })
    }

    pub fn pause(&mut self) -> Option<Event> {
        if !self.state.running {
            return None;
        }
        self.state.running = false;
        self.persist();
        info!(phase = ?self.state.phase, remaining = self.state.remaining_secs, "timer paused");
        Some(Event::TimerPaused {
            phase: self.state.phase,
            remaining_secs: self.state.remaining_secs,
            at: Utc::now(),
        })
    }

    /// Start when idle, pause when running.
    pub fn toggle(&mut self) -> Option<Event> {
        if self.state.running {
            self.pause()
        } else {
            self.start()
        }
    }

    pub fn reset(&mut self) -> Option<Event> {
        self.state.running = false;
        self.state.phase = Phase::Work;
        self.state.remaining_secs = self.state.work_duration_secs;
        self.persist();
        info!("timer reset");
        Some(Event::TimerReset {
            remaining_secs: self.state.remaining_secs,
            at: Utc::now(),
        })
    }

    /// Advance the countdown by one second.
    ///
    /// Returns `Some(Event::PhaseEnded)` on the tick that finds the countdown
    /// already at zero; that tick switches phase and keeps running.
    pub fn tick(&mut self) -> Option<Event> {
        if !self.state.running {
            return None;
        }
        if self.state.remaining_secs > 0 {
            self.state.remaining_secs -= 1;
            self.persist();
            return None;
        }

        let ended = self.state.phase;
        let work_just_ended = ended == Phase::Work;
        self.announce_phase_end(work_just_ended);

        self.state.phase = ended.other();
        self.state.remaining_secs = self.state.phase_duration();
        self.persist();
        info!(ended = ?ended, next = ?self.state.phase, "phase ended");

        if let Some(observer) = self.observer.as_mut() {
            observer(work_just_ended);
        }

        Some(Event::PhaseEnded {
            ended,
            next: self.state.phase,
            remaining_secs: self.state.remaining_secs,
            at: Utc::now(),
        })
    }

    /// Set the work duration. `minutes` below 1 is treated as 1. If a work
    /// phase is current its countdown restarts at the new length right away.
    pub fn set_work_duration(&mut self, minutes: i64) -> Option<Event> {
        self.set_duration(Phase::Work, minutes)
    }

    /// Break-phase counterpart of [`Self::set_work_duration`].
    pub fn set_break_duration(&mut self, minutes: i64) -> Option<Event> {
        self.set_duration(Phase::Break, minutes)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn set_duration(&mut self, phase: Phase, minutes: i64) -> Option<Event> {
        let secs = (minutes.clamp(1, MAX_MINUTES) as u32) * 60;
        debug_assert!(secs >= MIN_DURATION_SECS);
        match phase {
            Phase::Work => self.state.work_duration_secs = secs,
            Phase::Break => self.state.break_duration_secs = secs,
        }
        if self.state.phase == phase {
            self.state.remaining_secs = secs;
        }
        self.persist();
        info!(?phase, duration_secs = secs, "duration changed");
        Some(Event::DurationChanged {
            phase,
            duration_secs: secs,
            remaining_secs: self.state.remaining_secs,
            at: Utc::now(),
        })
    }

    fn announce_phase_end(&self, work_just_ended: bool) {
        if let Err(e) = self.notifier.play_sound() {
            warn!(error = %e, "notification sound failed");
        }
        if self.notifier.permission() == Permission::Granted {
            if let Err(e) = self
                .notifier
                .show_notification(phase_end_message(work_just_ended))
            {
                warn!(error = %e, "platform notification failed");
            }
        }
    }

    fn persist(&self) {
        let record = PersistedTimer::from(&self.state);
        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "could not encode timer record");
                return;
            }
        };
        if let Err(e) = self.store.put(TIMER_STATE_KEY, &json) {
            warn!(error = %e, "timer state not persisted");
        }
    }
}
