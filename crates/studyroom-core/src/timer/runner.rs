//! One-second tick source for [`SessionTimer`].
//!
//! The timer lives behind a mutex shared with a spawned tokio task. Each tick
//! runs entirely under that lock, so ticks never overlap and a `pause()` or
//! `reset()` that has returned can never be followed by a stale tick: the
//! ticker re-checks `running` after taking the lock and exits if it is off.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use super::session::SessionTimer;
use super::state::TimerState;
use crate::events::Event;
use crate::notify::Notifier;
use crate::storage::KvStore;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

type Shared<S, N> = Arc<Mutex<SessionTimer<S, N>>>;

fn lock<S, N>(timer: &Mutex<SessionTimer<S, N>>) -> MutexGuard<'_, SessionTimer<S, N>> {
    timer.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns a [`SessionTimer`] and keeps a ticker alive exactly while it runs.
///
/// Must be created and driven from inside a tokio runtime.
pub struct TimerRunner<S, N> {
    timer: Shared<S, N>,
    ticker: Option<JoinHandle<()>>,
    events: broadcast::Sender<Event>,
}

impl<S, N> TimerRunner<S, N>
where
    S: KvStore + 'static,
    N: Notifier + 'static,
{
    /// Wrap `timer`. A timer restored in the running state starts ticking
    /// immediately.
    pub fn new(timer: SessionTimer<S, N>) -> Self {
        let (events, _) = broadcast::channel(64);
        let running = timer.is_running();
        let mut runner = Self {
            timer: Arc::new(Mutex::new(timer)),
            ticker: None,
            events,
        };
        if running {
            debug!("resuming restored timer");
            runner.spawn_ticker();
        }
        runner
    }

    /// Events produced by ticks (phase ends). Commands return theirs directly.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn state(&self) -> TimerState {
        *lock(&self.timer).state()
    }

    pub fn snapshot(&self) -> Event {
        lock(&self.timer).snapshot()
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start the timer. A timer that is already running but has no ticker
    /// (after [`Self::shutdown`]) gets its ticker back.
    pub fn start(&mut self) -> Option<Event> {
        let (event, running) = {
            let mut timer = lock(&self.timer);
            (timer.start(), timer.is_running())
        };
        if running && !self.is_ticking() {
            self.spawn_ticker();
        }
        event
    }

    pub fn pause(&mut self) -> Option<Event> {
        let event = lock(&self.timer).pause();
        self.cancel_ticker();
        event
    }

    pub fn toggle(&mut self) -> Option<Event> {
        if lock(&self.timer).is_running() {
            self.pause()
        } else {
            self.start()
        }
    }

    pub fn reset(&mut self) -> Option<Event> {
        let event = lock(&self.timer).reset();
        self.cancel_ticker();
        event
    }

    pub fn set_work_duration(&mut self, minutes: i64) -> Option<Event> {
        lock(&self.timer).set_work_duration(minutes)
    }

    pub fn set_break_duration(&mut self, minutes: i64) -> Option<Event> {
        lock(&self.timer).set_break_duration(minutes)
    }

    /// Stop ticking without touching the timer state. The persisted record
    /// keeps `running` so the next runner resumes it.
    pub fn shutdown(&mut self) {
        self.cancel_ticker();
    }

    fn spawn_ticker(&mut self) {
        self.cancel_ticker();

        let timer = self.timer.clone();
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let event = {
                    let mut guard = lock(&timer);
                    if !guard.is_running() {
                        break;
                    }
                    guard.tick()
                };
                if let Some(event) = event {
                    let _ = events.send(event);
                }
            }
            debug!("ticker stopped");
        });
        self.ticker = Some(handle);
    }

    fn cancel_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }
}

impl<S, N> Drop for TimerRunner<S, N> {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }
}
