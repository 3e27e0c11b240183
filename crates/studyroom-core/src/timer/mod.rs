mod runner;
mod session;
mod state;

pub use runner::{TimerRunner, TICK_INTERVAL};
pub use session::{PhaseObserver, SessionTimer, TIMER_STATE_KEY};
pub use state::{
    format_mm_ss, Phase, PersistedTimer, TimerState, DEFAULT_BREAK_SECS, DEFAULT_WORK_SECS,
    MIN_DURATION_SECS,
};
