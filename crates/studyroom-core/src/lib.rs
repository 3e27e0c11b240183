//! # Studyroom Core Library
//!
//! Core logic behind the Studyroom study tracker: a work/break session timer
//! that survives restarts, a daily rollover that clears completed checklist
//! items at local midnight, and a log of study progress per subject. The `studyroom` CLI is a thin layer over
//! this crate.
//!
//! ## Architecture
//!
//! - **Session timer**: a tick-driven Work/Break state machine that writes its
//!   full state to a key-value store on every change
//! - **Timer runner**: tokio task delivering one tick per second while the
//!   timer runs
//! - **Daily rollover**: self-rearming midnight task, cancelled on teardown
//!   or identity change
//! - **Storage**: SQLite key-value, checklist and progress tables, TOML
//!   configuration
//!
//! ## Key Components
//!
//! - [`SessionTimer`]: timer state machine
//! - [`TimerRunner`]: one-second tick source
//! - [`DailyRolloverScheduler`]: midnight auto-clear
//! - [`Database`] / [`ChecklistStore`] / [`ProgressStore`]: persistence
//! - [`Config`]: application configuration

pub mod clock;
pub mod error;
pub mod events;
pub mod notify;
pub mod rollover;
pub mod storage;
pub mod timer;

pub use clock::{AnchoredClock, Clock, SystemClock};
pub use error::{ConfigError, CoreError, NotifyError, StoreError, ValidationError};
pub use events::Event;
pub use notify::{Notifier, Permission, SilentNotifier};
pub use rollover::{DailyRolloverScheduler, RolloverHandle, RolloverTarget};
pub use storage::{
    ChecklistItem, ChecklistStore, ChecklistSummary, Config, Database, KvStore, MemoryStore, ProgressRecord,
    ProgressStore, SubjectProgress,
};
pub use timer::{Phase, SessionTimer, TimerRunner, TimerState};
