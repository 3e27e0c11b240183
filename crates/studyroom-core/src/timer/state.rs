use serde::{Deserialize, Serialize};

/// Minimum duration of either phase.
pub const MIN_DURATION_SECS: u32 = 60;
pub const DEFAULT_WORK_SECS: u32 = 25 * 60;
pub const DEFAULT_BREAK_SECS: u32 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Work,
    Break,
}

impl Phase {
    pub fn other(self) -> Self {
        match self {
            Phase::Work => Phase::Break,
            Phase::Break => Phase::Work,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Work => "Work",
            Phase::Break => "Break",
        }
    }
}

/// The full timer record. It is the only source of truth for the countdown;
/// anything displayed is derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerState {
    pub work_duration_secs: u32,
    pub break_duration_secs: u32,
    pub remaining_secs: u32,
    pub phase: Phase,
    pub running: bool,
}

impl Default for TimerState {
    fn default() -> Self {
        Self::with_durations(DEFAULT_WORK_SECS, DEFAULT_BREAK_SECS)
    }
}

impl TimerState {
    /// Idle at the start of a work phase.
    pub fn with_durations(work_duration_secs: u32, break_duration_secs: u32) -> Self {
        let work_duration_secs = work_duration_secs.max(MIN_DURATION_SECS);
        Self {
            work_duration_secs,
            break_duration_secs: break_duration_secs.max(MIN_DURATION_SECS),
            remaining_secs: work_duration_secs,
            phase: Phase::Work,
            running: false,
        }
    }

    pub fn duration_of(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Work => self.work_duration_secs,
            Phase::Break => self.break_duration_secs,
        }
    }

    pub fn phase_duration(&self) -> u32 {
        self.duration_of(self.phase)
    }

    /// Restore the invariants after loading an arbitrary record.
    fn normalized(mut self) -> Self {
        self.work_duration_secs = self.work_duration_secs.max(MIN_DURATION_SECS);
        self.break_duration_secs = self.break_duration_secs.max(MIN_DURATION_SECS);
        self.remaining_secs = self.remaining_secs.min(self.phase_duration());
        self
    }
}

/// On-disk shape of [`TimerState`]: one flat object of scalars.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTimer {
    #[serde(default)]
    pub work_duration: Option<u32>,
    #[serde(default)]
    pub break_duration: Option<u32>,
    #[serde(default)]
    pub time_left: Option<u32>,
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub on_break: bool,
}

impl From<&TimerState> for PersistedTimer {
    fn from(state: &TimerState) -> Self {
        Self {
            work_duration: Some(state.work_duration_secs),
            break_duration: Some(state.break_duration_secs),
            time_left: Some(state.remaining_secs),
            is_running: state.running,
            on_break: state.phase == Phase::Break,
        }
    }
}

impl PersistedTimer {
    /// Rebuild a state, filling gaps from `defaults`.
    ///
    /// A zero or missing duration takes the default; a missing `time_left`
    /// takes the restored phase's full duration.
    pub fn into_state(self, defaults: &TimerState) -> TimerState {
        let pick = |value: Option<u32>, fallback: u32| match value {
            Some(0) | None => fallback,
            Some(v) => v,
        };
        let work_duration_secs = pick(self.work_duration, defaults.work_duration_secs);
        let break_duration_secs = pick(self.break_duration, defaults.break_duration_secs);
        let phase = if self.on_break { Phase::Break } else { Phase::Work };
        let phase_duration = match phase {
            Phase::Work => work_duration_secs,
            Phase::Break => break_duration_secs,
        };
        TimerState {
            work_duration_secs,
            break_duration_secs,
            remaining_secs: self.time_left.unwrap_or(phase_duration),
            phase,
            running: self.is_running,
        }
        .normalized()
    }
}

/// `MM:SS`, minutes not wrapped at the hour.
pub fn format_mm_ss(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
