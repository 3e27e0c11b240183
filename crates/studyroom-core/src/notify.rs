//! Notification sinks used when a timer phase ends.
//!
//! Both calls are fire-and-forget from the timer's point of view: errors are
//! returned so the caller can log them, never so it can react to them.

use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// Platform notification permission as last reported by the user/OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    Denied,
    /// Never asked.
    #[default]
    Default,
}

/// Sound and notification output.
pub trait Notifier: Send {
    /// Current permission. Must not prompt the user.
    fn permission(&self) -> Permission;

    fn play_sound(&self) -> Result<(), NotifyError>;

    fn show_notification(&self, text: &str) -> Result<(), NotifyError>;
}

/// Drops everything. Used when notifications are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn permission(&self) -> Permission {
        Permission::Denied
    }

    fn play_sound(&self) -> Result<(), NotifyError> {
        Ok(())
    }

    fn show_notification(&self, _text: &str) -> Result<(), NotifyError> {
        Err(NotifyError::PermissionDenied)
    }
}

/// Text shown when the phase that just ended was work (`true`) or a break.
pub fn phase_end_message(work_just_ended: bool) -> &'static str {
    if work_just_ended {
        "Work session done! Take a break."
    } else {
        "Break Over! Time to Work."
    }
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn permission(&self) -> Permission {
        (**self).permission()
    }

    fn play_sound(&self) -> Result<(), NotifyError> {
        (**self).play_sound()
    }

    fn show_notification(&self, text: &str) -> Result<(), NotifyError> {
        (**self).show_notification(text)
    }
}
