//! Terminal notification sink: a bell for the sound and a stderr line for
//! the platform notification.

use std::io::Write;

use studyroom_core::storage::NotificationsConfig;
use studyroom_core::{Notifier, NotifyError, Permission};

pub struct TerminalNotifier {
    sound: bool,
    permission: Permission,
}

impl TerminalNotifier {
    pub fn from_config(config: &NotificationsConfig) -> Self {
        Self {
            sound: config.enabled && config.sound,
            permission: if config.enabled {
                config.permission
            } else {
                Permission::Denied
            },
        }
    }
}

impl Notifier for TerminalNotifier {
    fn permission(&self) -> Permission {
        self.permission
    }

    fn play_sound(&self) -> Result<(), NotifyError> {
        if !self.sound {
            return Ok(());
        }
        let mut err = std::io::stderr();
        err.write_all(b"\x07")
            .and_then(|_| err.flush())
            .map_err(|e| NotifyError::PlaybackFailed(e.to_string()))
    }

    fn show_notification(&self, text: &str) -> Result<(), NotifyError> {
        if self.permission != Permission::Granted {
            return Err(NotifyError::PermissionDenied);
        }
        writeln!(std::io::stderr(), "\n🔔 {text}").map_err(|e| NotifyError::PlaybackFailed(e.to_string()))
    }
}
