pub mod checklist;
pub mod config;
pub mod progress;
pub mod run;
pub mod timer;

use serde::Serialize;
use studyroom_core::storage::Database;
use studyroom_core::{Config, Notifier, SessionTimer, SilentNotifier, ValidationError};

use crate::notifier::TerminalNotifier;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

pub type CliTimer = SessionTimer<Database, Box<dyn Notifier>>;

pub fn notifier_for(config: &Config) -> Box<dyn Notifier> {
    if config.notifications.enabled {
        Box::new(TerminalNotifier::from_config(&config.notifications))
    } else {
        Box::new(SilentNotifier)
    }
}

/// Open the persisted timer, seeded from config when nothing is stored yet.
pub fn open_timer(config: &Config) -> Result<CliTimer, Box<dyn std::error::Error>> {
    let db = Database::open()?;
    Ok(SessionTimer::load(db, notifier_for(config), config.timer_defaults()))
}

/// `--user` wins over `checklist.user_id`.
pub fn resolve_user(flag: Option<String>, config: &Config) -> Result<String, ValidationError> {
    let user = flag.unwrap_or_else(|| config.checklist.user_id.clone());
    let user = user.trim();
    if user.is_empty() {
        return Err(ValidationError::Empty("user".to_string()));
    }
    Ok(user.to_string())
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}
