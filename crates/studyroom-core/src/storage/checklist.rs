//! Daily checklist.
//!
//! Items belong to one user and one local calendar day. Only the current
//! day's items are listed; the daily rollover deletes the completed ones of
//! the day that just ended.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::database::Database;
use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result, StoreError, ValidationError};
use crate::rollover::RolloverTarget;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub completed: bool,
    /// Local calendar day the item belongs to.
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    /// Nothing ticked off yet.
    Idle,
    Started,
    /// At least half done.
    Halfway,
    Done,
}

impl Mood {
    pub fn emoji(self) -> &'static str {
        match self {
            Mood::Idle => "😴",
            Mood::Started => "⌛😌",
            Mood::Halfway => "👍🙂",
            Mood::Done => "🎉✅",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistSummary {
    pub completed: usize,
    pub total: usize,
    pub mood: Mood,
}

impl ChecklistSummary {
    pub fn of(items: &[ChecklistItem]) -> Self {
        let total = items.len();
        let completed = items.iter().filter(|i| i.completed).count();
        let mood = if completed == 0 {
            Mood::Idle
        } else if completed == total {
            Mood::Done
        } else if completed * 2 >= total {
            Mood::Halfway
        } else {
            Mood::Started
        };
        Self {
            completed,
            total,
            mood,
        }
    }
}

/// Checklist operations over a [`Database`], dated by a [`Clock`].
pub struct ChecklistStore<C = SystemClock> {
    db: Mutex<Database>,
    clock: C,
}

impl ChecklistStore<SystemClock> {
    pub fn new(db: Database) -> Self {
        Self::with_clock(db, SystemClock)
    }
}

impl<C: Clock> ChecklistStore<C> {
    pub fn with_clock(db: Database, clock: C) -> Self {
        Self {
            db: Mutex::new(db),
            clock,
        }
    }

    /// Current local day according to the store's clock.
    pub fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    pub fn add(&self, user_id: &str, title: &str) -> Result<ChecklistItem> {
        require_user(user_id)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::Empty("title".into()).into());
        }
        let now = self.clock.now();
        let item = ChecklistItem {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            completed: false,
            date: now.date_naive(),
            created_at: now.with_timezone(&Utc),
        };
        self.db().insert_item(&item)?;
        Ok(item)
    }

    pub fn today_items(&self, user_id: &str) -> Result<Vec<ChecklistItem>> {
        self.items_for_day(user_id, self.today())
    }

    pub fn items_for_day(&self, user_id: &str, day: NaiveDate) -> Result<Vec<ChecklistItem>> {
        require_user(user_id)?;
        Ok(self.db().items_for_day(user_id, day)?)
    }

    /// Flip an item's completion. Returns the new value.
    pub fn toggle(&self, user_id: &str, id: &str) -> Result<bool> {
        require_user(user_id)?;
        let db = self.db();
        let current = db
            .item_completed(user_id, id)?
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        db.set_completed(user_id, id, !current)?;
        Ok(!current)
    }

    pub fn delete(&self, user_id: &str, id: &str) -> Result<()> {
        require_user(user_id)?;
        if !self.db().delete_item(user_id, id)? {
            return Err(StoreError::NotFound { id: id.to_string() }.into());
        }
        Ok(())
    }

    /// Delete completed items of `day`. Clearing an already cleared day
    /// returns 0.
    pub fn clear_completed(&self, user_id: &str, day: NaiveDate) -> Result<usize> {
        require_user(user_id)?;
        let cleared = self.db().clear_completed(user_id, day)?;
        info!(user_id, %day, cleared, "cleared completed checklist items");
        Ok(cleared)
    }

    pub fn clear_completed_today(&self, user_id: &str) -> Result<usize> {
        self.clear_completed(user_id, self.today())
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Clock> RolloverTarget for ChecklistStore<C> {
    fn rollover(&self, user_id: &str, day: NaiveDate) -> impl Future<Output = Result<usize>> + Send {
        std::future::ready(self.clear_completed(user_id, day))
    }
}

fn require_user(user_id: &str) -> Result<(), CoreError> {
    if user_id.trim().is_empty() {
        return Err(ValidationError::Empty("user_id".into()).into());
    }
    Ok(())
}
