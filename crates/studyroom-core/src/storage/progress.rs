//! Study progress.
//!
//! Two kinds of data live here:
//! - a timestamped log of studied topics ([`ProgressRecord`]), queried by
//!   recency and aggregated per day and subject
//! - one running count per subject ([`SubjectProgress`]), updated by merging
//!   only the fields that were given

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::database::Database;
use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result, ValidationError};

/// Window used by `recent` when the caller has no preference.
pub const DEFAULT_RECENT_DAYS: u32 = 7;

/// Status given to a record when none is supplied.
pub const DEFAULT_STATUS: &str = "Completed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub id: String,
    pub user_id: String,
    pub subject: String,
    pub topic: String,
    pub status: String,
    /// Local calendar day of `recorded_at`.
    pub date: NaiveDate,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectProgress {
    /// Slug of the name: lowercase, whitespace runs turned into `-`.
    pub subject_id: String,
    pub subject_name: String,
    pub topics_completed: u32,
    pub total_topics: u32,
}

impl SubjectProgress {
    pub fn remaining(&self) -> u32 {
        self.total_topics.saturating_sub(self.topics_completed)
    }

    /// Completion in percent, 0 when there are no topics.
    pub fn percent(&self) -> f64 {
        if self.total_topics == 0 {
            return 0.0;
        }
        f64::from(self.topics_completed) * 100.0 / f64::from(self.total_topics)
    }
}

/// Fields to change on a subject. `None` keeps the stored value.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubjectUpdate {
    pub topics_completed: Option<u32>,
    pub total_topics: Option<u32>,
}

/// Number of records logged for one subject on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyProgress {
    pub date: NaiveDate,
    pub subject: String,
    pub records: usize,
}

pub fn subject_id(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Per-day, per-subject record counts, ordered by day then subject.
pub fn daily_totals(records: &[ProgressRecord]) -> Vec<DailyProgress> {
    let mut totals: BTreeMap<(NaiveDate, &str), usize> = BTreeMap::new();
    for record in records {
        *totals.entry((record.date, record.subject.as_str())).or_default() += 1;
    }
    totals
        .into_iter()
        .map(|((date, subject), records)| DailyProgress {
            date,
            subject: subject.to_string(),
            records,
        })
        .collect()
}

/// Progress operations over a [`Database`], dated by a [`Clock`].
pub struct ProgressStore<C = SystemClock> {
    db: Mutex<Database>,
    clock: C,
}

impl ProgressStore<SystemClock> {
    pub fn new(db: Database) -> Self {
        Self::with_clock(db, SystemClock)
    }
}

impl<C: Clock> ProgressStore<C> {
    pub fn with_clock(db: Database, clock: C) -> Self {
        Self {
            db: Mutex::new(db),
            clock,
        }
    }

    /// Log a studied topic, stamped with the current time.
    pub fn record(
        &self,
        user_id: &str,
        subject: &str,
        topic: &str,
        status: Option<&str>,
    ) -> Result<ProgressRecord> {
        let user_id = required("user_id", user_id)?;
        let subject = required("subject", subject)?;
        let topic = required("topic", topic)?;
        let status = status
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_STATUS);

        let now = self.clock.now();
        let record = ProgressRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            subject: subject.to_string(),
            topic: topic.to_string(),
            status: status.to_string(),
            date: now.date_naive(),
            recorded_at: now.with_timezone(&Utc),
        };
        self.db().insert_record(&record)?;
        info!(user_id, subject, topic, "progress recorded");
        Ok(record)
    }

    /// Records from the last `days` days, oldest first.
    pub fn recent(&self, user_id: &str, days: u32) -> Result<Vec<ProgressRecord>> {
        let user_id = required("user_id", user_id)?;
        let since = self.clock.now().with_timezone(&Utc) - chrono::Duration::days(i64::from(days));
        Ok(self.db().records_since(user_id, since)?)
    }

    /// Merge `update` into the subject named `subject_name`, creating it if
    /// needed. A new subject must say how many topics it has.
    pub fn set_subject(
        &self,
        user_id: &str,
        subject_name: &str,
        update: SubjectUpdate,
    ) -> Result<SubjectProgress> {
        let user_id = required("user_id", user_id)?;
        let subject_name = required("subject", subject_name)?;
        let id = subject_id(subject_name);

        let db = self.db();
        let stored = db.subject(user_id, &id)?;
        let progress = match stored {
            Some(existing) => SubjectProgress {
                subject_name: subject_name.to_string(),
                topics_completed: update.topics_completed.unwrap_or(existing.topics_completed),
                total_topics: update.total_topics.unwrap_or(existing.total_topics),
                ..existing
            },
            None => SubjectProgress {
                subject_id: id,
                subject_name: subject_name.to_string(),
                topics_completed: update.topics_completed.unwrap_or(0),
                total_topics: update
                    .total_topics
                    .ok_or_else(|| invalid("total_topics", "required for a new subject"))?,
            },
        };
        if progress.total_topics == 0 {
            return Err(invalid("total_topics", "must be at least 1"));
        }
        if progress.topics_completed > progress.total_topics {
            return Err(invalid(
                "topics_completed",
                &format!("{} is more than the {} topics", progress.topics_completed, progress.total_topics),
            ));
        }

        db.upsert_subject(user_id, &progress)?;
        info!(user_id, subject = %progress.subject_id, completed = progress.topics_completed, total = progress.total_topics, "subject progress set");
        Ok(progress)
    }

    pub fn subjects(&self, user_id: &str) -> Result<Vec<SubjectProgress>> {
        let user_id = required("user_id", user_id)?;
        Ok(self.db().subjects(user_id)?)
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, CoreError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Empty(field.to_string()).into());
    }
    Ok(value)
}

fn invalid(field: &str, message: &str) -> CoreError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::AnchoredClock;
    use chrono::{FixedOffset, TimeZone};
    use std::time::Duration;

    fn store_at(d: u32, h: u32) -> ProgressStore<AnchoredClock> {
        let anchor = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 6, d, h, 0, 0)
            .unwrap();
        ProgressStore::with_clock(Database::open_memory().unwrap(), AnchoredClock::new(anchor))
    }

    fn record(date: NaiveDate, subject: &str) -> ProgressRecord {
        ProgressRecord {
            id: String::new(),
            user_id: "u".into(),
            subject: subject.into(),
            topic: "t".into(),
            status: DEFAULT_STATUS.into(),
            date,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn subject_ids_are_slugs() {
        assert_eq!(subject_id("Organic  Chemistry"), "organic-chemistry");
        assert_eq!(subject_id(" Maths "), "maths");
    }

    #[test]
    fn percent_and_remaining() {
        let p = SubjectProgress {
            subject_id: "maths".into(),
            subject_name: "Maths".into(),
            topics_completed: 3,
            total_topics: 12,
        };
        assert_eq!(p.percent(), 25.0);
        assert_eq!(p.remaining(), 9);
        let empty = SubjectProgress { total_topics: 0, ..p };
        assert_eq!(empty.percent(), 0.0);
    }

    #[test]
    fn daily_totals_group_by_day_and_subject() {
        let d1 = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let d2 = d1.succ_opt().unwrap();
        let totals = daily_totals(&[
            record(d2, "Physics"),
            record(d1, "Physics"),
            record(d1, "Maths"),
            record(d1, "Physics"),
        ]);
        let flat: Vec<_> = totals
            .iter()
            .map(|t| (t.date, t.subject.as_str(), t.records))
            .collect();
        assert_eq!(
            flat,
            vec![(d1, "Maths", 1), (d1, "Physics", 2), (d2, "Physics", 1)]
        );
    }

    #[tokio::test]
    async fn record_defaults_status_and_dates_locally() {
        // 01:00 at +02:00 is still the previous day in UTC.
        let store = store_at(10, 1);
        let r = store.record("u1", " Physics ", "Kinematics", None).unwrap();
        assert_eq!(r.subject, "Physics");
        assert_eq!(r.status, DEFAULT_STATUS);
        assert_eq!(r.date, NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());

        let r = store.record("u1", "Physics", "Optics", Some("In progress")).unwrap();
        assert_eq!(r.status, "In progress");

        assert!(matches!(
            store.record("u1", "Physics", "  ", None),
            Err(CoreError::Validation(ValidationError::Empty(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn recent_only_returns_window() {
        let store = store_at(1, 12);
        store.record("u1", "Maths", "Limits", None).unwrap();
        tokio::time::advance(Duration::from_secs(5 * 86_400)).await;
        store.record("u1", "Maths", "Series", None).unwrap();
        tokio::time::advance(Duration::from_secs(3 * 86_400)).await;

        let topics: Vec<_> = store
            .recent("u1", DEFAULT_RECENT_DAYS)
            .unwrap()
            .into_iter()
            .map(|r| r.topic)
            .collect();
        assert_eq!(topics, ["Series"]);
        assert_eq!(store.recent("u1", 30).unwrap().len(), 2);
        assert!(store.recent("u2", 30).unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_subject_merges_given_fields() {
        let store = store_at(10, 12);
        let created = store
            .set_subject(
                "u1",
                "Organic Chemistry",
                SubjectUpdate {
                    topics_completed: Some(2),
                    total_topics: Some(10),
                },
            )
            .unwrap();
        assert_eq!(created.subject_id, "organic-chemistry");

        let updated = store
            .set_subject(
                "u1",
                "organic chemistry",
                SubjectUpdate {
                    topics_completed: Some(5),
                    total_topics: None,
                },
            )
            .unwrap();
        assert_eq!(updated.topics_completed, 5);
        assert_eq!(updated.total_topics, 10);
        assert_eq!(store.subjects("u1").unwrap(), vec![updated]);
    }

    #[tokio::test]
    async fn set_subject_rejects_bad_counts() {
        let store = store_at(10, 12);
        let new_without_total = store.set_subject("u1", "Maths", SubjectUpdate::default());
        assert!(matches!(
            new_without_total,
            Err(CoreError::Validation(ValidationError::InvalidValue { .. }))
        ));

        let zero_total = store.set_subject(
            "u1",
            "Maths",
            SubjectUpdate {
                topics_completed: None,
                total_topics: Some(0),
            },
        );
        assert!(zero_total.is_err());

        let overshoot = store.set_subject(
            "u1",
            "Maths",
            SubjectUpdate {
                topics_completed: Some(11),
                total_topics: Some(10),
            },
        );
        assert!(overshoot.is_err());
        assert!(store.subjects("u1").unwrap().is_empty());
    }
}
