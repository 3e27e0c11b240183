//! SQLite-backed storage.
//!
//! Provides persistent storage for:
//! - Key-value application state (the timer record lives here)
//! - Daily checklist items, per user and per local day
//! - Timestamped progress records and per-subject topic counts

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::checklist::ChecklistItem;
use super::progress::{ProgressRecord, SubjectProgress};
use super::{data_dir, KvStore};
use crate::error::{CoreError, StoreError};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// SQLite database for timer state and checklist items.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `<data_dir>/studyroom.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("studyroom.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) a database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.busy_timeout(Duration::from_secs(2))?;
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS checklist_items (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                title       TEXT NOT NULL,
                completed   INTEGER NOT NULL DEFAULT 0,
                day         TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_checklist_user_day ON checklist_items(user_id, day);

            CREATE TABLE IF NOT EXISTS progress_records (
                id           TEXT PRIMARY KEY,
                user_id      TEXT NOT NULL,
                subject      TEXT NOT NULL,
                topic        TEXT NOT NULL,
                status       TEXT NOT NULL,
                day          TEXT NOT NULL,
                recorded_at  TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_progress_user_time ON progress_records(user_id, recorded_at);

            CREATE TABLE IF NOT EXISTS subject_progress (
                user_id           TEXT NOT NULL,
                subject_id        TEXT NOT NULL,
                subject_name      TEXT NOT NULL,
                topics_completed  INTEGER NOT NULL,
                total_topics      INTEGER NOT NULL,
                updated_at        TEXT NOT NULL,
                PRIMARY KEY (user_id, subject_id)
            );",
        )?;
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // ── Checklist ────────────────────────────────────────────────────

    pub fn insert_item(&self, item: &ChecklistItem) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO checklist_items (id, user_id, title, completed, day, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.id,
                item.user_id,
                item.title,
                item.completed,
                item.date.format(DAY_FORMAT).to_string(),
                item.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Items of `user_id` dated `day`, oldest first.
    pub fn items_for_day(&self, user_id: &str, day: NaiveDate) -> Result<Vec<ChecklistItem>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, title, completed, day, created_at
             FROM checklist_items
             WHERE user_id = ?1 AND day = ?2
             ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![user_id, day.format(DAY_FORMAT).to_string()], |row| {
            let day: String = row.get(4)?;
            let created_at: String = row.get(5)?;
            Ok(ChecklistItem {
                id: row.get(0)?,
                user_id: row.get(1)?,
                title: row.get(2)?,
                completed: row.get(3)?,
                date: parse_day(&day, 4)?,
                created_at: parse_timestamp(&created_at, 5)?,
            })
        })?;
        rows.collect()
    }

    /// Set `completed` on one item. Returns `false` when no such item exists.
    pub fn set_completed(&self, user_id: &str, id: &str, completed: bool) -> Result<bool, rusqlite::Error> {
        let changed = self.conn.execute(
            "UPDATE checklist_items SET completed = ?3 WHERE user_id = ?1 AND id = ?2",
            params![user_id, id, completed],
        )?;
        Ok(changed > 0)
    }

    pub fn item_completed(&self, user_id: &str, id: &str) -> Result<Option<bool>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT completed FROM checklist_items WHERE user_id = ?1 AND id = ?2",
                params![user_id, id],
                |row| row.get::<_, bool>(0),
            )
            .optional()
    }

    /// Returns `false` when no such item exists.
    pub fn delete_item(&self, user_id: &str, id: &str) -> Result<bool, rusqlite::Error> {
        let changed = self.conn.execute(
            "DELETE FROM checklist_items WHERE user_id = ?1 AND id = ?2",
            params![user_id, id],
        )?;
        Ok(changed > 0)
    }

    /// Delete every completed item of `user_id` dated `day`.
    pub fn clear_completed(&self, user_id: &str, day: NaiveDate) -> Result<usize, rusqlite::Error> {
        self.conn.execute(
            "DELETE FROM checklist_items WHERE user_id = ?1 AND day = ?2 AND completed = 1",
            params![user_id, day.format(DAY_FORMAT).to_string()],
        )
    }

    // ── Progress ─────────────────────────────────────────────────────

    pub fn insert_record(&self, record: &ProgressRecord) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO progress_records (id, user_id, subject, topic, status, day, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.user_id,
                record.subject,
                record.topic,
                record.status,
                record.date.format(DAY_FORMAT).to_string(),
                sortable_timestamp(&record.recorded_at),
            ],
        )?;
        Ok(())
    }

    /// Records of `user_id` at or after `since`, oldest first.
    pub fn records_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<Vec<ProgressRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, subject, topic, status, day, recorded_at
             FROM progress_records
             WHERE user_id = ?1 AND recorded_at >= ?2
             ORDER BY recorded_at, id",
        )?;
        let rows = stmt.query_map(params![user_id, sortable_timestamp(&since)], |row| {
            let day: String = row.get(5)?;
            let recorded_at: String = row.get(6)?;
            Ok(ProgressRecord {
                id: row.get(0)?,
                user_id: row.get(1)?,
                subject: row.get(2)?,
                topic: row.get(3)?,
                status: row.get(4)?,
                date: parse_day(&day, 5)?,
                recorded_at: parse_timestamp(&recorded_at, 6)?,
            })
        })?;
        rows.collect()
    }

    pub fn subject(&self, user_id: &str, subject_id: &str) -> Result<Option<SubjectProgress>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT subject_id, subject_name, topics_completed, total_topics
                 FROM subject_progress WHERE user_id = ?1 AND subject_id = ?2",
                params![user_id, subject_id],
                subject_from_row,
            )
            .optional()
    }

    /// Insert or replace the row of `progress.subject_id`.
    pub fn upsert_subject(&self, user_id: &str, progress: &SubjectProgress) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO subject_progress
                 (user_id, subject_id, subject_name, topics_completed, total_topics, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                progress.subject_id,
                progress.subject_name,
                progress.topics_completed,
                progress.total_topics,
                sortable_timestamp(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    /// Every subject of `user_id`, by name.
    pub fn subjects(&self, user_id: &str) -> Result<Vec<SubjectProgress>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT subject_id, subject_name, topics_completed, total_topics
             FROM subject_progress WHERE user_id = ?1
             ORDER BY subject_name COLLATE NOCASE, subject_id",
        )?;
        let rows = stmt.query_map(params![user_id], subject_from_row)?;
        rows.collect()
    }
}

fn subject_from_row(row: &rusqlite::Row<'_>) -> Result<SubjectProgress, rusqlite::Error> {
    Ok(SubjectProgress {
        subject_id: row.get(0)?,
        subject_name: row.get(1)?,
        topics_completed: row.get(2)?,
        total_topics: row.get(3)?,
    })
}

/// Fixed-width UTC timestamp, so text order matches time order.
fn sortable_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_day(text: &str, column: usize) -> Result<NaiveDate, rusqlite::Error> {
    NaiveDate::parse_from_str(text, DAY_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_timestamp(text: &str, column: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e)))
}

impl KvStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.kv_get(key)?)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        Ok(self.kv_set(key, value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(id: &str, user: &str, day: NaiveDate, completed: bool) -> ChecklistItem {
        ChecklistItem {
            id: id.into(),
            user_id: user.into(),
            title: format!("task {id}"),
            completed,
            date: day,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
        db.kv_set("test", "again").unwrap();
        assert_eq!(db.get("test").unwrap().as_deref(), Some("again"));
    }

    #[test]
    fn items_are_scoped_by_user_and_day() {
        let db = Database::open_memory().unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let yesterday = today.pred_opt().unwrap();
        db.insert_item(&item("a", "u1", today, false)).unwrap();
        db.insert_item(&item("b", "u1", yesterday, false)).unwrap();
        db.insert_item(&item("c", "u2", today, false)).unwrap();

        let items = db.items_for_day("u1", today).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "a");
        assert_eq!(items[0].date, today);
    }

    #[test]
    fn clear_completed_only_touches_completed_of_that_day() {
        let db = Database::open_memory().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let next = day.succ_opt().unwrap();
        db.insert_item(&item("done", "u1", day, true)).unwrap();
        db.insert_item(&item("open", "u1", day, false)).unwrap();
        db.insert_item(&item("later", "u1", next, true)).unwrap();
        db.insert_item(&item("other", "u2", day, true)).unwrap();

        assert_eq!(db.clear_completed("u1", day).unwrap(), 1);
        assert_eq!(db.clear_completed("u1", day).unwrap(), 0);
        assert_eq!(db.items_for_day("u1", day).unwrap().len(), 1);
        assert_eq!(db.items_for_day("u1", next).unwrap().len(), 1);
        assert_eq!(db.items_for_day("u2", day).unwrap().len(), 1);
    }

    #[test]
    fn records_since_filters_and_orders_by_time() {
        let db = Database::open_memory().unwrap();
        let base = Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap();
        let record = |id: &str, user: &str, at: DateTime<Utc>| ProgressRecord {
            id: id.into(),
            user_id: user.into(),
            subject: "Physics".into(),
            topic: format!("topic {id}"),
            status: "Completed".into(),
            date: at.date_naive(),
            recorded_at: at,
        };
        db.insert_record(&record("late", "u1", base + chrono::Duration::hours(2))).unwrap();
        db.insert_record(&record("old", "u1", base - chrono::Duration::days(3))).unwrap();
        db.insert_record(&record("early", "u1", base + chrono::Duration::milliseconds(1))).unwrap();
        db.insert_record(&record("other", "u2", base)).unwrap();

        let ids: Vec<_> = db
            .records_since("u1", base)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, ["early", "late"]);
    }

    #[test]
    fn upsert_subject_replaces_row() {
        let db = Database::open_memory().unwrap();
        let mut maths = SubjectProgress {
            subject_id: "maths".into(),
            subject_name: "Maths".into(),
            topics_completed: 1,
            total_topics: 10,
        };
        db.upsert_subject("u1", &maths).unwrap();
        maths.topics_completed = 4;
        db.upsert_subject("u1", &maths).unwrap();

        assert_eq!(db.subject("u1", "maths").unwrap(), Some(maths.clone()));
        assert_eq!(db.subjects("u1").unwrap(), vec![maths]);
        assert!(db.subject("u2", "maths").unwrap().is_none());
    }

    #[test]
    fn update_and_delete_report_missing_rows() {
        let db = Database::open_memory().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        db.insert_item(&item("a", "u1", day, false)).unwrap();
        assert!(db.set_completed("u1", "a", true).unwrap());
        assert_eq!(db.item_completed("u1", "a").unwrap(), Some(true));
        assert!(!db.set_completed("u2", "a", true).unwrap());
        assert!(db.delete_item("u1", "a").unwrap());
        assert!(!db.delete_item("u1", "a").unwrap());
        assert_eq!(db.item_completed("u1", "a").unwrap(), None);
    }
}
