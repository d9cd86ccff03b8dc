//! Follow-up threads (follow_up_threads)

use chrono::{DateTime, Utc};
use rusqlite::Result as SqliteResult;

use super::super::sqlite::parse_ts_column;
use super::super::Database;
use crate::models::FollowUpThread;
use crate::time::format_ts;

impl Database {
    pub fn insert_thread(&self, topic: &str, question: &str) -> SqliteResult<i64> {
        self.insert_thread_at(topic, question, Utc::now())
    }

    pub fn insert_thread_at(&self, topic: &str, question: &str, at: DateTime<Utc>) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO follow_up_threads (topic, question, resolved, created_at) VALUES (?1, ?2, 0, ?3)",
            rusqlite::params![topic, question, format_ts(at)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Unresolved threads, newest first
    pub fn open_threads(&self, limit: usize) -> SqliteResult<Vec<FollowUpThread>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, topic, question, resolved, created_at, resolved_at
             FROM follow_up_threads WHERE resolved = 0 ORDER BY id DESC LIMIT ?1",
        )?;

        let threads = stmt
            .query_map([limit as i64], |row| {
                let created_at_str: String = row.get(4)?;
                let resolved_raw: Option<String> = row.get(5)?;
                Ok(FollowUpThread {
                    id: row.get(0)?,
                    topic: row.get(1)?,
                    question: row.get(2)?,
                    resolved: row.get::<_, i64>(3)? != 0,
                    created_at: parse_ts_column(&created_at_str, 4)?,
                    resolved_at: resolved_raw.map(|raw| parse_ts_column(&raw, 5)).transpose()?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(threads)
    }

    /// Mark a thread resolved. Returns false if it was already resolved or missing.
    pub fn resolve_thread(&self, id: i64) -> SqliteResult<bool> {
        let conn = self.conn();
        let rows = conn.execute(
            "UPDATE follow_up_threads SET resolved = 1, resolved_at = ?1 WHERE id = ?2 AND resolved = 0",
            rusqlite::params![format_ts(Utc::now()), id],
        )?;
        Ok(rows > 0)
    }

    pub fn count_open_threads(&self) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.query_row("SELECT COUNT(*) FROM follow_up_threads WHERE resolved = 0", [], |row| row.get(0))
    }

    pub fn delete_all_threads(&self) -> SqliteResult<usize> {
        let conn = self.conn();
        conn.execute("DELETE FROM follow_up_threads", [])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_removes_from_open_list() {
        let db = Database::new(":memory:").unwrap();
        let gym = db.insert_thread("gym", "How was the gym?").unwrap();
        db.insert_thread("exam", "How did the exam go?").unwrap();

        assert_eq!(db.open_threads(10).unwrap()[0].topic, "exam");
        assert!(db.resolve_thread(gym).unwrap());
        assert!(!db.resolve_thread(gym).unwrap());
        assert_eq!(db.count_open_threads().unwrap(), 1);
        assert_eq!(db.open_threads(10).unwrap().len(), 1);
    }
}
