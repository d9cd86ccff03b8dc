//! Character diary and backstory (diary_entries, backstory)

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult};

use super::super::sqlite::parse_ts_column;
use super::super::Database;
use crate::models::{Backstory, DiaryEntry};
use crate::time::format_ts;

impl Database {
    pub fn insert_diary_entry(&self, title: &str, content: &str, auto: bool) -> SqliteResult<i64> {
        self.insert_diary_entry_at(title, content, auto, Utc::now())
    }

    pub fn insert_diary_entry_at(
        &self,
        title: &str,
        content: &str,
        auto: bool,
        at: DateTime<Utc>,
    ) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO diary_entries (title, content, auto, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![title, content, auto as i64, format_ts(at)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent diary entry, optionally only those written automatically
    pub fn latest_diary_entry(&self, auto_only: bool) -> SqliteResult<Option<DiaryEntry>> {
        let conn = self.conn();
        let sql = if auto_only {
            "SELECT id, title, content, auto, created_at FROM diary_entries WHERE auto = 1
             ORDER BY id DESC LIMIT 1"
        } else {
            "SELECT id, title, content, auto, created_at FROM diary_entries ORDER BY id DESC LIMIT 1"
        };

        conn.query_row(sql, [], |row| {
            let created_at_str: String = row.get(4)?;
            Ok(DiaryEntry {
                id: row.get(0)?,
                title: row.get(1)?,
                content: row.get(2)?,
                auto: row.get::<_, i64>(3)? != 0,
                created_at: parse_ts_column(&created_at_str, 4)?,
            })
        })
        .optional()
    }

    pub fn delete_all_diary_entries(&self) -> SqliteResult<usize> {
        let conn = self.conn();
        conn.execute("DELETE FROM diary_entries", [])
    }

    pub fn upsert_backstory(&self, content: &str) -> SqliteResult<()> {
        self.upsert_backstory_at(content, Utc::now())
    }

    pub fn upsert_backstory_at(&self, content: &str, at: DateTime<Utc>) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO backstory (id, content, updated_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET content = excluded.content, updated_at = excluded.updated_at",
            rusqlite::params![content, format_ts(at)],
        )?;
        self.cache.invalidate_backstory();
        Ok(())
    }

    pub fn get_backstory(&self) -> SqliteResult<Option<Backstory>> {
        if let Some(cached) = self.cache.get_backstory() {
            return Ok(cached);
        }

        let conn = self.conn();
        let backstory = conn
            .query_row("SELECT content, updated_at FROM backstory WHERE id = 1", [], |row| {
                let updated_at_str: String = row.get(1)?;
                Ok(Backstory {
                    content: row.get(0)?,
                    updated_at: parse_ts_column(&updated_at_str, 1)?,
                })
            })
            .optional()?;

        self.cache.set_backstory(backstory.clone());
        Ok(backstory)
    }

    pub fn delete_backstory(&self) -> SqliteResult<usize> {
        let conn = self.conn();
        let rows = conn.execute("DELETE FROM backstory", [])?;
        self.cache.invalidate_backstory();
        Ok(rows)
    }
}
