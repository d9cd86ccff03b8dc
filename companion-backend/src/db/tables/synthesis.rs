//! Synthesis output (synthesis_entries)

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult};

use super::super::sqlite::parse_ts_column;
use super::super::Database;
use crate::models::SynthesisEntry;
use crate::time::format_ts;

impl Database {
    /// Replace the content stored under `(category, title)`
    pub fn upsert_synthesis(
        &self,
        category: &str,
        title: &str,
        content: &str,
        sources: Option<&str>,
    ) -> SqliteResult<()> {
        self.upsert_synthesis_at(category, title, content, sources, Utc::now())
    }

    pub fn upsert_synthesis_at(
        &self,
        category: &str,
        title: &str,
        content: &str,
        sources: Option<&str>,
        at: DateTime<Utc>,
    ) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO synthesis_entries (category, title, content, sources, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(category, title) DO UPDATE SET
                content = excluded.content,
                sources = excluded.sources,
                updated_at = excluded.updated_at",
            rusqlite::params![category, title, content, sources, format_ts(at)],
        )?;
        self.cache.invalidate_synthesis();
        Ok(())
    }

    pub fn get_synthesis(&self, category: &str, title: &str) -> SqliteResult<Option<SynthesisEntry>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, category, title, content, sources, created_at, updated_at
             FROM synthesis_entries WHERE category = ?1 AND title = ?2",
            [category, title],
            |row| Self::row_to_synthesis(row),
        )
        .optional()
    }

    pub fn list_synthesis(&self) -> SqliteResult<Vec<SynthesisEntry>> {
        if let Some(cached) = self.cache.get_synthesis() {
            return Ok((*cached).clone());
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, category, title, content, sources, created_at, updated_at
             FROM synthesis_entries ORDER BY category, title",
        )?;

        let entries: Vec<SynthesisEntry> = stmt
            .query_map([], |row| Self::row_to_synthesis(row))?
            .filter_map(|r| r.ok())
            .collect();

        self.cache.set_synthesis(entries.clone());
        Ok(entries)
    }

    /// Most recent `updated_at` across all synthesis entries
    pub fn last_synthesis_at(&self) -> SqliteResult<Option<DateTime<Utc>>> {
        let conn = self.conn();
        let raw: Option<String> =
            conn.query_row("SELECT MAX(updated_at) FROM synthesis_entries", [], |row| row.get(0))?;
        match raw {
            Some(raw) => parse_ts_column(&raw, 0).map(Some),
            None => Ok(None),
        }
    }

    pub fn delete_all_synthesis(&self) -> SqliteResult<usize> {
        let conn = self.conn();
        let rows = conn.execute("DELETE FROM synthesis_entries", [])?;
        self.cache.invalidate_synthesis();
        Ok(rows)
    }

    fn row_to_synthesis(row: &rusqlite::Row) -> rusqlite::Result<SynthesisEntry> {
        let created_at_str: String = row.get(5)?;
        let updated_at_str: String = row.get(6)?;

        Ok(SynthesisEntry {
            id: row.get(0)?,
            category: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            sources: row.get(4)?,
            created_at: parse_ts_column(&created_at_str, 5)?,
            updated_at: parse_ts_column(&updated_at_str, 6)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_upsert_overwrites_and_tracks_last_update() {
        let db = Database::new(":memory:").unwrap();
        assert!(db.last_synthesis_at().unwrap().is_none());

        let earlier = Utc::now() - Duration::hours(80);
        db.upsert_synthesis_at("profile", "Who the user is", "v1", None, earlier).unwrap();
        db.upsert_synthesis("profile", "Who the user is", "v2", Some("12 facts")).unwrap();

        let entry = db.get_synthesis("profile", "Who the user is").unwrap().unwrap();
        assert_eq!(entry.content, "v2");
        assert_eq!(entry.sources.as_deref(), Some("12 facts"));
        assert_eq!(format_ts(entry.created_at), format_ts(earlier));
        assert_eq!(db.list_synthesis().unwrap().len(), 1);
        assert!(db.last_synthesis_at().unwrap().unwrap() > earlier);
    }
}
