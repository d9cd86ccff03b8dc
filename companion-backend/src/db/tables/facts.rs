//! Permanent fact storage (permanent_facts)

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult};

use super::super::sqlite::{parse_ts_column, placeholders};
use super::super::Database;
use crate::models::{CandidateFact, PermanentFact, UpsertOutcome};
use crate::time::format_ts;

const FACT_COLUMNS: &str =
    "id, category, key, value, context, confidence, learned_at, updated_at";

impl Database {
    /// Insert or update a fact keyed on `(category, key)`.
    pub fn upsert_fact(&self, fact: &CandidateFact) -> SqliteResult<UpsertOutcome> {
        self.upsert_fact_at(fact, Utc::now())
    }

    /// Upsert with an explicit timestamp. The previous value is read under the
    /// same lock as the write, so the outcome reflects exactly this write.
    /// `learned_at` is kept on conflict; `updated_at` always moves.
    pub fn upsert_fact_at(&self, fact: &CandidateFact, at: DateTime<Utc>) -> SqliteResult<UpsertOutcome> {
        let conn = self.conn();
        let now = format_ts(at);

        let previous: Option<String> = conn
            .query_row(
                "SELECT value FROM permanent_facts WHERE category = ?1 AND key = ?2",
                [&fact.category, &fact.key],
                |row| row.get(0),
            )
            .optional()?;

        conn.execute(
            "INSERT INTO permanent_facts (category, key, value, context, confidence, learned_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(category, key) DO UPDATE SET
                value = excluded.value,
                context = COALESCE(excluded.context, permanent_facts.context),
                confidence = excluded.confidence,
                updated_at = excluded.updated_at",
            rusqlite::params![
                &fact.category,
                &fact.key,
                &fact.value,
                &fact.context,
                fact.confidence,
                &now
            ],
        )?;

        Ok(match previous {
            None => UpsertOutcome { is_new: true, changed: true },
            Some(old) => UpsertOutcome { is_new: false, changed: old != fact.value },
        })
    }

    pub fn get_fact(&self, category: &str, key: &str) -> SqliteResult<Option<PermanentFact>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM permanent_facts WHERE category = ?1 AND key = ?2", FACT_COLUMNS),
            [category, key],
            |row| Self::row_to_fact(row),
        )
        .optional()
    }

    /// Facts in the given categories, ordered by category then most recently updated
    pub fn facts_by_categories(&self, categories: &[&str]) -> SqliteResult<Vec<PermanentFact>> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn();
        let sql = format!(
            "SELECT {} FROM permanent_facts WHERE category IN ({})
             ORDER BY category, updated_at DESC, id DESC",
            FACT_COLUMNS,
            placeholders(categories.len())
        );
        let mut stmt = conn.prepare(&sql)?;

        let facts = stmt
            .query_map(rusqlite::params_from_iter(categories.iter()), |row| Self::row_to_fact(row))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(facts)
    }

    /// Facts in the given categories in the order they were first learned
    pub fn facts_chronological(&self, categories: &[&str]) -> SqliteResult<Vec<PermanentFact>> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn();
        let sql = format!(
            "SELECT {} FROM permanent_facts WHERE category IN ({}) ORDER BY learned_at ASC, id ASC",
            FACT_COLUMNS,
            placeholders(categories.len())
        );
        let mut stmt = conn.prepare(&sql)?;

        let facts = stmt
            .query_map(rusqlite::params_from_iter(categories.iter()), |row| Self::row_to_fact(row))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(facts)
    }

    /// Every fact, ordered by category then most recently updated
    pub fn list_facts(&self) -> SqliteResult<Vec<PermanentFact>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM permanent_facts ORDER BY category, updated_at DESC, id DESC",
            FACT_COLUMNS
        ))?;

        let facts = stmt
            .query_map([], |row| Self::row_to_fact(row))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(facts)
    }

    pub fn count_facts(&self) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.query_row("SELECT COUNT(*) FROM permanent_facts", [], |row| row.get(0))
    }

    pub fn count_facts_in(&self, categories: &[&str]) -> SqliteResult<i64> {
        if categories.is_empty() {
            return Ok(0);
        }
        let conn = self.conn();
        let sql = format!(
            "SELECT COUNT(*) FROM permanent_facts WHERE category IN ({})",
            placeholders(categories.len())
        );
        conn.query_row(&sql, rusqlite::params_from_iter(categories.iter()), |row| row.get(0))
    }

    /// Facts first learned strictly after `since`
    pub fn count_facts_learned_since(&self, since: DateTime<Utc>) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM permanent_facts WHERE learned_at > ?1",
            [format_ts(since)],
            |row| row.get(0),
        )
    }

    /// `(category, count)` for every category that has facts
    pub fn fact_counts_by_category(&self) -> SqliteResult<Vec<(String, i64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT category, COUNT(*) FROM permanent_facts GROUP BY category ORDER BY category",
        )?;

        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(counts)
    }

    pub fn delete_fact(&self, category: &str, key: &str) -> SqliteResult<bool> {
        let conn = self.conn();
        let rows = conn.execute(
            "DELETE FROM permanent_facts WHERE category = ?1 AND key = ?2",
            [category, key],
        )?;
        Ok(rows > 0)
    }

    pub fn delete_fact_category(&self, category: &str) -> SqliteResult<usize> {
        let conn = self.conn();
        conn.execute("DELETE FROM permanent_facts WHERE category = ?1", [category])
    }

    pub fn delete_all_facts(&self) -> SqliteResult<usize> {
        let conn = self.conn();
        conn.execute("DELETE FROM permanent_facts", [])
    }

    fn row_to_fact(row: &rusqlite::Row) -> rusqlite::Result<PermanentFact> {
        let learned_at_str: String = row.get(6)?;
        let updated_at_str: String = row.get(7)?;

        Ok(PermanentFact {
            id: row.get(0)?,
            category: row.get(1)?,
            key: row.get(2)?,
            value: row.get(3)?,
            context: row.get(4)?,
            confidence: row.get(5)?,
            learned_at: parse_ts_column(&learned_at_str, 6)?,
            updated_at: parse_ts_column(&updated_at_str, 7)?,
        })
    }
}
