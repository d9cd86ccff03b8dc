//! Episodic memory (episodic_turns)

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult};

use super::super::sqlite::parse_ts_column;
use super::super::Database;
use crate::models::{Enrichment, EpisodicTurn, NewEpisode};
use crate::time::format_ts;

const EPISODE_COLUMNS: &str = "id, user_text, agent_text, created_at, embedding_id, scenario_id,
     summary, topics, emotion, importance";

impl Database {
    pub fn insert_episode(&self, episode: &NewEpisode) -> SqliteResult<i64> {
        self.insert_episode_at(episode, Utc::now())
    }

    pub fn insert_episode_at(&self, episode: &NewEpisode, at: DateTime<Utc>) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO episodic_turns (user_text, agent_text, created_at, embedding_id, scenario_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                &episode.user_text,
                &episode.agent_text,
                format_ts(at),
                episode.embedding_id,
                episode.scenario_id
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_episode(&self, id: i64) -> SqliteResult<Option<EpisodicTurn>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM episodic_turns WHERE id = ?1", EPISODE_COLUMNS),
            [id],
            |row| Self::row_to_episode(row),
        )
        .optional()
    }

    /// Write enrichment fields onto an existing turn. Returns false when the row is gone.
    pub fn apply_enrichment(&self, id: i64, enrichment: &Enrichment) -> SqliteResult<bool> {
        let conn = self.conn();
        let topics = serde_json::to_string(&enrichment.topics).unwrap_or_else(|_| "[]".to_string());
        let rows = conn.execute(
            "UPDATE episodic_turns SET summary = ?1, topics = ?2, emotion = ?3, importance = ?4
             WHERE id = ?5",
            rusqlite::params![
                &enrichment.summary,
                topics,
                &enrichment.emotion,
                enrichment.importance,
                id
            ],
        )?;
        Ok(rows > 0)
    }

    /// Non-empty summaries with at least `min_importance`, among the latest `window` enriched turns, newest first
    pub fn recent_important_summaries(&self, window: usize, min_importance: i32) -> SqliteResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT summary FROM episodic_turns
             WHERE summary IS NOT NULL AND TRIM(summary) != '' AND importance >= ?1
             ORDER BY id DESC LIMIT ?2",
        )?;

        let summaries = stmt
            .query_map(rusqlite::params![min_importance, window as i64], |row| {
                row.get::<_, String>(0)
            })?
            .filter_map(|r| r.ok())
            .map(|s| s.trim().to_string())
            .collect();

        Ok(summaries)
    }

    /// Topic lists of the latest `limit` turns that have topics, newest first
    pub fn recent_topic_lists(&self, limit: usize) -> SqliteResult<Vec<Vec<String>>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT topics FROM episodic_turns
             WHERE topics IS NOT NULL AND topics != '[]'
             ORDER BY id DESC LIMIT ?1",
        )?;

        let lists = stmt
            .query_map([limit as i64], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .filter_map(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
            .collect();

        Ok(lists)
    }

    pub fn count_episodes(&self) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.query_row("SELECT COUNT(*) FROM episodic_turns", [], |row| row.get(0))
    }

    /// Drop every weak reference into the vector store (after an index rebuild).
    pub fn clear_episode_embedding_ids(&self) -> SqliteResult<usize> {
        let conn = self.conn();
        conn.execute("UPDATE episodic_turns SET embedding_id = NULL", [])
    }

    fn row_to_episode(row: &rusqlite::Row) -> rusqlite::Result<EpisodicTurn> {
        let created_at_str: String = row.get(3)?;
        let topics_raw: Option<String> = row.get(7)?;

        Ok(EpisodicTurn {
            id: row.get(0)?,
            user_text: row.get(1)?,
            agent_text: row.get(2)?,
            created_at: parse_ts_column(&created_at_str, 3)?,
            embedding_id: row.get(4)?,
            scenario_id: row.get(5)?,
            summary: row.get(6)?,
            topics: topics_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
            emotion: row.get(8)?,
            importance: row.get(9)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(user: &str) -> NewEpisode {
        NewEpisode {
            user_text: user.to_string(),
            agent_text: "*nods*".to_string(),
            embedding_id: Some(0),
            scenario_id: None,
        }
    }

    #[test]
    fn test_new_episode_is_not_enriched() {
        let db = Database::new(":memory:").unwrap();
        let id = db.insert_episode(&episode("I adopted a cat")).unwrap();
        let stored = db.get_episode(id).unwrap().unwrap();
        assert!(!stored.is_enriched());
        assert!(stored.topics.is_none());
        assert!(stored.importance.is_none());
    }

    #[test]
    fn test_enrichment_updates_in_place() {
        let db = Database::new(":memory:").unwrap();
        let id = db.insert_episode(&episode("I adopted a cat")).unwrap();
        let enrichment = Enrichment {
            summary: "The user adopted a cat.".to_string(),
            topics: vec!["pets".to_string(), "home".to_string()],
            emotion: "joy".to_string(),
            importance: 6,
        };
        assert!(db.apply_enrichment(id, &enrichment).unwrap());
        assert!(!db.apply_enrichment(id + 100, &enrichment).unwrap());
        assert_eq!(db.count_episodes().unwrap(), 1);

        let stored = db.get_episode(id).unwrap().unwrap();
        assert_eq!(stored.topics, Some(vec!["pets".to_string(), "home".to_string()]));
        assert_eq!(stored.importance, Some(6));
        assert_eq!(db.recent_important_summaries(6, 5).unwrap(), vec!["The user adopted a cat."]);
        assert!(db.recent_important_summaries(6, 7).unwrap().is_empty());
        assert_eq!(db.recent_topic_lists(30).unwrap().len(), 1);
    }
}
