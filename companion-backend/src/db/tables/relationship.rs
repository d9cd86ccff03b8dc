//! Relationship progression singleton (relationship)

use rusqlite::Result as SqliteResult;

use super::super::sqlite::parse_ts_column;
use super::super::Database;
use crate::models::RelationshipState;

impl Database {
    pub fn get_relationship(&self) -> SqliteResult<RelationshipState> {
        let conn = self.conn();
        conn.query_row(
            "SELECT phase, confidence, intimacy, days_together, first_message_at, last_message_at,
                    frequent_topics
             FROM relationship WHERE id = 1",
            [],
            |row| {
                let first_raw: Option<String> = row.get(4)?;
                let last_raw: Option<String> = row.get(5)?;
                let topics_raw: String = row.get(6)?;

                Ok(RelationshipState {
                    phase: row.get::<_, i64>(0)?.clamp(1, 4) as u8,
                    confidence: row.get::<_, i64>(1)?.clamp(0, 100) as u8,
                    intimacy: row.get::<_, i64>(2)?.clamp(0, 100) as u8,
                    days_together: row.get(3)?,
                    first_message_at: first_raw.map(|raw| parse_ts_column(&raw, 4)).transpose()?,
                    last_message_at: last_raw.map(|raw| parse_ts_column(&raw, 5)).transpose()?,
                    frequent_topics: serde_json::from_str(&topics_raw).unwrap_or_default(),
                })
            },
        )
    }

    /// Store the computed metrics. Message timestamps are owned by the message log.
    pub fn save_relationship_metrics(&self, state: &RelationshipState) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE relationship SET phase = ?1, confidence = ?2, intimacy = ?3, days_together = ?4
             WHERE id = 1",
            rusqlite::params![
                state.phase as i64,
                state.confidence as i64,
                state.intimacy as i64,
                state.days_together
            ],
        )?;
        Ok(())
    }

    pub fn set_frequent_topics(&self, topics: &[String]) -> SqliteResult<()> {
        let conn = self.conn();
        let raw = serde_json::to_string(topics).unwrap_or_else(|_| "[]".to_string());
        conn.execute("UPDATE relationship SET frequent_topics = ?1 WHERE id = 1", [raw])?;
        Ok(())
    }

    /// Back to phase 1 with no history.
    pub fn reset_relationship(&self) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE relationship SET phase = 1, confidence = 0, intimacy = 0, days_together = 1,
                first_message_at = NULL, last_message_at = NULL, frequent_topics = '[]'
             WHERE id = 1",
            [],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatRole;

    #[test]
    fn test_fresh_relationship_is_default() {
        let db = Database::new(":memory:").unwrap();
        assert_eq!(db.get_relationship().unwrap(), RelationshipState::default());
    }

    #[test]
    fn test_save_metrics_and_reset() {
        let db = Database::new(":memory:").unwrap();
        db.insert_message(ChatRole::User, "hola").unwrap();

        let mut state = db.get_relationship().unwrap();
        state.phase = 3;
        state.confidence = 70;
        state.intimacy = 40;
        state.days_together = 5;
        db.save_relationship_metrics(&state).unwrap();
        db.set_frequent_topics(&["music".to_string(), "work".to_string()]).unwrap();

        let stored = db.get_relationship().unwrap();
        assert_eq!(stored.phase, 3);
        assert_eq!(stored.intimacy, 40);
        assert!(stored.first_message_at.is_some());
        assert_eq!(stored.frequent_topics, vec!["music", "work"]);

        db.reset_relationship().unwrap();
        assert_eq!(db.get_relationship().unwrap(), RelationshipState::default());
    }
}
