//! Emotion log (emotion_samples)

use chrono::{DateTime, Utc};
use rusqlite::Result as SqliteResult;

use super::super::sqlite::parse_ts_column;
use super::super::Database;
use crate::models::{Emotion, EmotionSample};
use crate::time::format_ts;

impl Database {
    pub fn insert_emotion_sample(&self, emotion: Emotion, intensity: i32) -> SqliteResult<i64> {
        self.insert_emotion_sample_at(emotion, intensity, Utc::now())
    }

    pub fn insert_emotion_sample_at(
        &self,
        emotion: Emotion,
        intensity: i32,
        at: DateTime<Utc>,
    ) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO emotion_samples (emotion, intensity, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![emotion.as_str(), intensity.clamp(1, 5), format_ts(at)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Latest samples, newest first
    pub fn recent_emotion_samples(&self, limit: usize) -> SqliteResult<Vec<EmotionSample>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, emotion, intensity, created_at FROM emotion_samples ORDER BY id DESC LIMIT ?1",
        )?;

        let samples = stmt
            .query_map([limit as i64], |row| {
                let emotion_raw: String = row.get(1)?;
                let created_at_str: String = row.get(3)?;
                Ok(EmotionSample {
                    id: row.get(0)?,
                    emotion: Emotion::parse(&emotion_raw).unwrap_or(Emotion::Neutral),
                    intensity: row.get(2)?,
                    created_at: parse_ts_column(&created_at_str, 3)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(samples)
    }

    pub fn delete_all_emotion_samples(&self) -> SqliteResult<usize> {
        let conn = self.conn();
        conn.execute("DELETE FROM emotion_samples", [])
    }
}
