//! Raw conversation log (messages)

use chrono::{DateTime, Utc};
use rusqlite::Result as SqliteResult;

use super::super::sqlite::parse_ts_column;
use super::super::Database;
use crate::models::{ChatRole, StoredMessage};
use crate::time::format_ts;

impl Database {
    /// Append a message to the log
    pub fn insert_message(&self, role: ChatRole, content: &str) -> SqliteResult<i64> {
        self.insert_message_at(role, content, Utc::now())
    }

    /// Append a message with an explicit timestamp. Also stamps the relationship
    /// row: the first message ever seen, and the latest user message.
    pub fn insert_message_at(&self, role: ChatRole, content: &str, at: DateTime<Utc>) -> SqliteResult<i64> {
        let conn = self.conn();
        let ts = format_ts(at);

        conn.execute(
            "INSERT INTO messages (role, content, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![role.as_str(), content, &ts],
        )?;
        let id = conn.last_insert_rowid();

        conn.execute(
            "UPDATE relationship SET first_message_at = COALESCE(first_message_at, ?1) WHERE id = 1",
            [&ts],
        )?;
        if role == ChatRole::User {
            conn.execute("UPDATE relationship SET last_message_at = ?1 WHERE id = 1", [&ts])?;
        }

        Ok(id)
    }

    /// Last `limit` messages in chronological order
    pub fn recent_messages(&self, limit: usize) -> SqliteResult<Vec<StoredMessage>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, role, content, created_at FROM messages ORDER BY id DESC LIMIT ?1",
        )?;

        let mut messages: Vec<StoredMessage> = stmt
            .query_map([limit as i64], |row| Self::row_to_message(row))?
            .filter_map(|r| r.ok())
            .collect();
        messages.reverse();

        Ok(messages)
    }

    pub fn last_message(&self) -> SqliteResult<Option<StoredMessage>> {
        Ok(self.recent_messages(1)?.pop())
    }

    /// Timestamps of the latest user messages, newest first
    pub fn recent_user_message_times(&self, limit: usize) -> SqliteResult<Vec<DateTime<Utc>>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT created_at FROM messages WHERE role = 'user' ORDER BY id DESC LIMIT ?1",
        )?;

        let times = stmt
            .query_map([limit as i64], |row| {
                let raw: String = row.get(0)?;
                parse_ts_column(&raw, 0)
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(times)
    }

    /// Content of the latest agent replies, newest first
    pub fn recent_assistant_replies(&self, limit: usize) -> SqliteResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT content FROM messages WHERE role = 'assistant' ORDER BY id DESC LIMIT ?1",
        )?;

        let replies = stmt
            .query_map([limit as i64], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(replies)
    }

    pub fn count_messages(&self) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
    }

    pub fn count_user_messages(&self) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.query_row("SELECT COUNT(*) FROM messages WHERE role = 'user'", [], |row| row.get(0))
    }

    pub fn delete_all_messages(&self) -> SqliteResult<usize> {
        let conn = self.conn();
        conn.execute("DELETE FROM messages", [])
    }

    fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<StoredMessage> {
        let role_str: String = row.get(1)?;
        let created_at_str: String = row.get(3)?;

        Ok(StoredMessage {
            id: row.get(0)?,
            role: ChatRole::from_str(&role_str).unwrap_or(ChatRole::User),
            content: row.get(2)?,
            created_at: parse_ts_column(&created_at_str, 3)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_recent_messages_are_chronological() {
        let db = Database::new(":memory:").unwrap();
        db.insert_message(ChatRole::User, "hola").unwrap();
        db.insert_message(ChatRole::Assistant, "*smiles* hi").unwrap();
        db.insert_message(ChatRole::User, "how are you?").unwrap();

        let recent = db.recent_messages(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "*smiles* hi");
        assert_eq!(recent[1].role, ChatRole::User);
        assert_eq!(db.count_messages().unwrap(), 3);
        assert_eq!(db.count_user_messages().unwrap(), 2);
        assert_eq!(db.recent_assistant_replies(5).unwrap(), vec!["*smiles* hi".to_string()]);
    }

    #[test]
    fn test_message_times_stamp_relationship() {
        let db = Database::new(":memory:").unwrap();
        let first = Utc::now() - Duration::days(3);
        let later = Utc::now();
        db.insert_message_at(ChatRole::User, "first", first).unwrap();
        db.insert_message_at(ChatRole::User, "second", later).unwrap();

        let rel = db.get_relationship().unwrap();
        assert_eq!(rel.first_message_at.map(format_ts), Some(format_ts(first)));
        assert_eq!(rel.last_message_at.map(format_ts), Some(format_ts(later)));

        let times = db.recent_user_message_times(2).unwrap();
        assert_eq!(format_ts(times[0]), format_ts(later));
        assert_eq!(format_ts(times[1]), format_ts(first));
    }
}
