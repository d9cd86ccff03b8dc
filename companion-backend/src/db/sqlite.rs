//! SQLite connection and schema for one character's memory database.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, Result as SqliteResult};

use super::cache::DbCache;

pub type DbConn<'a> = MutexGuard<'a, Connection>;

/// One connection per character database. Every table module is an
/// `impl Database` block that locks it for the duration of a call.
///
/// The guard is `!Send`, so it can never be held across an `.await`.
pub struct Database {
    conn: Mutex<Connection>,
    pub cache: DbCache,
}

impl Database {
    /// Open (or create) the database at `path`. `":memory:"` gives a private
    /// in-memory database, which is what the tests use.
    pub fn new(path: &str) -> SqliteResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            let conn = Connection::open(path)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn
        };
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        Self::init_schema(&conn)?;
        log::debug!("[DB] Schema ready at {}", path);

        Ok(Self {
            conn: Mutex::new(conn),
            cache: DbCache::new(),
        })
    }

    pub fn conn(&self) -> DbConn<'_> {
        self.conn.lock()
    }

    fn init_schema(conn: &Connection) -> SqliteResult<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_role ON messages(role, id);

            CREATE TABLE IF NOT EXISTS permanent_facts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                context TEXT,
                confidence INTEGER NOT NULL DEFAULT 80,
                learned_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(category, key)
            );
            CREATE INDEX IF NOT EXISTS idx_facts_learned ON permanent_facts(learned_at);

            CREATE TABLE IF NOT EXISTS episodic_turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_text TEXT NOT NULL,
                agent_text TEXT NOT NULL,
                created_at TEXT NOT NULL,
                embedding_id INTEGER,
                scenario_id INTEGER,
                summary TEXT,
                topics TEXT,
                emotion TEXT,
                importance INTEGER
            );

            CREATE TABLE IF NOT EXISTS synthesis_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                sources TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(category, title)
            );

            CREATE TABLE IF NOT EXISTS relationship (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                phase INTEGER NOT NULL DEFAULT 1,
                confidence INTEGER NOT NULL DEFAULT 0,
                intimacy INTEGER NOT NULL DEFAULT 0,
                days_together INTEGER NOT NULL DEFAULT 1,
                first_message_at TEXT,
                last_message_at TEXT,
                frequent_topics TEXT NOT NULL DEFAULT '[]'
            );
            INSERT OR IGNORE INTO relationship (id) VALUES (1);

            CREATE TABLE IF NOT EXISTS emotion_samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                emotion TEXT NOT NULL,
                intensity INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS follow_up_threads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                question TEXT NOT NULL,
                resolved INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                resolved_at TEXT
            );

            CREATE TABLE IF NOT EXISTS diary_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                auto INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS backstory (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                content TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS scenarios (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                history TEXT,
                active INTEGER NOT NULL DEFAULT 0
            );
            ",
        )
    }
}

/// Parse a stored timestamp column, surfacing bad data as a conversion error.
pub(crate) fn parse_ts_column(raw: &str, idx: usize) -> SqliteResult<DateTime<Utc>> {
    crate::time::parse_ts(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp '{}'", raw).into(),
        )
    })
}

/// `?1, ?2, ...` for an `IN (...)` clause with `n` parameters.
pub(crate) fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_schema_is_created() {
        let db = Database::new(":memory:").unwrap();
        let conn = db.conn();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('messages', 'permanent_facts', 'episodic_turns', 'synthesis_entries',
                  'relationship', 'emotion_samples', 'follow_up_threads', 'diary_entries',
                  'backstory', 'scenarios')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 10);

        let singleton: i64 = conn
            .query_row("SELECT COUNT(*) FROM relationship", [], |row| row.get(0))
            .unwrap();
        assert_eq!(singleton, 1);
    }

    #[test]
    fn test_file_database_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");
        let path = path.to_str().unwrap();
        Database::new(path).unwrap();
        // Second open runs the idempotent schema again
        Database::new(path).unwrap();
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(3), "?1, ?2, ?3");
        assert_eq!(placeholders(1), "?1");
    }
}
