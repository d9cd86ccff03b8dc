//! Scenarios (scenarios)

use rusqlite::{OptionalExtension, Result as SqliteResult};

use super::super::Database;
use crate::models::Scenario;

impl Database {
    pub fn insert_scenario(&self, name: &str, description: &str, history: Option<&str>) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO scenarios (name, description, history, active) VALUES (?1, ?2, ?3, 0)",
            rusqlite::params![name, description, history],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_scenario(&self, id: i64) -> SqliteResult<Option<Scenario>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, description, history, active FROM scenarios WHERE id = ?1",
            [id],
            |row| Self::row_to_scenario(row),
        )
        .optional()
    }

    pub fn active_scenario(&self) -> SqliteResult<Option<Scenario>> {
        if let Some(cached) = self.cache.get_active_scenario() {
            return Ok(cached);
        }

        let conn = self.conn();
        let scenario = conn
            .query_row(
                "SELECT id, name, description, history, active FROM scenarios WHERE active = 1
                 ORDER BY id DESC LIMIT 1",
                [],
                |row| Self::row_to_scenario(row),
            )
            .optional()?;

        self.cache.set_active_scenario(scenario.clone());
        Ok(scenario)
    }

    /// Make `id` the only active scenario. Returns false when it does not exist.
    pub fn activate_scenario(&self, id: i64) -> SqliteResult<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let exists: i64 = tx.query_row("SELECT COUNT(*) FROM scenarios WHERE id = ?1", [id], |row| row.get(0))?;
        if exists == 0 {
            return Ok(false);
        }
        tx.execute("UPDATE scenarios SET active = 0 WHERE active = 1", [])?;
        tx.execute("UPDATE scenarios SET active = 1 WHERE id = ?1", [id])?;
        tx.commit()?;
        self.cache.invalidate_active_scenario();
        Ok(true)
    }

    fn row_to_scenario(row: &rusqlite::Row) -> rusqlite::Result<Scenario> {
        Ok(Scenario {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            history: row.get(3)?,
            active: row.get::<_, i64>(4)? != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_one_scenario_is_active() {
        let db = Database::new(":memory:").unwrap();
        assert!(db.active_scenario().unwrap().is_none());

        let cafe = db.insert_scenario("Cafe", "A quiet corner table", None).unwrap();
        let beach = db.insert_scenario("Beach", "Sunset by the water", Some("We met here")).unwrap();

        assert!(db.activate_scenario(cafe).unwrap());
        assert!(db.activate_scenario(beach).unwrap());
        assert!(!db.activate_scenario(999).unwrap());

        let active = db.active_scenario().unwrap().unwrap();
        assert_eq!(active.name, "Beach");
        assert!(!db.get_scenario(cafe).unwrap().unwrap().active);
    }
}
