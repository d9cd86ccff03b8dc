//! In-memory cache layer for hot-path database queries.
//!
//! Uses moka::sync::Cache so the context assembler does not hit SQLite on
//! every turn for rows that only change in the background pass.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use crate::models::{Backstory, Scenario, SynthesisEntry};

/// Synthesis is rewritten at most once per background pass
const SYNTHESIS_TTL: Duration = Duration::from_secs(300); // 5 min
/// Scenario and backstory change rarely, but can be switched by the caller
const SINGLETON_TTL: Duration = Duration::from_secs(120); // 2 min

/// In-memory cache for frequently-read, rarely-written memory rows.
pub struct DbCache {
    /// Singleton cache: key "all" → every synthesis entry
    synthesis: Cache<&'static str, Arc<Vec<SynthesisEntry>>>,

    /// Singleton cache: key "active" → Option<Scenario>
    active_scenario: Cache<&'static str, Option<Scenario>>,

    /// Singleton cache: key "backstory" → Option<Backstory>
    backstory: Cache<&'static str, Option<Backstory>>,
}

impl DbCache {
    pub fn new() -> Self {
        Self {
            synthesis: Cache::builder()
                .time_to_live(SYNTHESIS_TTL)
                .max_capacity(1)
                .build(),
            active_scenario: Cache::builder()
                .time_to_live(SINGLETON_TTL)
                .max_capacity(1)
                .build(),
            backstory: Cache::builder()
                .time_to_live(SINGLETON_TTL)
                .max_capacity(1)
                .build(),
        }
    }

    // ── Synthesis ───────────────────────────────────────────

    pub fn get_synthesis(&self) -> Option<Arc<Vec<SynthesisEntry>>> {
        self.synthesis.get(&"all")
    }

    pub fn set_synthesis(&self, entries: Vec<SynthesisEntry>) {
        self.synthesis.insert("all", Arc::new(entries));
    }

    pub fn invalidate_synthesis(&self) {
        self.synthesis.invalidate(&"all");
    }

    // ── Scenario ────────────────────────────────────────────

    pub fn get_active_scenario(&self) -> Option<Option<Scenario>> {
        self.active_scenario.get(&"active")
    }

    pub fn set_active_scenario(&self, scenario: Option<Scenario>) {
        self.active_scenario.insert("active", scenario);
    }

    pub fn invalidate_active_scenario(&self) {
        self.active_scenario.invalidate(&"active");
    }

    // ── Backstory ───────────────────────────────────────────

    pub fn get_backstory(&self) -> Option<Option<Backstory>> {
        self.backstory.get(&"backstory")
    }

    pub fn set_backstory(&self, backstory: Option<Backstory>) {
        self.backstory.insert("backstory", backstory);
    }

    pub fn invalidate_backstory(&self) {
        self.backstory.invalidate(&"backstory");
    }

    pub fn invalidate_all(&self) {
        self.synthesis.invalidate_all();
        self.active_scenario.invalidate_all();
        self.backstory.invalidate_all();
    }
}

impl Default for DbCache {
    fn default() -> Self {
        Self::new()
    }
}
