//! Short-lived cache for the character card and the preamble's database
//! aggregates. Both are read on every turn and change rarely; the engine
//! invalidates explicitly when the character or the scenario changes.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use super::preamble::PreambleData;
use crate::character::CharacterDefinition;

const CONTEXT_TTL: Duration = Duration::from_secs(45);

pub struct ContextCache {
    /// Singleton cache: key "character" → parsed card
    character: Cache<&'static str, Arc<CharacterDefinition>>,

    /// Singleton cache: key "preamble" → aggregates read from the database
    preamble: Cache<&'static str, Arc<PreambleData>>,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::with_ttl(CONTEXT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            character: Cache::builder().time_to_live(ttl).max_capacity(1).build(),
            preamble: Cache::builder().time_to_live(ttl).max_capacity(1).build(),
        }
    }

    pub fn get_character(&self) -> Option<Arc<CharacterDefinition>> {
        self.character.get(&"character")
    }

    pub fn set_character(&self, character: CharacterDefinition) -> Arc<CharacterDefinition> {
        let character = Arc::new(character);
        self.character.insert("character", character.clone());
        character
    }

    pub fn get_preamble(&self) -> Option<Arc<PreambleData>> {
        self.preamble.get(&"preamble")
    }

    pub fn set_preamble(&self, data: PreambleData) -> Arc<PreambleData> {
        let data = Arc::new(data);
        self.preamble.insert("preamble", data.clone());
        data
    }

    pub fn invalidate_preamble(&self) {
        self.preamble.invalidate(&"preamble");
    }

    pub fn invalidate_all(&self) {
        self.character.invalidate_all();
        self.preamble.invalidate_all();
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate_all_clears_both() {
        let cache = ContextCache::new();
        cache.set_character(CharacterDefinition::default());
        cache.set_preamble(PreambleData::default());
        assert!(cache.get_character().is_some());
        assert!(cache.get_preamble().is_some());

        cache.invalidate_all();
        assert!(cache.get_character().is_none());
        assert!(cache.get_preamble().is_none());
    }

    #[test]
    fn test_entries_expire() {
        let cache = ContextCache::with_ttl(Duration::from_millis(20));
        cache.set_character(CharacterDefinition::default());
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get_character().is_none());
    }
}
