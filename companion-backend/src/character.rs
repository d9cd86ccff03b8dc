//! Character card loading.
//!
//! Cards are the usual `{"spec": ..., "data": {...}}` JSON. Only the static
//! fields the preamble needs are read; everything else on the card is ignored.

use std::path::Path;

use serde::Deserialize;

use crate::models::MemoryMode;

const DEFAULT_NAME: &str = "Character";

#[derive(Debug, thiserror::Error)]
pub enum CharacterError {
    #[error("Failed to read character card: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid character card: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterDefinition {
    pub name: String,
    pub description: String,
    pub personality: String,
    pub scenario: String,
    /// Mode requested by the card itself, overriding the configured default
    pub memory_mode: Option<MemoryMode>,
}

impl Default for CharacterDefinition {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            description: String::new(),
            personality: String::new(),
            scenario: String::new(),
            memory_mode: None,
        }
    }
}

#[derive(Deserialize)]
struct CardFile {
    #[serde(default)]
    data: Option<CardData>,
}

#[derive(Deserialize, Default)]
struct CardData {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    personality: String,
    #[serde(default)]
    scenario: String,
    #[serde(default, alias = "modo_memoria")]
    memory_mode: Option<String>,
}

impl CharacterDefinition {
    pub fn from_json(raw: &str) -> Result<Self, CharacterError> {
        let card: CardFile = serde_json::from_str(raw)?;
        let data = card.data.unwrap_or_default();

        Ok(Self {
            name: data
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_NAME.to_string()),
            description: data.description,
            personality: data.personality,
            scenario: data.scenario,
            memory_mode: data.memory_mode.as_deref().and_then(MemoryMode::from_str),
        })
    }

    pub fn load(path: &Path) -> Result<Self, CharacterError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Load the card, falling back to an anonymous character when it is
    /// missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(character) => character,
            Err(e) => {
                log::warn!("[CHARACTER] {} ({}), using defaults", e, path.display());
                Self::default()
            }
        }
    }

    /// The card's own mode wins over the configured one.
    pub fn effective_mode(&self, configured: MemoryMode) -> MemoryMode {
        self.memory_mode.unwrap_or(configured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_card_data() {
        let raw = r#"{
            "spec": "chara_card_v2",
            "data": {
                "name": "Luna",
                "description": "A night-shift librarian.",
                "personality": "Quiet, dry humour.",
                "scenario": "An empty library after closing.",
                "modo_memoria": "companion",
                "tags": ["slow burn"]
            }
        }"#;
        let character = CharacterDefinition::from_json(raw).unwrap();
        assert_eq!(character.name, "Luna");
        assert_eq!(character.scenario, "An empty library after closing.");
        assert_eq!(character.memory_mode, Some(MemoryMode::Companion));
        assert_eq!(character.effective_mode(MemoryMode::Roleplay), MemoryMode::Companion);
    }

    #[test]
    fn test_missing_fields_default() {
        let character = CharacterDefinition::from_json(r#"{"data": {"name": "  "}}"#).unwrap();
        assert_eq!(character.name, "Character");
        assert!(character.description.is_empty());
        assert_eq!(character.effective_mode(MemoryMode::Roleplay), MemoryMode::Roleplay);

        let empty = CharacterDefinition::from_json("{}").unwrap();
        assert_eq!(empty, CharacterDefinition::default());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let character = CharacterDefinition::load_or_default(&dir.path().join("character.json"));
        assert_eq!(character.name, "Character");
        assert!(CharacterDefinition::from_json("not json").is_err());
    }
}
