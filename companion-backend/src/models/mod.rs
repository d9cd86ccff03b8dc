pub mod diary;
pub mod emotion;
pub mod episode;
pub mod fact;
pub mod message;
pub mod relationship;
pub mod scenario;
pub mod synthesis;
pub mod thread;

pub use diary::{Backstory, DiaryEntry};
pub use emotion::{Emotion, EmotionSample};
pub use episode::{Enrichment, EpisodicTurn, NewEpisode};
pub use fact::{CandidateFact, PermanentFact, UpsertOutcome};
pub use message::{ChatRole, StoredMessage};
pub use relationship::RelationshipState;
pub use scenario::Scenario;
pub use synthesis::SynthesisEntry;
pub use thread::FollowUpThread;

use serde::{Deserialize, Serialize};

/// Operating mode of the memory layer for one character.
///
/// `Companion` only learns about the user from the user's own words.
/// `Roleplay` also records shared scenes, moments and intimate history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    Companion,
    #[default]
    Roleplay,
}

impl MemoryMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().trim() {
            "companion" | "compañero" | "companero" => Some(MemoryMode::Companion),
            "roleplay" | "rol" => Some(MemoryMode::Roleplay),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryMode::Companion => "companion",
            MemoryMode::Roleplay => "roleplay",
        }
    }

    /// Reply length ceiling, in words.
    pub fn reply_word_limit(&self) -> usize {
        match self {
            MemoryMode::Companion => 120,
            MemoryMode::Roleplay => 220,
        }
    }

    /// Stored messages replayed to the model on each turn.
    pub fn history_window(&self) -> usize {
        match self {
            MemoryMode::Companion => 10,
            MemoryMode::Roleplay => 20,
        }
    }
}
