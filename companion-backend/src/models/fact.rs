use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A durable, categorized assertion about the user. Unique on `(category, key)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermanentFact {
    pub id: i64,
    pub category: String,
    pub key: String,
    pub value: String,
    pub context: Option<String>,
    pub confidence: i32,
    pub learned_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A fact proposed by extraction, not yet stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFact {
    pub category: String,
    pub key: String,
    pub value: String,
    pub context: Option<String>,
    pub confidence: i32,
}

impl CandidateFact {
    pub fn new(category: &str, key: &str, value: &str, confidence: i32) -> Self {
        Self {
            category: category.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            context: None,
            confidence,
        }
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.context = Some(context.to_string());
        self
    }

    /// Text embedded into the vector store for this fact.
    pub fn embedding_text(&self) -> String {
        format!("[{}] {}: {}", self.category, self.key, self.value)
    }
}

/// Result of a conditional fact write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// No row existed for `(category, key)`
    pub is_new: bool,
    /// The stored value differs from what was there before (always true for new rows)
    pub changed: bool,
}
