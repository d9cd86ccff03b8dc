use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Private journal entry written by (or for) the character
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub id: i64,
    pub title: String,
    pub content: String,
    /// Written by the background diary job rather than imported
    pub auto: bool,
    pub created_at: DateTime<Utc>,
}

/// Accumulated "what I have learned about you" journal, one row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backstory {
    pub content: String,
    pub updated_at: DateTime<Utc>,
}
