use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Model-written prose consolidating raw facts. Unique on `(category, title)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisEntry {
    pub id: i64,
    pub category: String,
    pub title: String,
    pub content: String,
    pub sources: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
