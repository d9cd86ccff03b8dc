use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Singleton relationship progression row. Overwritten in place on every turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipState {
    pub phase: u8,
    pub confidence: u8,
    pub intimacy: u8,
    pub days_together: i64,
    pub first_message_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub frequent_topics: Vec<String>,
}

impl Default for RelationshipState {
    fn default() -> Self {
        Self {
            phase: 1,
            confidence: 0,
            intimacy: 0,
            days_together: 1,
            first_message_at: None,
            last_message_at: None,
            frequent_topics: Vec::new(),
        }
    }
}
