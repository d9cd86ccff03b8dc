use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Something the user mentioned in passing that the character may pick up later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpThread {
    pub id: i64,
    pub topic: String,
    pub question: String,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
