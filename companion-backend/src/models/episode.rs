use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored user/agent exchange. The enrichment fields stay `None` until the
/// background enrichment job has run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicTurn {
    pub id: i64,
    pub user_text: String,
    pub agent_text: String,
    pub created_at: DateTime<Utc>,
    /// Weak reference into the vector store arena; may go stale after a rebuild.
    pub embedding_id: Option<i64>,
    pub scenario_id: Option<i64>,
    pub summary: Option<String>,
    pub topics: Option<Vec<String>>,
    pub emotion: Option<String>,
    pub importance: Option<i32>,
}

impl EpisodicTurn {
    pub fn is_enriched(&self) -> bool {
        self.summary.is_some()
    }
}

/// Insert payload for an episodic turn
#[derive(Debug, Clone, Default)]
pub struct NewEpisode {
    pub user_text: String,
    pub agent_text: String,
    pub embedding_id: Option<i64>,
    pub scenario_id: Option<i64>,
}

/// Annotations written back onto an episodic turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub summary: String,
    pub topics: Vec<String>,
    pub emotion: String,
    pub importance: i32,
}
