use serde::{Deserialize, Serialize};

/// Place where the conversation happens. Managed outside this crate; read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub history: Option<String>,
    pub active: bool,
}
