use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dominant emotion detected in a user message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Joy,
    Sadness,
    Fear,
    Anger,
    Neutral,
    Confusion,
    Surprise,
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Joy => "joy",
            Emotion::Sadness => "sadness",
            Emotion::Fear => "fear",
            Emotion::Anger => "anger",
            Emotion::Neutral => "neutral",
            Emotion::Confusion => "confusion",
            Emotion::Surprise => "surprise",
        }
    }

    /// Accepts the English labels and the Spanish ones models answer with.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "joy" | "happiness" | "alegria" | "alegría" | "felicidad" => Some(Emotion::Joy),
            "sadness" | "tristeza" => Some(Emotion::Sadness),
            "fear" | "miedo" | "ansiedad" | "anxiety" => Some(Emotion::Fear),
            "anger" | "enojo" | "ira" => Some(Emotion::Anger),
            "neutral" => Some(Emotion::Neutral),
            "confusion" | "confusión" => Some(Emotion::Confusion),
            "surprise" | "sorpresa" => Some(Emotion::Surprise),
            _ => None,
        }
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, Emotion::Sadness | Emotion::Fear | Emotion::Anger)
    }
}

/// Append-only emotion log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionSample {
    pub id: i64,
    pub emotion: Emotion,
    /// 1..=5
    pub intensity: i32,
    pub created_at: DateTime<Utc>,
}
