//! Post-hoc annotation of episodic turns: summary, topics, emotion, importance.

use std::sync::Arc;

use serde_json::Value;

use super::{prompts, truncate_chars};
use crate::ai::json_repair::recover_json;
use crate::ai::{CompletionRequest, TextGenerator};
use crate::db::Database;
use crate::models::Enrichment;

/// User text stored for turns the agent produced on its own
pub const CONTINUE_MARKER: &str = "[continue]";

const ENRICHMENT_MAX_TOKENS: u32 = 200;
const TOPIC_WINDOW: usize = 30;
const FREQUENT_TOPICS: usize = 8;
const DEFAULT_IMPORTANCE: i32 = 5;

pub struct EnrichmentJob {
    db: Arc<Database>,
    generator: Arc<dyn TextGenerator>,
    model: String,
}

impl EnrichmentJob {
    pub fn new(db: Arc<Database>, generator: Arc<dyn TextGenerator>, model: &str) -> Self {
        Self {
            db,
            generator,
            model: model.to_string(),
        }
    }

    /// Annotate turn `turn_id` and refresh the frequent-topic list.
    /// Returns `None` when generation or parsing failed, or the row is gone.
    pub async fn enrich(&self, turn_id: i64, user_text: &str, agent_text: &str) -> Option<Enrichment> {
        let exchange = if user_text.trim().is_empty() || user_text == CONTINUE_MARKER {
            format!("Character: {}", agent_text)
        } else {
            format!("User: {}\nCharacter: {}", user_text, agent_text)
        };

        let request = CompletionRequest::prompt(&self.model, prompts::enrichment(&exchange), ENRICHMENT_MAX_TOKENS);
        let raw = match self.generator.complete(request).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("[ENRICH] Generation failed for turn {}: {}", turn_id, e);
                return None;
            }
        };

        let enrichment = parse_enrichment(&raw)?;

        match self.db.apply_enrichment(turn_id, &enrichment) {
            Ok(true) => {}
            Ok(false) => {
                log::warn!("[ENRICH] Turn {} no longer exists", turn_id);
                return None;
            }
            Err(e) => {
                log::warn!("[ENRICH] Failed to write turn {}: {}", turn_id, e);
                return None;
            }
        }
        log::info!(
            "[ENRICH] Turn {} importance={} emotion={}",
            turn_id,
            enrichment.importance,
            enrichment.emotion
        );

        if let Err(e) = self.refresh_frequent_topics() {
            log::warn!("[ENRICH] Could not refresh frequent topics: {}", e);
        }

        Some(enrichment)
    }

    fn refresh_frequent_topics(&self) -> rusqlite::Result<()> {
        let lists = self.db.recent_topic_lists(TOPIC_WINDOW)?;
        let top = most_common(lists.into_iter().flatten(), FREQUENT_TOPICS);
        if top.is_empty() {
            return Ok(());
        }
        self.db.set_frequent_topics(&top)
    }
}

pub fn parse_enrichment(raw: &str) -> Option<Enrichment> {
    let value = recover_json(raw, false)?;
    let obj = value.as_object()?;
    let get = |names: &[&str]| names.iter().find_map(|n| obj.get(*n));

    let summary = match get(&["summary", "resumen"]) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let topics = match get(&["topics", "temas"]) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|t| match t {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|t| !t.is_empty())
            .collect(),
        _ => Vec::new(),
    };
    let emotion = match get(&["emotion", "emocion"]) {
        Some(Value::String(s)) => s.trim().to_string(),
        _ => String::new(),
    };
    let importance = get(&["importance", "importancia"])
        .and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .map(|v| v as i32)
        .unwrap_or(DEFAULT_IMPORTANCE)
        .clamp(1, 10);

    Some(Enrichment {
        summary: truncate_chars(&summary, 500),
        topics,
        emotion: truncate_chars(&emotion, 50),
        importance,
    })
}

/// Top `n` items by frequency; ties keep first-seen order.
fn most_common(items: impl Iterator<Item = String>, n: usize) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for item in items {
        match counts.iter_mut().find(|(seen, _)| *seen == item) {
            Some((_, count)) => *count += 1,
            None => counts.push((item, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().take(n).map(|(item, _)| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockAiClient;
    use crate::models::NewEpisode;

    fn episode(db: &Database, user: &str) -> i64 {
        db.insert_episode(&NewEpisode {
            user_text: user.to_string(),
            agent_text: "I hear you".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_importance_is_clamped_and_defaulted() {
        let high = parse_enrichment(r#"{"summary":"big news","topics":["job"],"emotion":"joy","importance":14}"#).unwrap();
        assert_eq!(high.importance, 10);

        let missing = parse_enrichment(r#"{"summary":"hello","topics":"not a list"}"#).unwrap();
        assert_eq!(missing.importance, 5);
        assert!(missing.topics.is_empty());

        let low = parse_enrichment(r#"{"resumen":"hola","temas":[],"emocion":"neutro","importancia":"0"}"#).unwrap();
        assert_eq!(low.importance, 1);
        assert_eq!(low.summary, "hola");
    }

    #[test]
    fn test_summary_and_emotion_are_truncated() {
        let long = "x".repeat(900);
        let raw = format!(r#"{{"summary":"{}","emotion":"{}","importance":5}}"#, long, long);
        let parsed = parse_enrichment(&raw).unwrap();
        assert_eq!(parsed.summary.chars().count(), 500);
        assert_eq!(parsed.emotion.chars().count(), 50);
    }

    #[tokio::test]
    async fn test_enrich_updates_row_and_frequent_topics() {
        let db = Arc::new(Database::new(":memory:").unwrap());
        let first = episode(&db, "I started at the bakery");
        let second = episode(&db, "The bakery is exhausting");

        let mock = Arc::new(MockAiClient::new(vec![
            Ok(r#"{"summary":"New job","topics":["work","bakery"],"emotion":"joy","importance":6}"#.to_string()),
            Ok(r#"{"summary":"Tired","topics":["bakery","sleep"],"emotion":"sadness","importance":5}"#.to_string()),
        ]));
        let job = EnrichmentJob::new(db.clone(), mock.clone(), "test-model");

        assert!(job.enrich(first, "I started at the bakery", "Congrats!").await.is_some());
        assert!(job.enrich(second, "The bakery is exhausting", "Rest tonight").await.is_some());

        let turn = db.get_episode(second).unwrap().unwrap();
        assert!(turn.is_enriched());
        assert_eq!(turn.importance, Some(5));

        let topics = db.get_relationship().unwrap().frequent_topics;
        assert_eq!(topics[0], "bakery");
        assert_eq!(topics.len(), 3);
    }

    #[tokio::test]
    async fn test_continuation_analyses_agent_text_only() {
        let db = Arc::new(Database::new(":memory:").unwrap());
        let id = episode(&db, CONTINUE_MARKER);
        let mock = Arc::new(MockAiClient::new(vec![Ok(r#"{"summary":"s","importance":3}"#.to_string())]));
        let job = EnrichmentJob::new(db, mock.clone(), "test-model");

        job.enrich(id, CONTINUE_MARKER, "*keeps walking*").await;
        assert_eq!(mock.calls_matching("Character: *keeps walking*"), 1);
        assert_eq!(mock.calls_matching("User:"), 0);
    }

    #[tokio::test]
    async fn test_missing_row_is_not_inserted() {
        let db = Arc::new(Database::new(":memory:").unwrap());
        let mock = Arc::new(MockAiClient::new(vec![Ok(r#"{"summary":"s","importance":3}"#.to_string())]));
        let job = EnrichmentJob::new(db.clone(), mock, "test-model");

        assert!(job.enrich(42, "hi", "hello").await.is_none());
        assert_eq!(db.count_episodes().unwrap(), 0);
    }
}
