//! Fact extraction, casual mentions and follow-up thread closing.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::{categories, prompts, truncate_chars};
use crate::ai::json_repair::recover_json;
use crate::ai::{CompletionRequest, TextGenerator};
use crate::db::Database;
use crate::models::{CandidateFact, MemoryMode};

/// Candidates below this confidence are dropped
pub const MIN_CONFIDENCE: i32 = 70;

const EXTRACTION_MAX_TOKENS: u32 = 800;
const MENTIONS_MAX_TOKENS: u32 = 150;
const MAX_MENTIONS: usize = 3;
const THREAD_SCAN: usize = 10;
const NEGATION_WINDOW: usize = 20;

const FILLER_WORDS: &[&str] = &["hola", "chau", "sisi", "dale", "okey", "ok", "jaja", "jeje"];

const NEGATIONS: &[&str] = &[
    "no", "ni", "nunca", "tampoco", "jamás", "sin", "not", "never", "didn't", "don't", "haven't",
];

pub struct ExtractionPipeline {
    db: Arc<Database>,
    generator: Arc<dyn TextGenerator>,
    model: String,
    mode: MemoryMode,
}

impl ExtractionPipeline {
    pub fn new(db: Arc<Database>, generator: Arc<dyn TextGenerator>, model: &str, mode: MemoryMode) -> Self {
        Self {
            db,
            generator,
            model: model.to_string(),
            mode,
        }
    }

    /// Ask the model what is worth remembering from one exchange.
    /// Never fails: unusable output gives an empty list.
    pub async fn extract(&self, user_text: &str, agent_text: &str) -> Vec<CandidateFact> {
        self.extract_with_exclusions(user_text, agent_text, &[]).await
    }

    pub async fn extract_with_exclusions(
        &self,
        user_text: &str,
        agent_text: &str,
        excluded: &[&str],
    ) -> Vec<CandidateFact> {
        if user_text.trim().is_empty() && agent_text.trim().is_empty() {
            return Vec::new();
        }

        let prompt = prompts::extraction(self.mode, user_text, agent_text);
        let request = CompletionRequest::prompt(&self.model, prompt, EXTRACTION_MAX_TOKENS);
        let raw = match self.generator.complete(request).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("[EXTRACT] Generation failed: {}", e);
                return Vec::new();
            }
        };

        let candidates: Vec<CandidateFact> = parse_candidates(&raw)
            .into_iter()
            .filter(|c| !excluded.contains(&c.category.as_str()))
            .collect();

        log::debug!("[EXTRACT] {} candidate(s) from {} mode", candidates.len(), self.mode.as_str());
        candidates
    }

    /// Record topics the user brought up in passing as open threads.
    /// Returns how many threads were stored.
    pub async fn extract_casual_mentions(&self, user_text: &str) -> usize {
        if is_too_thin_for_mentions(user_text) {
            return 0;
        }

        let request = CompletionRequest::prompt(&self.model, prompts::casual_mentions(user_text), MENTIONS_MAX_TOKENS);
        let raw = match self.generator.complete(request).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("[EXTRACT] Casual mention generation failed: {}", e);
                return 0;
            }
        };

        let items = match recover_json(&raw, true) {
            Some(Value::Array(items)) => items,
            _ => return 0,
        };

        let mut stored = 0;
        for item in items.iter().take(MAX_MENTIONS) {
            let Some(obj) = item.as_object() else { continue };
            let topic = truncate_chars(field_string(obj, &["topic", "tema"]).trim(), 100);
            let mention = truncate_chars(field_string(obj, &["mention", "mencion"]).trim(), 200);
            if topic.is_empty() || mention.is_empty() {
                continue;
            }

            match self.db.insert_thread(&topic, &format!("You mentioned: '{}'", mention)) {
                Ok(_) => stored += 1,
                Err(e) => log::warn!("[EXTRACT] Failed to store thread '{}': {}", topic, e),
            }
        }

        if stored > 0 {
            log::info!("[EXTRACT] Stored {} casual mention(s)", stored);
        }
        stored
    }

    /// Resolve open threads the user has now answered. A topic keyword only
    /// counts when it is not preceded by a negation ("no fui al gym").
    pub fn close_threads(&self, user_text: &str) -> usize {
        if user_text.split_whitespace().count() < 2 {
            return 0;
        }

        let threads = match self.db.open_threads(THREAD_SCAN) {
            Ok(threads) => threads,
            Err(e) => {
                log::warn!("[EXTRACT] Could not read open threads: {}", e);
                return 0;
            }
        };

        let text = user_text.to_lowercase();
        let mut closed = 0;

        for thread in threads {
            let matched = topic_keywords(&thread.topic)
                .iter()
                .any(|keyword| mentions_affirmatively(&text, keyword));
            if !matched {
                continue;
            }

            match self.db.resolve_thread(thread.id) {
                Ok(true) => {
                    log::info!("[EXTRACT] Closed thread '{}'", thread.topic);
                    closed += 1;
                }
                Ok(false) => {}
                Err(e) => log::warn!("[EXTRACT] Failed to close thread {}: {}", thread.id, e),
            }
        }

        closed
    }
}

/// Turn raw model output into validated candidates.
pub fn parse_candidates(raw: &str) -> Vec<CandidateFact> {
    let items = match recover_json(raw, true) {
        Some(Value::Array(items)) => items,
        _ => {
            log::debug!("[EXTRACT] Output was not a JSON array");
            return Vec::new();
        }
    };

    items
        .iter()
        .filter_map(|item| item.as_object())
        .filter_map(candidate_from_object)
        .collect()
}

fn candidate_from_object(obj: &Map<String, Value>) -> Option<CandidateFact> {
    let category = field_string(obj, &["category", "categoria"]);
    let key = field_string(obj, &["key", "clave"]);
    let value = field_string(obj, &["value", "valor"]);
    if category.trim().is_empty() || key.trim().is_empty() || value.trim().is_empty() {
        return None;
    }

    let confidence = field(obj, &["confidence", "confianza"])
        .and_then(confidence_value)
        .unwrap_or(100);
    if confidence < MIN_CONFIDENCE {
        log::debug!("[EXTRACT] Dropping {}:{} at confidence {}", category, key, confidence);
        return None;
    }

    let context = Some(field_string(obj, &["context", "contexto"]))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    Some(CandidateFact {
        category: categories::canonicalize(&category),
        key: key.trim().to_string(),
        value: value.trim().to_string(),
        context,
        confidence: confidence.min(100),
    })
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| obj.get(*name))
}

/// Any JSON value as text; objects and arrays are serialized, null is empty.
fn field_string(obj: &Map<String, Value>, names: &[&str]) -> String {
    match field(obj, names) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(v @ (Value::Array(_) | Value::Object(_))) => serde_json::to_string(v).unwrap_or_default(),
        Some(other) => other.to_string(),
    }
}

fn confidence_value(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().map(|v| v as i32).or_else(|| n.as_f64().map(|v| v as i32)),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok().map(|v| v as i32),
        _ => None,
    }
}

fn is_too_thin_for_mentions(text: &str) -> bool {
    let word_count = text.split_whitespace().count();
    if word_count < 3 {
        return true;
    }
    let lower = text.to_lowercase();
    let has_filler = words(&lower).any(|w| FILLER_WORDS.contains(&w));
    has_filler && word_count < 5
}

/// First four words of a topic that are long enough to be meaningful
fn topic_keywords(topic: &str) -> Vec<String> {
    topic
        .to_lowercase()
        .split_whitespace()
        .take(4)
        .filter(|w| w.chars().count() >= 3)
        .map(|w| w.to_string())
        .collect()
}

fn mentions_affirmatively(text: &str, keyword: &str) -> bool {
    let Some(idx) = text.find(keyword) else { return false };
    let before = &text[..idx];
    let window: String = {
        let chars: Vec<char> = before.chars().collect();
        let start = chars.len().saturating_sub(NEGATION_WINDOW);
        chars[start..].iter().collect()
    };
    !contains_negation(&window)
}

fn contains_negation(window: &str) -> bool {
    let tokens: Vec<&str> = words(window).collect();
    tokens.iter().any(|t| NEGATIONS.contains(t))
        || tokens.windows(2).any(|pair| pair[0] == "nada" && pair[1] == "de")
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockAiClient;

    fn pipeline(mock: MockAiClient, mode: MemoryMode) -> (ExtractionPipeline, Arc<Database>, Arc<MockAiClient>) {
        let db = Arc::new(Database::new(":memory:").unwrap());
        let mock = Arc::new(mock);
        let pipeline = ExtractionPipeline::new(db.clone(), mock.clone(), "test-model", mode);
        (pipeline, db, mock)
    }

    #[tokio::test]
    async fn test_confidence_threshold_and_canonical_categories() {
        let output = r#"```json
[
  {"category": "Momentos", "key": "first_hug", "value": "hugged at the station", "confidence": 70},
  {"category": "interests", "key": "music", "value": "jazz", "confidence": 65},
  {"category": "identity", "key": "age", "value": 29},
  {"category": "family", "key": "", "value": "x", "confidence": 90}
]
```"#;
        let (pipeline, _db, _mock) = pipeline(MockAiClient::new(vec![Ok(output.to_string())]), MemoryMode::Roleplay);

        let facts = pipeline.extract("I'm 29 and I love jazz", "*hugs you*").await;
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].category, "moments");
        assert_eq!(facts[0].confidence, 70);
        assert_eq!(facts[1].value, "29");
        assert_eq!(facts[1].confidence, 100);
    }

    #[tokio::test]
    async fn test_generation_failure_yields_empty_list() {
        let (pipeline, _db, _mock) = pipeline(MockAiClient::failing(), MemoryMode::Companion);
        assert!(pipeline.extract("My name is Leo", "Nice to meet you").await.is_empty());
    }

    #[tokio::test]
    async fn test_exclusions_drop_categories() {
        let output = r#"[{"category":"apariencia","key":"hair","value":"red","confidence":90},
                         {"category":"interests","key":"sport","value":"tennis","confidence":90}]"#;
        let (pipeline, _db, mock) = pipeline(MockAiClient::new(vec![Ok(output.to_string())]), MemoryMode::Companion);

        let facts = pipeline
            .extract_with_exclusions("", "You told me you play tennis", categories::CONTINUATION_EXCLUDED)
            .await;
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].category, "interests");
        assert_eq!(mock.calls_matching("You are the memory system of a virtual companion"), 1);
    }

    #[tokio::test]
    async fn test_casual_mentions_are_capped() {
        let output = r#"[{"topic":"gym","mention":"fui al gym"},
                         {"topic":"series","mention":"vi una serie"},
                         {"topic":"pizza","mention":"comí pizza"},
                         {"topic":"sleep","mention":"dormí mal"}]"#;
        let mock = MockAiClient::new(Vec::new()).respond_to("mentioned in passing", output);
        let (pipeline, db, _mock) = pipeline(mock, MemoryMode::Companion);

        let stored = pipeline
            .extract_casual_mentions("ayer fui al gym, vi una serie, comí pizza y dormí mal")
            .await;
        assert_eq!(stored, 3);

        let threads = db.open_threads(10).unwrap();
        assert_eq!(threads.len(), 3);
        assert!(threads.iter().any(|t| t.question == "You mentioned: 'fui al gym'"));
    }

    #[tokio::test]
    async fn test_short_or_filler_messages_skip_mentions() {
        let (pipeline, _db, mock) = pipeline(MockAiClient::new(Vec::new()), MemoryMode::Companion);
        assert_eq!(pipeline.extract_casual_mentions("hola che").await, 0);
        assert_eq!(pipeline.extract_casual_mentions("jaja dale todo bien").await, 0);
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_truncated_output_drops_the_unfinished_fact() {
        let raw = r#"[{"category":"identity","key":"name","value":"Leo","confidence":95},{"category":"work_study","key":"job","value":"head nur"#;
        let candidates = parse_candidates(raw);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].value, "Leo");
    }

    #[test]
    fn test_negated_mention_does_not_close_thread() {
        let (pipeline, db, _mock) = pipeline(MockAiClient::new(Vec::new()), MemoryMode::Companion);
        db.insert_thread("gym", "You mentioned: 'fui al gym'").unwrap();

        assert_eq!(pipeline.close_threads("no fui al gym"), 0);
        assert_eq!(db.count_open_threads().unwrap(), 1);

        assert_eq!(pipeline.close_threads("fui al gym ayer"), 1);
        assert_eq!(db.count_open_threads().unwrap(), 0);
    }

    #[test]
    fn test_negation_is_matched_as_whole_word() {
        assert!(contains_negation("i did not go to the "));
        assert!(contains_negation("nada de "));
        // "nothing" contains "no" but is not a negation token here
        assert!(!contains_negation("nothing beats the "));
        assert!(mentions_affirmatively("ayer fui al gimnasio", "gimnasio"));
    }

    #[test]
    fn test_topic_keywords_skip_short_words() {
        assert_eq!(topic_keywords("Ir al gym el lunes"), vec!["gym".to_string()]);
    }
}
