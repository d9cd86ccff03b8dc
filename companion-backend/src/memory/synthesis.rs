//! Periodic consolidation of raw facts into prose: the user profile, the
//! relationship story and one digest per well-populated category.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{categories, prompts, truncate_chars};
use crate::ai::{CompletionRequest, TextGenerator};
use crate::db::Database;
use crate::models::PermanentFact;
use crate::time::{hours_between, now_utc, LocalClock};

/// `(category, title)` of the narrative profile
pub const PROFILE: (&str, &str) = ("profile", "Who the user is");
/// `(category, title)` of the relationship story
pub const RELATIONSHIP_HISTORY: (&str, &str) = ("relationship_history", "Our story so far");

pub const PROFILE_PLACEHOLDER: &str =
    "We are only getting to know each other. So far I only know a few basic facts.";
pub const HISTORY_PLACEHOLDER: &str =
    "The relationship is just beginning. We are still exchanging first impressions.";

const NEW_SESSION_GAP_HOURS: f64 = 3.0;
const ACCUMULATED_FACTS: i64 = 15;
const FALLBACK_HOURS: f64 = 72.0;
const MIN_PROFILE_FACTS: usize = 3;
const MIN_HISTORY_MOMENTS: usize = 2;
const MIN_DIGEST_FACTS: usize = 3;
const DIGEST_MAX_CHARS: usize = 600;

/// Why a synthesis pass is (or is not) due. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisReason {
    NewSession,
    AccumulatedFacts,
    Fallback72h,
    FirstSynthesis,
    NotDue,
}

impl SynthesisReason {
    pub fn label(&self) -> &'static str {
        match self {
            SynthesisReason::NewSession => "new session",
            SynthesisReason::AccumulatedFacts => "accumulated facts",
            SynthesisReason::Fallback72h => "72h fallback",
            SynthesisReason::FirstSynthesis => "first synthesis",
            SynthesisReason::NotDue => "not due",
        }
    }

    pub fn is_due(&self) -> bool {
        *self != SynthesisReason::NotDue
    }
}

/// Outcome of one synthesis pass. Each sub-job fails on its own.
#[derive(Debug, Clone)]
pub struct SynthesisReport {
    pub reason: SynthesisReason,
    pub profile_written: bool,
    pub history_written: bool,
    pub digests_written: usize,
    pub errors: Vec<String>,
}

pub struct SynthesisEngine {
    db: Arc<Database>,
    generator: Arc<dyn TextGenerator>,
    model: String,
    clock: LocalClock,
}

impl SynthesisEngine {
    pub fn new(db: Arc<Database>, generator: Arc<dyn TextGenerator>, model: &str, clock: LocalClock) -> Self {
        Self {
            db,
            generator,
            model: model.to_string(),
            clock,
        }
    }

    pub fn should_regenerate(&self) -> rusqlite::Result<(bool, SynthesisReason)> {
        self.should_regenerate_at(now_utc())
    }

    pub fn should_regenerate_at(&self, now: DateTime<Utc>) -> rusqlite::Result<(bool, SynthesisReason)> {
        let user_times = self.db.recent_user_message_times(2)?;
        if let Some(previous) = user_times.get(1) {
            if hours_between(*previous, now) >= NEW_SESSION_GAP_HOURS {
                return Ok((true, SynthesisReason::NewSession));
            }
        }

        let last = self.db.last_synthesis_at()?;
        let new_facts = match last {
            Some(at) => self.db.count_facts_learned_since(at)?,
            None => self.db.count_facts()?,
        };
        if new_facts >= ACCUMULATED_FACTS {
            return Ok((true, SynthesisReason::AccumulatedFacts));
        }

        let reason = match last {
            Some(at) if hours_between(at, now) >= FALLBACK_HOURS => SynthesisReason::Fallback72h,
            Some(_) => SynthesisReason::NotDue,
            None => SynthesisReason::FirstSynthesis,
        };
        Ok((reason.is_due(), reason))
    }

    /// Run every sub-job. Entries are overwritten wholesale.
    pub async fn run(&self, reason: SynthesisReason) -> SynthesisReport {
        log::info!("[SYNTHESIS] Regenerating ({})", reason.label());
        let mut report = SynthesisReport {
            reason,
            profile_written: false,
            history_written: false,
            digests_written: 0,
            errors: Vec::new(),
        };

        match self.write_profile().await {
            Ok(written) => report.profile_written = written,
            Err(e) => report.errors.push(format!("profile: {}", e)),
        }
        match self.write_relationship_history().await {
            Ok(written) => report.history_written = written,
            Err(e) => report.errors.push(format!("relationship history: {}", e)),
        }
        match self.db.list_facts() {
            Ok(facts) => {
                for (category, facts) in group_for_digest(&facts) {
                    match self.write_digest(category, &facts).await {
                        Ok(()) => report.digests_written += 1,
                        Err(e) => report.errors.push(format!("{}: {}", category, e)),
                    }
                }
            }
            Err(e) => report.errors.push(format!("digests: {}", e)),
        }

        log::info!(
            "[SYNTHESIS] Done: profile={} history={} digests={} errors={}",
            report.profile_written,
            report.history_written,
            report.digests_written,
            report.errors.len()
        );
        for err in &report.errors {
            log::warn!("[SYNTHESIS] {}", err);
        }
        report
    }

    async fn write_profile(&self) -> Result<bool, String> {
        let facts = self.db.list_facts().map_err(|e| e.to_string())?;
        if facts.is_empty() {
            return Ok(false);
        }
        let sources: Vec<String> = facts.iter().map(|f| format!("{}:{}", f.category, f.key)).collect();
        let sources = serde_json::to_string(&sources).map_err(|e| e.to_string())?;

        let content = if facts.len() < MIN_PROFILE_FACTS {
            PROFILE_PLACEHOLDER.to_string()
        } else {
            let lines = facts
                .iter()
                .map(|f| format!("- [{}] {}: {}", f.category, f.key, f.value))
                .collect::<Vec<_>>()
                .join("\n");
            self.generate(prompts::profile(&lines), 300).await?
        };

        self.db
            .upsert_synthesis(PROFILE.0, PROFILE.1, &content, Some(&sources))
            .map_err(|e| e.to_string())?;
        Ok(true)
    }

    async fn write_relationship_history(&self) -> Result<bool, String> {
        let moments = self
            .db
            .facts_chronological(&[categories::MOMENTS])
            .map_err(|e| e.to_string())?;
        if moments.is_empty() {
            return Ok(false);
        }

        let content = if moments.len() < MIN_HISTORY_MOMENTS {
            HISTORY_PLACEHOLDER.to_string()
        } else {
            let lines = moments
                .iter()
                .map(|m| {
                    let mut line = format!("- {}: {}", self.clock.short_date(m.learned_at), m.value);
                    if let Some(ctx) = m.context.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
                        line.push_str(&format!(" ({})", ctx));
                    }
                    line
                })
                .collect::<Vec<_>>()
                .join("\n");
            self.generate(prompts::relationship_history(&lines), 250).await?
        };

        self.db
            .upsert_synthesis(RELATIONSHIP_HISTORY.0, RELATIONSHIP_HISTORY.1, &content, Some("[]"))
            .map_err(|e| e.to_string())?;
        Ok(true)
    }

    async fn write_digest(&self, category: &str, facts: &[&PermanentFact]) -> Result<(), String> {
        let lines: Vec<String> = facts.iter().map(|f| format!("{}: {}", f.key, f.value)).collect();
        let listed = lines.iter().map(|l| format!("- {}", l)).collect::<Vec<_>>().join("\n");

        let content = self.generate(prompts::category_digest(category, &listed), 150).await?;
        if content.is_empty() {
            return Err("empty digest".to_string());
        }
        let sources = serde_json::to_string(&lines).map_err(|e| e.to_string())?;

        self.db
            .upsert_synthesis(
                category,
                &digest_title(category),
                &truncate_chars(&content, DIGEST_MAX_CHARS),
                Some(&sources),
            )
            .map_err(|e| e.to_string())
    }

    async fn generate(&self, prompt: String, max_tokens: u32) -> Result<String, String> {
        let request = CompletionRequest::prompt(&self.model, prompt, max_tokens);
        self.generator
            .complete(request)
            .await
            .map(|text| text.trim().to_string())
            .map_err(|e| e.to_string())
    }
}

pub fn digest_title(category: &str) -> String {
    format!("Digest of {}", category)
}

/// Non-ephemeral categories with enough facts for a digest, in first-seen order
fn group_for_digest(facts: &[PermanentFact]) -> Vec<(&str, Vec<&PermanentFact>)> {
    let mut groups: Vec<(&str, Vec<&PermanentFact>)> = Vec::new();
    for fact in facts {
        if categories::is_ephemeral(&fact.category) {
            continue;
        }
        match groups.iter_mut().find(|(cat, _)| *cat == fact.category) {
            Some((_, members)) => members.push(fact),
            None => groups.push((fact.category.as_str(), vec![fact])),
        }
    }
    groups.retain(|(_, members)| members.len() >= MIN_DIGEST_FACTS);
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockAiClient;
    use crate::models::{CandidateFact, ChatRole};
    use chrono::Duration;

    fn engine(db: Arc<Database>, mock: MockAiClient) -> (SynthesisEngine, Arc<MockAiClient>) {
        let mock = Arc::new(mock);
        (SynthesisEngine::new(db, mock.clone(), "test-model", LocalClock::new(-3)), mock)
    }

    #[test]
    fn test_first_synthesis_when_nothing_written() {
        let db = Arc::new(Database::new(":memory:").unwrap());
        let (engine, _) = engine(db, MockAiClient::new(Vec::new()));
        let (due, reason) = engine.should_regenerate().unwrap();
        assert!(due);
        assert_eq!(reason.label(), "first synthesis");
    }

    #[test]
    fn test_trigger_precedence() {
        let db = Arc::new(Database::new(":memory:").unwrap());
        let now = Utc::now();
        let (engine, _) = engine(db.clone(), MockAiClient::new(Vec::new()));

        db.upsert_synthesis_at("profile", "Who the user is", "x", None, now - Duration::hours(73))
            .unwrap();
        assert_eq!(engine.should_regenerate_at(now).unwrap().1, SynthesisReason::Fallback72h);

        db.upsert_synthesis_at("profile", "Who the user is", "x", None, now - Duration::hours(1))
            .unwrap();
        assert_eq!(engine.should_regenerate_at(now).unwrap(), (false, SynthesisReason::NotDue));

        for i in 0..15 {
            db.upsert_fact_at(&CandidateFact::new("interests", &format!("k{}", i), "v", 90), now)
                .unwrap();
        }
        assert_eq!(engine.should_regenerate_at(now).unwrap().1, SynthesisReason::AccumulatedFacts);

        db.insert_message_at(ChatRole::User, "hola", now - Duration::hours(4)).unwrap();
        db.insert_message_at(ChatRole::User, "volví", now).unwrap();
        assert_eq!(engine.should_regenerate_at(now).unwrap().1, SynthesisReason::NewSession);
    }

    #[tokio::test]
    async fn test_placeholders_for_thin_material() {
        let db = Arc::new(Database::new(":memory:").unwrap());
        db.upsert_fact(&CandidateFact::new("identity", "name", "Leo", 100)).unwrap();
        db.upsert_fact(&CandidateFact::new("moments", "first_walk", "walked by the river", 90)).unwrap();
        let (engine, mock) = engine(db.clone(), MockAiClient::new(Vec::new()));

        let report = engine.run(SynthesisReason::FirstSynthesis).await;
        assert!(report.profile_written);
        assert!(report.history_written);
        assert_eq!(report.digests_written, 0);
        assert!(mock.requests().is_empty());

        let profile = db.get_synthesis(PROFILE.0, PROFILE.1).unwrap().unwrap();
        assert_eq!(profile.content, PROFILE_PLACEHOLDER);
        assert_eq!(profile.sources.as_deref(), Some(r#"["identity:name","moments:first_walk"]"#));
        let history = db.get_synthesis(RELATIONSHIP_HISTORY.0, RELATIONSHIP_HISTORY.1).unwrap().unwrap();
        assert_eq!(history.content, HISTORY_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_digest_failure_is_isolated() {
        let db = Arc::new(Database::new(":memory:").unwrap());
        for (k, v) in [("sport", "tennis"), ("music", "jazz"), ("food", "sushi")] {
            db.upsert_fact(&CandidateFact::new("interests", k, v, 90)).unwrap();
        }
        for (k, v) in [("mother", "Ana"), ("brother", "Tomás"), ("dog", "Rocco")] {
            db.upsert_fact(&CandidateFact::new("family", k, v, 90)).unwrap();
        }
        let mock = MockAiClient::new(Vec::new())
            .respond_to("Write a SHORT profile", "Leo likes tennis and has a dog named Rocco.")
            .respond_to("\"interests\"", &"a".repeat(700))
            .with_rule("\"family\"", Err("boom".into()));
        let (engine, _) = engine(db.clone(), mock);

        let report = engine.run(SynthesisReason::AccumulatedFacts).await;
        assert!(report.profile_written);
        assert!(!report.history_written);
        assert_eq!(report.digests_written, 1);
        assert_eq!(report.errors.len(), 1);

        let digest = db.get_synthesis("interests", &digest_title("interests")).unwrap().unwrap();
        assert_eq!(digest.content.chars().count(), 600);
        assert!(db.get_synthesis("family", &digest_title("family")).unwrap().is_none());
    }
}
