//! Builds the bounded context block and the system preamble for one
//! generation call.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Result as SqliteResult;

use super::budget::{self, Section, SectionKind};
use super::cache::ContextCache;
use super::preamble::{self, PreambleData, PreambleInput};
use crate::character::CharacterDefinition;
use crate::config::Config;
use crate::db::Database;
use crate::memory::{categories, emotional, synthesis, truncate_chars, VectorMemoryStore};
use crate::models::{Emotion, MemoryMode, PermanentFact};
use crate::time::{now_utc, LocalClock};

const SEARCH_K: usize = 8;
const RECENT_SHOWN: usize = 3;
const RELATED_SHOWN: usize = 5;
const RELEVANT_MAX_CHARS: usize = 220;
const EMOTION_WINDOW: usize = 3;
const RESUME_MIN_GAP_HOURS: f64 = 3.0;
const RESUME_WINDOW: usize = 6;
const RESUME_MIN_IMPORTANCE: i32 = 5;
const RESUME_SHOWN: usize = 4;

const GREETING_TERMS: &[&str] = &["hola", "buenas", "hey", "hi", "holi", "hello", "ola"];
const FAREWELL_TERMS: &[&str] = &[
    "chau",
    "hasta",
    "me voy",
    "nos vemos",
    "bye",
    "buenas noches",
    "me duermo",
    "good night",
    "goodnight",
    "see you",
    "goodbye",
];
const FUNCTIONAL_TERMS: &[&str] = &[
    "funciona",
    "chequear",
    "probar",
    "hora",
    "test",
    "verificar",
    "configurar",
    "does it work",
    "check",
    "what time",
];

/// Greetings, farewells and purely functional messages skip retrieval and the
/// heavier sections.
pub fn is_light_message(user_text: &str) -> bool {
    let lower = user_text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |terms: &[&str]| {
        terms.iter().any(|term| {
            if term.contains(' ') {
                lower.contains(term)
            } else {
                words.contains(term)
            }
        })
    };
    has(GREETING_TERMS) || has(FAREWELL_TERMS) || has(FUNCTIONAL_TERMS)
}

pub struct ContextAssembler {
    db: Arc<Database>,
    vectors: Arc<VectorMemoryStore>,
    cache: Arc<ContextCache>,
    clock: LocalClock,
    character_path: PathBuf,
    default_mode: MemoryMode,
    reply_language: String,
}

impl ContextAssembler {
    pub fn new(
        db: Arc<Database>,
        vectors: Arc<VectorMemoryStore>,
        cache: Arc<ContextCache>,
        config: &Config,
    ) -> Self {
        Self {
            db,
            vectors,
            cache,
            clock: LocalClock::new(config.utc_offset_hours),
            character_path: config.character_path(),
            default_mode: config.memory_mode,
            reply_language: config.reply_language.clone(),
        }
    }

    /// The active character card, cached for a short while
    pub fn character(&self) -> Arc<CharacterDefinition> {
        if let Some(character) = self.cache.get_character() {
            return character;
        }
        self.cache
            .set_character(CharacterDefinition::load_or_default(&self.character_path))
    }

    pub fn mode(&self) -> MemoryMode {
        self.character().effective_mode(self.default_mode)
    }

    pub fn invalidate(&self) {
        self.cache.invalidate_all();
    }

    pub async fn build_context(&self, user_text: &str, token_budget: usize) -> String {
        self.build_context_at(user_text, token_budget, now_utc()).await
    }

    pub async fn build_context_at(&self, user_text: &str, token_budget: usize, now: DateTime<Utc>) -> String {
        let light = is_light_message(user_text);
        let mut sections: Vec<Section> = Vec::new();

        if !light {
            push_section(&mut sections, self.emotional_state(), "emotional state");
            push_section(&mut sections, self.session_resume(now), "session resume");
        }
        push_section(&mut sections, self.profile(), "profile");
        push_section(&mut sections, self.reference_facts(), "reference facts");
        push_section(&mut sections, self.timeline(), "timeline");
        if !light {
            push_section(&mut sections, self.diary(), "diary");
            if !user_text.trim().is_empty() {
                if let Some(section) = self.relevant_context(user_text).await {
                    sections.push(section);
                }
            }
        }

        let text = budget::fit_to_budget(sections, token_budget);
        log::debug!(
            "[CONTEXT] Built {} chars (~{} tokens, light={})",
            text.chars().count(),
            budget::estimate_tokens(&text),
            light
        );
        text
    }

    pub fn build_system_preamble(&self, user_text: &str) -> String {
        self.build_system_preamble_at(user_text, now_utc())
    }

    pub fn build_system_preamble_at(&self, user_text: &str, now: DateTime<Utc>) -> String {
        let character = self.character();
        let data = self.preamble_data();

        let gap = emotional::session_gap(&self.db, now).unwrap_or_else(|e| {
            log::warn!("[CONTEXT] Session gap unavailable: {}", e);
            emotional::SessionGap { hours: 0.0, note: None }
        });
        let trend = emotional::emotional_trend(&self.db).unwrap_or_else(|e| {
            log::warn!("[CONTEXT] Emotional trend unavailable: {}", e);
            None
        });
        let habitual = emotional::habitual_day_part(&self.db, &self.clock).unwrap_or_else(|e| {
            log::warn!("[CONTEXT] Habitual hours unavailable: {}", e);
            None
        });

        preamble::render_preamble(&PreambleInput {
            character: &character,
            data: &data,
            mode: character.effective_mode(self.default_mode),
            reply_language: &self.reply_language,
            now_described: self.clock.describe(now),
            current_part: self.clock.day_part(now),
            gap,
            trend,
            habitual,
            user_text,
        })
    }

    fn preamble_data(&self) -> Arc<PreambleData> {
        if let Some(data) = self.cache.get_preamble() {
            return data;
        }
        match preamble::load_preamble_data(&self.db) {
            Ok(data) => self.cache.set_preamble(data),
            Err(e) => {
                log::warn!("[CONTEXT] Failed to load preamble data: {}", e);
                Arc::new(PreambleData::default())
            }
        }
    }

    fn emotional_state(&self) -> SqliteResult<Option<Section>> {
        let samples = self.db.recent_emotion_samples(EMOTION_WINDOW)?;
        let Some(latest) = samples.first() else {
            return Ok(None);
        };
        if latest.emotion == Emotion::Neutral {
            return Ok(None);
        }

        let mut body = format!(
            "Detected emotion: {} (intensity {}/5)",
            latest.emotion.as_str(),
            latest.intensity
        );
        if samples.get(1).is_some_and(|previous| previous.emotion == latest.emotion) {
            body.push_str("\n(Persists since the previous message, keep it in mind)");
        }
        Ok(Some(Section::new(SectionKind::EmotionalState, body)))
    }

    fn session_resume(&self, now: DateTime<Utc>) -> SqliteResult<Option<Section>> {
        let gap = emotional::session_gap(&self.db, now)?;
        if gap.hours < RESUME_MIN_GAP_HOURS {
            return Ok(None);
        }
        let summaries = self
            .db
            .recent_important_summaries(RESUME_WINDOW, RESUME_MIN_IMPORTANCE)?;
        if summaries.is_empty() {
            return Ok(None);
        }
        let lately: Vec<&str> = summaries.iter().take(RESUME_SHOWN).map(String::as_str).collect();
        Ok(Some(Section::new(
            SectionKind::SessionResume,
            format!("Lately: {}", lately.join(" / ")),
        )))
    }

    fn profile(&self) -> SqliteResult<Option<Section>> {
        let entries = self.db.list_synthesis()?;
        Ok(entries
            .into_iter()
            .find(|e| e.category == synthesis::PROFILE.0)
            .map(|e| Section::new(SectionKind::Profile, e.content)))
    }

    fn reference_facts(&self) -> SqliteResult<Option<Section>> {
        let facts: Vec<PermanentFact> = self
            .db
            .list_facts()?
            .into_iter()
            .filter(|f| f.category != categories::MOMENTS && !categories::is_ephemeral(&f.category))
            .collect();
        if facts.is_empty() {
            return Ok(None);
        }
        Ok(Some(Section::new(SectionKind::ReferenceFacts, render_reference_facts(&facts))))
    }

    fn timeline(&self) -> SqliteResult<Option<Section>> {
        let moments = self.db.facts_chronological(&[categories::MOMENTS])?;
        if moments.is_empty() {
            return Ok(None);
        }

        let mut body = String::new();
        if let Some(history) = self
            .db
            .list_synthesis()?
            .into_iter()
            .find(|e| e.category == synthesis::RELATIONSHIP_HISTORY.0)
        {
            body.push_str(&history.content);
            body.push('\n');
        }
        body.push_str("\nTimeline:");
        for moment in &moments {
            body.push_str(&format!(
                "\n  • {} - {}",
                self.clock.short_date(moment.learned_at),
                moment.value
            ));
            if let Some(ctx) = moment.context.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
                body.push_str(&format!(" [{}]", ctx));
            }
        }
        Ok(Some(Section::new(SectionKind::Timeline, body.trim_start().to_string())))
    }

    fn diary(&self) -> SqliteResult<Option<Section>> {
        if let Some(backstory) = self.db.get_backstory()? {
            if !backstory.content.trim().is_empty() {
                return Ok(Some(Section::new(SectionKind::Diary, backstory.content)));
            }
        }
        Ok(self
            .db
            .latest_diary_entry(false)?
            .filter(|entry| !entry.content.trim().is_empty())
            .map(|entry| Section::new(SectionKind::Diary, format!("{}\n{}", entry.title, entry.content))))
    }

    async fn relevant_context(&self, user_text: &str) -> Option<Section> {
        let hits = self.vectors.search(user_text, SEARCH_K).await;
        if hits.is_empty() {
            return None;
        }

        let (recent, related): (Vec<_>, Vec<_>) = hits.into_iter().partition(|h| h.anchor);
        let mut lines: Vec<String> = Vec::new();
        if !recent.is_empty() {
            lines.push("(Recent episodes, what happened just before)".to_string());
            for hit in recent.iter().take(RECENT_SHOWN) {
                lines.push(format!("• {}", truncate_chars(&hit.record.source_text, RELEVANT_MAX_CHARS)));
            }
        }
        if !related.is_empty() {
            lines.push("(Memories related to this moment)".to_string());
            for hit in related.iter().take(RELATED_SHOWN) {
                lines.push(format!("• {}", truncate_chars(&hit.record.source_text, RELEVANT_MAX_CHARS)));
            }
        }
        Some(Section::new(SectionKind::RelevantContext, lines.join("\n")))
    }
}

fn push_section(sections: &mut Vec<Section>, result: SqliteResult<Option<Section>>, what: &str) {
    match result {
        Ok(Some(section)) => sections.push(section),
        Ok(None) => {}
        Err(e) => log::warn!("[CONTEXT] Skipping {}: {}", what, e),
    }
}

/// `[CATEGORY] key: value | key: value` lines in the fixed category order,
/// unknown categories last.
fn render_reference_facts(facts: &[PermanentFact]) -> String {
    let mut groups: Vec<(&str, Vec<String>)> = Vec::new();
    for fact in facts {
        let entry = format!("{}: {}", fact.key, fact.value);
        match groups.iter_mut().find(|(cat, _)| *cat == fact.category) {
            Some((_, entries)) => entries.push(entry),
            None => groups.push((fact.category.as_str(), vec![entry])),
        }
    }

    let rank = |category: &str| {
        categories::REFERENCE_ORDER
            .iter()
            .position(|c| *c == category)
            .unwrap_or(categories::REFERENCE_ORDER.len())
    };
    // stable: unknown categories keep their first-seen order
    groups.sort_by_key(|(cat, _)| rank(cat));

    groups
        .iter()
        .map(|(cat, entries)| {
            let shown: Vec<&str> = entries
                .iter()
                .take(categories::reference_limit(cat))
                .map(String::as_str)
                .collect();
            format!("[{}] {}", cat.to_uppercase(), shown.join(" | "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
