//! Character diary entries and the accumulated backstory journal.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::categories;
use super::prompts::{self, DiaryPromptInput};
use crate::ai::{CompletionRequest, TextGenerator};
use crate::db::Database;
use crate::models::{DiaryEntry, PermanentFact};
use crate::time::{now_utc, LocalClock};

const DIARY_MAX_TOKENS: u32 = 400;
const BACKSTORY_MAX_TOKENS: u32 = 300;
const DIARY_FACTS_PER_CATEGORY: usize = 4;
const BACKSTORY_FACTS_PER_CATEGORY: usize = 5;
const MIN_BACKSTORY_FACTS: usize = 5;
const RECENT_MOMENTS: usize = 5;
const EMOTION_WINDOW: usize = 10;

pub struct DiaryWriter {
    db: Arc<Database>,
    generator: Arc<dyn TextGenerator>,
    model: String,
    clock: LocalClock,
}

impl DiaryWriter {
    pub fn new(db: Arc<Database>, generator: Arc<dyn TextGenerator>, model: &str, clock: LocalClock) -> Self {
        Self {
            db,
            generator,
            model: model.to_string(),
            clock,
        }
    }

    /// Write today's automatic entry unless one exists already.
    pub async fn maybe_write_daily_entry(&self, character_name: &str) -> Result<Option<DiaryEntry>, String> {
        self.maybe_write_daily_entry_at(character_name, now_utc()).await
    }

    pub async fn maybe_write_daily_entry_at(
        &self,
        character_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DiaryEntry>, String> {
        if let Some(last) = self.db.latest_diary_entry(true).map_err(|e| e.to_string())? {
            if self.clock.same_local_day(last.created_at, now) {
                log::debug!("[DIARY] Already wrote today's entry");
                return Ok(None);
            }
        }

        let facts = self.db.list_facts().map_err(|e| e.to_string())?;
        if facts.is_empty() {
            return Ok(None);
        }
        let relationship = self.db.get_relationship().map_err(|e| e.to_string())?;

        let facts_text = facts_by_category(&facts, DIARY_FACTS_PER_CATEGORY);
        let moments_text = self.recent_moments("SHARED MOMENTS")?;
        let trend_text = self.emotion_summary("RECENT USER EMOTION")?;
        let date = self.clock.long_date(now);

        let prompt = prompts::diary_entry(&DiaryPromptInput {
            character_name,
            date: &date,
            phase: relationship.phase,
            confidence: relationship.confidence,
            facts: &facts_text,
            moments: &moments_text,
            trend: &trend_text,
        });
        let content = self.generate(prompt, DIARY_MAX_TOKENS).await?;
        if content.is_empty() {
            return Err("empty diary entry".to_string());
        }

        let title = format!("Diary - {}", date);
        let id = self
            .db
            .insert_diary_entry_at(&title, &content, true, now)
            .map_err(|e| e.to_string())?;
        log::info!("[DIARY] Wrote '{}'", title);

        Ok(Some(DiaryEntry {
            id,
            title,
            content,
            auto: true,
            created_at: now,
        }))
    }

    /// Regenerate the backstory journal from everything learned so far.
    pub async fn refresh_backstory(&self) -> Result<Option<String>, String> {
        let facts = self.db.list_facts().map_err(|e| e.to_string())?;
        if facts.len() < MIN_BACKSTORY_FACTS {
            return Ok(None);
        }

        let facts_text = facts_by_category(&facts, BACKSTORY_FACTS_PER_CATEGORY);
        let moments_text = self.recent_moments("MOMENTS BETWEEN US")?;
        let trend_text = self.emotion_summary("RECENT EMOTIONAL TREND")?;

        let content = self
            .generate(prompts::backstory(&facts_text, &moments_text, &trend_text), BACKSTORY_MAX_TOKENS)
            .await?;
        if content.is_empty() {
            return Err("empty backstory".to_string());
        }

        self.db.upsert_backstory(&content).map_err(|e| e.to_string())?;
        log::info!("[DIARY] Backstory refreshed from {} facts", facts.len());
        Ok(Some(content))
    }

    fn recent_moments(&self, heading: &str) -> Result<String, String> {
        let moments = self
            .db
            .facts_chronological(&[categories::MOMENTS])
            .map_err(|e| e.to_string())?;
        if moments.is_empty() {
            return Ok(String::new());
        }
        let lines: Vec<String> = moments
            .iter()
            .rev()
            .take(RECENT_MOMENTS)
            .map(|m| format!("  • {}", m.value))
            .collect();
        Ok(format!("\n\n{}:\n{}", heading, lines.join("\n")))
    }

    fn emotion_summary(&self, heading: &str) -> Result<String, String> {
        let samples = self
            .db
            .recent_emotion_samples(EMOTION_WINDOW)
            .map_err(|e| e.to_string())?;
        if samples.len() < 3 {
            return Ok(String::new());
        }

        let mut counts: Vec<(&str, usize)> = Vec::new();
        for sample in &samples {
            let label = sample.emotion.as_str();
            match counts.iter_mut().find(|(seen, _)| *seen == label) {
                Some((_, count)) => *count += 1,
                None => counts.push((label, 1)),
            }
        }
        let top = counts
            .iter()
            .fold(None::<(&str, usize)>, |best, &(label, count)| match best {
                Some((_, c)) if c >= count => best,
                _ => Some((label, count)),
            })
            .map(|(label, _)| label)
            .unwrap_or("neutral");
        let mean = samples.iter().map(|s| s.intensity as f64).sum::<f64>() / samples.len() as f64;

        Ok(format!("\n\n{}: {} (average intensity {:.1}/5)", heading, top, mean))
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

/// `[CATEGORY]` blocks with at most `per_category` bullet lines each
fn facts_by_category(facts: &[PermanentFact], per_category: usize) -> String {
    let mut groups: Vec<(&str, Vec<String>)> = Vec::new();
    for fact in facts {
        let line = format!("{}: {}", fact.key, fact.value);
        match groups.iter_mut().find(|(cat, _)| *cat == fact.category) {
            Some((_, lines)) => lines.push(line),
            None => groups.push((fact.category.as_str(), vec![line])),
        }
    }

    groups
        .iter()
        .map(|(cat, lines)| {
            let bullets = lines
                .iter()
                .take(per_category)
                .map(|l| format!("  • {}", l))
                .collect::<Vec<_>>()
                .join("\n");
            format!("\n[{}]\n{}", cat.to_uppercase(), bullets)
        })
        .collect()
}
