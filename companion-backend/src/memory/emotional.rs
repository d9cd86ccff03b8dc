//! Emotion detection per user message, plus the read-only signals the
//! preamble derives from history: emotional trend, session gap and the
//! user's habitual hours.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Result as SqliteResult;

use super::prompts;
use crate::ai::json_repair::recover_json;
use crate::ai::{CompletionRequest, TextGenerator};
use crate::db::Database;
use crate::models::Emotion;
use crate::time::{hours_between, DayPart, LocalClock};

const DETECT_MAX_TOKENS: u32 = 80;
const TREND_WINDOW: usize = 10;
const TREND_MIN_SAMPLES: usize = 3;
const HABIT_WINDOW: usize = 40;
const HABIT_MIN_MESSAGES: usize = 10;
const HABIT_SHARE: f64 = 0.6;

pub struct EmotionTracker {
    db: Arc<Database>,
    generator: Arc<dyn TextGenerator>,
    model: String,
}

impl EmotionTracker {
    pub fn new(db: Arc<Database>, generator: Arc<dyn TextGenerator>, model: &str) -> Self {
        Self {
            db,
            generator,
            model: model.to_string(),
        }
    }

    /// Classify the user's message and append the sample.
    pub async fn detect(&self, user_text: &str) -> Option<(Emotion, i32)> {
        if user_text.trim().chars().count() < 3 {
            return None;
        }

        let request = CompletionRequest::prompt(&self.model, prompts::emotion(user_text), DETECT_MAX_TOKENS);
        let raw = match self.generator.complete(request).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("[EMOTION] Generation failed: {}", e);
                return None;
            }
        };

        let value = recover_json(&raw, false)?;
        let obj = value.as_object()?;
        let emotion = obj
            .get("emotion")
            .or_else(|| obj.get("emocion"))
            .and_then(|v| v.as_str())
            .and_then(Emotion::parse)
            .unwrap_or(Emotion::Neutral);
        let intensity = obj
            .get("intensity")
            .or_else(|| obj.get("intensidad"))
            .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
            .map(|v| v as i32)
            .unwrap_or(3)
            .clamp(1, 5);

        if let Err(e) = self.db.insert_emotion_sample(emotion, intensity) {
            log::warn!("[EMOTION] Failed to store sample: {}", e);
            return None;
        }
        log::debug!("[EMOTION] {} ({}/5)", emotion.as_str(), intensity);
        Some((emotion, intensity))
    }
}

/// A note about the recent emotional pattern, when one is clear.
pub fn emotional_trend(db: &Database) -> SqliteResult<Option<String>> {
    let samples = db.recent_emotion_samples(TREND_WINDOW)?;
    if samples.len() < TREND_MIN_SAMPLES {
        return Ok(None);
    }

    let Some((top, count)) = most_common(samples.iter().map(|s| s.emotion)) else {
        return Ok(None);
    };
    let mean = samples.iter().map(|s| s.intensity as f64).sum::<f64>() / samples.len() as f64;

    let note = if top.is_negative() && count >= 3 && mean >= 3.0 {
        Some(format!(
            "Recent emotional trend: {} recurring (average intensity {:.1}/5). Keep it in mind without being intrusive.",
            top.as_str(),
            mean
        ))
    } else if top == Emotion::Joy && count >= 5 {
        Some("The user has been mostly joyful lately.".to_string())
    } else if top == Emotion::Sadness && count >= 4 && mean >= 4.0 {
        Some(
            "The user has shown intense sadness in several recent conversations. Be especially attentive today."
                .to_string(),
        )
    } else {
        None
    };
    Ok(note)
}

/// Time since the user's previous message, with a note once it is worth mentioning.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionGap {
    pub hours: f64,
    pub note: Option<String>,
}

pub fn session_gap(db: &Database, now: DateTime<Utc>) -> SqliteResult<SessionGap> {
    let times = db.recent_user_message_times(2)?;
    let Some(previous) = times.get(1) else {
        return Ok(SessionGap { hours: 0.0, note: None });
    };
    let hours = hours_between(*previous, now);
    Ok(SessionGap {
        hours,
        note: gap_note(hours),
    })
}

pub fn gap_note(hours: f64) -> Option<String> {
    let days = (hours / 24.0).floor() as i64;
    let whole_hours = hours.floor() as i64;

    if hours < 2.0 {
        None
    } else if hours < 6.0 {
        Some(format!("The user was away for {} hours.", whole_hours))
    } else if hours < 24.0 {
        Some(format!("The user was gone for {} hours and came back today.", whole_hours))
    } else if days == 1 {
        Some("The user came back the day after the last conversation.".to_string())
    } else if days < 7 {
        Some(format!("The user was away for {} days.", days))
    } else if days < 30 {
        Some(format!("The user was away for {} days (more than a week).", days))
    } else {
        Some(format!("The user was away for {} days. A long time without talking.", days))
    }
}

/// The day part most of the user's recent messages fall in, if there is a clear one.
pub fn habitual_day_part(db: &Database, clock: &LocalClock) -> SqliteResult<Option<DayPart>> {
    let times = db.recent_user_message_times(HABIT_WINDOW)?;
    if times.len() < HABIT_MIN_MESSAGES {
        return Ok(None);
    }

    let Some((part, count)) = most_common(times.iter().map(|t| clock.day_part(*t))) else {
        return Ok(None);
    };
    if count as f64 / times.len() as f64 >= HABIT_SHARE {
        Ok(Some(part))
    } else {
        Ok(None)
    }
}

pub fn habitual_note(part: DayPart) -> String {
    format!(
        "The user usually connects in the {} (pattern from recent conversations).",
        part.label()
    )
}

/// Most frequent item and its count; ties go to the first seen.
fn most_common<T: PartialEq + Copy>(items: impl Iterator<Item = T>) -> Option<(T, usize)> {
    let mut counts: Vec<(T, usize)> = Vec::new();
    for item in items {
        match counts.iter_mut().find(|(seen, _)| *seen == item) {
            Some((_, count)) => *count += 1,
            None => counts.push((item, 1)),
        }
    }
    let mut best: Option<(T, usize)> = None;
    for (item, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((item, count));
        }
    }
    best
}
