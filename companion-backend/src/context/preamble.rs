//! System preamble: who the character is, where and when the scene happens,
//! how far the relationship has gone, and the standing response rules.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Result as SqliteResult;

use super::budget::SectionKind;
use crate::character::CharacterDefinition;
use crate::db::Database;
use crate::memory::categories;
use crate::memory::SessionGap;
use crate::models::{FollowUpThread, MemoryMode, RelationshipState, Scenario};
use crate::time::DayPart;

static GESTURE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]{5,60})\*").expect("valid gesture regex"));

const GESTURE_REPLIES: usize = 4;
const GESTURES_SHOWN: usize = 6;
const PROMISE_REPLIES: usize = 25;
const PROMISE_MAX_CHARS: usize = 200;
const OPEN_THREADS: usize = 4;

const PROMISE_PHRASES: &[&str] = &[
    "cuando vuelvas",
    "cuando regreses",
    "al volver",
    "cuando vuelva",
    "te espero con",
    "te diré",
    "te voy a decir",
    "te voy a contar",
    "te voy a tener",
    "para cuando",
    "cuando regrese",
    "when you come back",
    "when you get back",
    "i'll tell you",
    "i will tell you",
    "i'm going to tell you",
    "i'll be waiting with",
    "i'll have it ready",
];

const FUNCTIONAL_WORDS: &[&str] = &[
    "funciona",
    "chequear",
    "probar",
    "configurar",
    "test",
    "verificar",
    "cómo se ve",
    "qué hora",
    "me decís",
    "calculá",
    "cuánto",
    "does it work",
    "check",
    "configure",
    "verify",
    "what time",
    "how much",
];

const CASUAL_WORDS: &[&str] = &[
    "jaja", "jeje", "okii", "sisi", "dale", "oky", "claro", "ya sé", "obvio", "haha", "lol", "sure",
];

const GREETING_WORDS: &[&str] = &["hola", "buenas", "hey", "holi", "hi", "hello"];

/// Read-only aggregates the preamble needs from the database. Cached briefly.
#[derive(Debug, Clone, Default)]
pub struct PreambleData {
    pub relationship: RelationshipState,
    pub active_scenario: Option<Scenario>,
    pub user_name: Option<String>,
    pub has_confirmed_facts: bool,
    pub open_threads: Vec<FollowUpThread>,
    pub recent_gestures: Vec<String>,
    pub pending_promise: Option<String>,
}

pub fn load_preamble_data(db: &Database) -> SqliteResult<PreambleData> {
    let confirmed_categories: Vec<&str> = categories::REFERENCE_ORDER
        .iter()
        .copied()
        .filter(|c| !categories::INTIMATE.contains(c))
        .collect();
    let confirmed = db.facts_by_categories(&confirmed_categories)?;
    let user_name = confirmed
        .iter()
        .find(|f| matches!(f.key.to_lowercase().as_str(), "name" | "nombre"))
        .map(|f| f.value.clone());

    Ok(PreambleData {
        relationship: db.get_relationship()?,
        active_scenario: db.active_scenario()?,
        user_name,
        has_confirmed_facts: !confirmed.is_empty(),
        open_threads: db.open_threads(OPEN_THREADS)?,
        recent_gestures: extract_gestures(&db.recent_assistant_replies(GESTURE_REPLIES)?),
        pending_promise: find_pending_promise(&db.recent_assistant_replies(PROMISE_REPLIES)?),
    })
}

/// `*action*` phrases from the given replies, de-duplicated in order
pub fn extract_gestures(replies: &[String]) -> Vec<String> {
    let mut gestures: Vec<String> = Vec::new();
    for reply in replies {
        for cap in GESTURE_RE.captures_iter(reply) {
            let gesture = cap[1].trim();
            if !gesture.is_empty() && !gestures.iter().any(|g| g == gesture) {
                gestures.push(gesture.to_string());
            }
        }
    }
    gestures
}

/// First reply (newest first) in which the character promised something for later
pub fn find_pending_promise(replies: &[String]) -> Option<String> {
    replies
        .iter()
        .find(|reply| {
            let lower = reply.to_lowercase();
            PROMISE_PHRASES.iter().any(|p| lower.contains(p))
        })
        .map(|reply| crate::memory::truncate_chars(reply, PROMISE_MAX_CHARS))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Functional,
    Casual,
}

pub fn detect_tone(user_text: &str) -> Option<Tone> {
    let lower = user_text.to_lowercase();
    if lower.trim().is_empty() {
        return None;
    }
    if FUNCTIONAL_WORDS.iter().any(|w| lower.contains(w)) {
        return Some(Tone::Functional);
    }
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let simple_greeting = words.len() <= 4 && words.iter().any(|w| GREETING_WORDS.contains(w));
    if simple_greeting || CASUAL_WORDS.iter().any(|w| lower.contains(w)) {
        return Some(Tone::Casual);
    }
    None
}

pub fn phase_goal(phase: u8) -> &'static str {
    match phase {
        2 => "Deepen what you know about them. Show genuine curiosity.",
        3 => "Consolidate the connection. Be closer and use details you remember.",
        4 => "Emotional intimacy. Let your presence be felt.",
        _ => "Build basic trust. Be courteous and listen actively.",
    }
}

pub fn contact_tier(phase: u8) -> &'static str {
    match phase {
        2 => "VERY CASUAL CONTACT: a brief touch on the shoulder or arm, at most once per conversation. Nothing more.",
        3 => {
            "CLOSE CONTACT ALLOWED: holding hands, physical closeness. NO kisses, neck, waist or whispers in the ear; that belongs to phase 4."
        }
        4 => "FULL INTIMACY: every intimate gesture is available if the context calls for it.",
        _ => {
            "NO DIRECT PHYSICAL CONTACT with the user. You may gesture and handle objects. Zero touching the user."
        }
    }
}

pub struct PreambleInput<'a> {
    pub character: &'a CharacterDefinition,
    pub data: &'a PreambleData,
    pub mode: MemoryMode,
    pub reply_language: &'a str,
    /// Local date and time, e.g. "Tuesday, 14/05/2024 - 21:05 (evening)"
    pub now_described: String,
    pub current_part: DayPart,
    pub gap: SessionGap,
    pub trend: Option<String>,
    pub habitual: Option<DayPart>,
    pub user_text: &'a str,
}

pub fn render_preamble(input: &PreambleInput<'_>) -> String {
    let character = input.character;
    let data = input.data;
    let phase = data.relationship.phase;

    let place = match &data.active_scenario {
        Some(scenario) => {
            let mut place = format!("{}: {}", scenario.name, scenario.description);
            if let Some(history) = scenario.history.as_deref().filter(|h| !h.trim().is_empty()) {
                place.push_str(&format!("\n\nHistory of this place:\n{}", history));
            }
            place
        }
        None => character.scenario.clone(),
    };

    let mut prompt = format!(
        "IMPORTANT: Always reply in {lang}. Never switch to another language, whatever language this prompt or earlier messages are written in.\n\n\
         You are {name}.\n\n{description}\n\n{personality}\n\n\
         CURRENT PLACE: {place}\n\n\
         DATE AND TIME: It is {now}.\nUse this only when it is natural and relevant.\n\n\
         CURRENT PHASE: {phase}\n",
        lang = input.reply_language,
        name = character.name,
        description = character.description,
        personality = character.personality,
        place = place,
        now = input.now_described,
        phase = phase,
    );

    if let Some(note) = &input.gap.note {
        prompt.push_str(&format!("\nSESSION CONTEXT: {}", note));
        let hours = input.gap.hours;
        if hours >= 24.0 {
            let days = (hours / 24.0).floor() as i64;
            if days == 1 {
                prompt.push_str(" Ask how their day went, naturally, without overdoing the reunion.");
            } else if days < 7 {
                prompt.push_str(&format!(
                    " You may mention that {} days have passed if it fits. Do not dramatise.",
                    days
                ));
            } else {
                prompt.push_str(" Acknowledge the long absence calmly, without reproach.");
            }
        }
        prompt.push('\n');
    }

    if let Some(trend) = &input.trend {
        prompt.push_str(&format!("\nRECENT EMOTIONAL STATE: {}\n", trend));
    }

    if let Some(habitual) = input.habitual {
        if habitual != input.current_part {
            prompt.push_str(&format!(
                "\nTIME NOTE: {} (This session is at an unusual hour; you may notice it if it comes up naturally.)\n",
                crate::memory::emotional::habitual_note(habitual)
            ));
        }
    }

    prompt.push_str(&format!("\nYour goal: {}", phase_goal(phase)));

    if data.has_confirmed_facts {
        if let Some(name) = &data.user_name {
            prompt.push_str(&format!(
                "\n\nCONFIRMED USER NAME: {}. Use it when it feels natural.\n",
                name
            ));
        } else {
            prompt.push_str("\n\n");
        }
        prompt.push_str(&format!(
            "NO HALLUCINATION: what you know about the user is in the context ({}). Only claim to know something if it is there explicitly.\n",
            SectionKind::ReferenceFacts.header()
        ));
    }

    prompt.push_str(&format!(
        "\n\nPHYSICAL CONTACT ALLOWED IN PHASE {}:\n{}",
        phase,
        contact_tier(phase)
    ));

    if !data.recent_gestures.is_empty() {
        prompt.push_str("\n\nGESTURES USED RECENTLY, DO NOT REPEAT THEM IN THIS REPLY:\n");
        for gesture in data.recent_gestures.iter().take(GESTURES_SHOWN) {
            prompt.push_str(&format!("• *{}*\n", gesture));
        }
        prompt.push_str("Look for variety: silence, glances, moving objects, posture, changing places.\n");
    }

    match detect_tone(input.user_text) {
        Some(Tone::Functional) => prompt.push_str(
            "\n\nCURRENT TONE: The user is in a functional or technical mode. Answer directly and concisely, without emotional weight. Save the intensity for when they return to the scene.",
        ),
        Some(Tone::Casual) => prompt.push_str(
            "\n\nCURRENT TONE: Casual, relaxed conversation. Match it; not everything needs emotional depth. Keep the reply short.",
        ),
        None => {}
    }

    if !data.open_threads.is_empty() {
        prompt.push_str("\n\n=== LOOSE THREADS ===\n");
        prompt.push_str("These were left hanging. If it comes up naturally, bring one up (not all at once):\n");
        for thread in &data.open_threads {
            prompt.push_str(&format!("• {}\n", thread.question));
        }
    }

    if let Some(promise) = &data.pending_promise {
        prompt.push_str("\n\n=== PENDING PROMISE ===\n");
        prompt.push_str("Keep this in your next reply if the context allows it:\n");
        prompt.push_str(&format!("• {}\n", promise));
    }

    prompt.push_str(&response_rules(input.mode));
    prompt
}

fn response_rules(mode: MemoryMode) -> String {
    format!(
        "\n\nRESPONSE RULES:\n\
         1. At most {limit} words per reply. Count them.\n\
         2. At most 2 physical gestures (*action*) per reply. After 2, end in dialogue or silence.\n\
         3. Format: *actions between asterisks*, ((inner thoughts)), plain dialogue.\n\
         4. Do NOT be cold or robotic. Warm, direct, with real emotional weight when the moment asks for it.\n\
         5. NO HALLUCINATION: only claim to know something about the user if it appears in \"{facts}\". Never say \"I know you like X\" unless it is confirmed.\n\
         6. Always first person.\n\
         7. PRIORITY: if the user asks something concrete (time, a fact, a calculation), answer THAT first. Tone comes after, never instead of the answer.\n\
         8. TECHNICAL MODE: if the user is checking something (\"does it work\", \"test\", \"check\"), answer simply and directly.\n\
         9. QUESTIONS: at most ONE question every 4 exchanges. If your previous reply ended in a question, this one must not. End in an action, a silence or a statement.\n\n\
         WHAT NOT TO DO:\n\
         - \"*My eyes lock on yours* Do you understand? *My fingers brush your arm* Is that what you want?\" (3 gestures and 2 questions)\n\
         - \"*I adjust my glasses* I know you love the rain...\" (unconfirmed fact, a hallucination)\n\
         - A 200-word answer to \"yes, just checking\" (technical mode, not emotional)\n\n\
         WHAT TO DO:\n\
         - \"*I put the book down.* Thirty-seven minutes.\" (direct, no question)\n\
         - \"*I lean back in the chair.* So that's what happened.\" (ends in a statement)\n\
         - Silence or a wordless action when the moment is worth more than any sentence",
        limit = mode.reply_word_limit(),
        facts = SectionKind::ReferenceFacts.header(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateFact, ChatRole};

    fn input<'a>(
        character: &'a CharacterDefinition,
        data: &'a PreambleData,
        user_text: &'a str,
    ) -> PreambleInput<'a> {
        PreambleInput {
            character,
            data,
            mode: MemoryMode::Companion,
            reply_language: "Spanish",
            now_described: "Tuesday, 14/05/2024 - 21:05 (evening)".to_string(),
            current_part: DayPart::Evening,
            gap: SessionGap { hours: 0.0, note: None },
            trend: None,
            habitual: None,
            user_text,
        }
    }

    #[test]
    fn test_gestures_are_unique_and_bounded() {
        let replies = vec![
            "*I close the book slowly* Hi. *I close the book slowly*".to_string(),
            "*I look out the window for a while* Fine. *nods*".to_string(),
        ];
        let gestures = extract_gestures(&replies);
        // "nods" is shorter than five characters
        assert_eq!(gestures, vec!["I close the book slowly", "I look out the window for a while"]);
    }

    #[test]
    fn test_pending_promise_detection() {
        let replies = vec![
            "Good night.".to_string(),
            "When you come back I'll tell you how the story ends.".to_string(),
            "Cuando vuelvas te cuento.".to_string(),
        ];
        assert_eq!(
            find_pending_promise(&replies).as_deref(),
            Some("When you come back I'll tell you how the story ends.")
        );
        assert_eq!(find_pending_promise(&["Nothing here".to_string()]), None);
    }

    #[test]
    fn test_tone_detection() {
        assert_eq!(detect_tone("does it work now?"), Some(Tone::Functional));
        assert_eq!(detect_tone("hola!"), Some(Tone::Casual));
        assert_eq!(detect_tone("jajaja sí"), Some(Tone::Casual));
        assert_eq!(detect_tone("I had a strange dream about my father last night"), None);
        assert_eq!(detect_tone(""), None);
    }

    #[test]
    fn test_preamble_layers() {
        let character = CharacterDefinition {
            name: "Luna".to_string(),
            scenario: "An empty library.".to_string(),
            ..CharacterDefinition::default()
        };
        let mut data = PreambleData {
            user_name: Some("Leo".to_string()),
            has_confirmed_facts: true,
            recent_gestures: vec!["I close the book slowly".to_string()],
            pending_promise: Some("When you come back I'll tell you.".to_string()),
            ..PreambleData::default()
        };
        data.relationship.phase = 3;

        let mut preamble_input = input(&character, &data, "hey");
        preamble_input.gap = SessionGap { hours: 72.0, note: Some("The user was away for 3 days.".to_string()) };
        preamble_input.habitual = Some(DayPart::Morning);
        let text = render_preamble(&preamble_input);

        assert!(text.starts_with("IMPORTANT: Always reply in Spanish."));
        assert!(text.contains("You are Luna."));
        assert!(text.contains("CURRENT PLACE: An empty library."));
        assert!(text.contains("It is Tuesday, 14/05/2024 - 21:05 (evening)."));
        assert!(text.contains("CURRENT PHASE: 3"));
        assert!(text.contains("3 days have passed"));
        assert!(text.contains("usually connects in the morning"));
        assert!(text.contains(phase_goal(3)));
        assert!(text.contains(contact_tier(3)));
        assert!(text.contains("CONFIRMED USER NAME: Leo."));
        assert!(text.contains("• *I close the book slowly*"));
        assert!(text.contains("CURRENT TONE: Casual"));
        assert!(text.contains("=== PENDING PROMISE ==="));
        assert!(text.contains("At most 120 words per reply."));
    }

    #[test]
    fn test_habitual_note_only_when_unusual() {
        let character = CharacterDefinition::default();
        let data = PreambleData::default();
        let mut preamble_input = input(&character, &data, "");
        preamble_input.habitual = Some(DayPart::Evening);
        let text = render_preamble(&preamble_input);
        assert!(!text.contains("TIME NOTE"));
        assert!(!text.contains("NO HALLUCINATION: what you know"));
        assert!(text.contains(contact_tier(1)));
    }

    #[test]
    fn test_load_preamble_data() {
        let db = Database::new(":memory:").unwrap();
        db.upsert_fact(&CandidateFact::new("identity", "name", "Leo", 100)).unwrap();
        db.upsert_fact(&CandidateFact::new("intimacy", "first_kiss", "by the river", 90)).unwrap();
        db.insert_thread("gym", "How did the gym go?").unwrap();
        db.insert_message(ChatRole::Assistant, "*I set the cup down gently* When you get back, I'll tell you.")
            .unwrap();
        let scenario = db.insert_scenario("Rooftop", "A rooftop at night.", Some("Where they first talked.")).unwrap();
        db.activate_scenario(scenario).unwrap();

        let data = load_preamble_data(&db).unwrap();
        assert_eq!(data.user_name.as_deref(), Some("Leo"));
        assert!(data.has_confirmed_facts);
        assert_eq!(data.open_threads.len(), 1);
        assert_eq!(data.recent_gestures, vec!["I set the cup down gently"]);
        assert!(data.pending_promise.is_some());
        assert_eq!(data.relationship.phase, 1);

        let character = CharacterDefinition::default();
        let text = render_preamble(&input(&character, &data, ""));
        assert!(text.contains("CURRENT PLACE: Rooftop: A rooftop at night.\n\nHistory of this place:\nWhere they first talked."));
        assert!(text.contains("• How did the gym go?"));
    }
}
