//! Token budgeting for the context block.
//!
//! The block is assembled as named sections so that, when it runs over budget,
//! whole sections can be dropped in a fixed sacrificial order before anything
//! is cut mid-sentence.

use crate::memory::truncate_chars;

/// Fixed ratio used to turn a token budget into a character budget
pub const CHARS_PER_TOKEN: usize = 4;

pub const TRUNCATION_MARKER: &str = "\n[...context truncated to fit the token budget...]";

/// Rough token count for prose
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

pub fn char_budget(token_budget: usize) -> usize {
    token_budget.saturating_mul(CHARS_PER_TOKEN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    EmotionalState,
    SessionResume,
    Profile,
    ReferenceFacts,
    Timeline,
    Diary,
    RelevantContext,
}

impl SectionKind {
    pub fn header(&self) -> &'static str {
        match self {
            SectionKind::EmotionalState => "=== CURRENT EMOTIONAL STATE OF THE USER ===",
            SectionKind::SessionResume => "=== LAST SESSION THREAD ===",
            SectionKind::Profile => "=== WHO THE USER IS ===",
            SectionKind::ReferenceFacts => "=== REFERENCE FACTS ===",
            SectionKind::Timeline => "=== OUR STORY ===",
            SectionKind::Diary => "=== CHARACTER DIARY ===",
            SectionKind::RelevantContext => "=== RELEVANT CONTEXT ===",
        }
    }
}

/// Dropped first to last when over budget. Emotional state and the timeline are never dropped.
pub const SACRIFICIAL_ORDER: [SectionKind; 3] = [
    SectionKind::RelevantContext,
    SectionKind::Diary,
    SectionKind::ReferenceFacts,
];

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub kind: SectionKind,
    pub body: String,
}

impl Section {
    pub fn new(kind: SectionKind, body: impl Into<String>) -> Self {
        Self { kind, body: body.into() }
    }

    pub fn render(&self) -> String {
        format!("{}\n{}", self.kind.header(), self.body)
    }
}

pub fn render(sections: &[Section]) -> String {
    sections
        .iter()
        .map(Section::render)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render `sections` within `token_budget`, dropping sacrificial sections and
/// finally hard-truncating with a marker.
pub fn fit_to_budget(mut sections: Vec<Section>, token_budget: usize) -> String {
    let max_chars = char_budget(token_budget);
    let mut text = render(&sections);

    for kind in SACRIFICIAL_ORDER {
        if text.chars().count() <= max_chars {
            return text;
        }
        let before = sections.len();
        sections.retain(|s| s.kind != kind);
        if sections.len() != before {
            log::debug!("[CONTEXT] Over budget, dropped {}", kind.header());
            text = render(&sections);
        }
    }

    if text.chars().count() <= max_chars {
        return text;
    }
    log::debug!("[CONTEXT] Still over {} chars, truncating", max_chars);
    let mut cut = truncate_chars(&text, max_chars);
    cut.push_str(TRUNCATION_MARKER);
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections() -> Vec<Section> {
        vec![
            Section::new(SectionKind::EmotionalState, "Detected emotion: sadness (intensity 4/5)"),
            Section::new(SectionKind::ReferenceFacts, "[IDENTITY] name: Leo"),
            Section::new(SectionKind::Timeline, "Timeline:\n  • 5 Mar - first hug"),
            Section::new(SectionKind::RelevantContext, "x".repeat(400)),
        ]
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("hello"), 2);
        assert_eq!(char_budget(3000), 12000);
    }

    #[test]
    fn test_fits_untouched() {
        let text = fit_to_budget(sections(), 1000);
        assert_eq!(text, render(&sections()));
    }

    #[test]
    fn test_drops_relevant_context_first() {
        let full = render(&sections());
        let without_relevant = render(&sections()[..3]);
        let budget = without_relevant.chars().count().div_ceil(CHARS_PER_TOKEN);
        assert!(full.chars().count() > char_budget(budget));

        let text = fit_to_budget(sections(), budget);
        assert_eq!(text, without_relevant);
        assert!(text.contains("Detected emotion: sadness (intensity 4/5)"));
        assert!(text.contains("Timeline:\n  • 5 Mar - first hug"));
    }

    #[test]
    fn test_hard_truncates_after_sacrifices() {
        let text = fit_to_budget(sections(), 10);
        assert!(!text.contains(SectionKind::RelevantContext.header()));
        assert!(!text.contains(SectionKind::ReferenceFacts.header()));
        assert!(text.ends_with(TRUNCATION_MARKER));
        assert_eq!(text.chars().count(), 40 + TRUNCATION_MARKER.chars().count());
    }
}
