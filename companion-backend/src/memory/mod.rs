//! Everything the character remembers and how it gets there.

pub mod categories;
pub mod diary;
pub mod emotional;
pub mod enrichment;
pub mod extraction;
pub mod facts;
pub mod prompts;
pub mod relationship;
pub mod synthesis;
pub mod vector_store;

pub use diary::DiaryWriter;
pub use emotional::{EmotionTracker, SessionGap};
pub use enrichment::{EnrichmentJob, CONTINUE_MARKER};
pub use extraction::ExtractionPipeline;
pub use facts::FactRepository;
pub use relationship::{compute_phase, PhaseInputs, RelationshipSnapshot};
pub use synthesis::{SynthesisEngine, SynthesisReason, SynthesisReport};
pub use vector_store::{EmbeddingKind, EmbeddingRecord, SearchHit, VectorMemoryStore, VectorStoreError};

/// First `max` characters of `text`, never splitting a code point.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_code_points() {
        assert_eq!(truncate_chars("añoranza", 3), "año");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("", 0), "");
    }
}
