//! Permanent fact repository: conditional upserts plus embedding on change.

use std::sync::Arc;

use rusqlite::Result as SqliteResult;

use super::categories;
use super::vector_store::{EmbeddingKind, VectorMemoryStore};
use crate::db::Database;
use crate::models::{CandidateFact, PermanentFact, UpsertOutcome};

pub struct FactRepository {
    db: Arc<Database>,
}

impl FactRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn upsert(&self, fact: &CandidateFact) -> SqliteResult<UpsertOutcome> {
        self.db.upsert_fact(fact)
    }

    pub fn query_by_categories(&self, categories: &[&str]) -> SqliteResult<Vec<PermanentFact>> {
        self.db.facts_by_categories(categories)
    }

    pub fn delete_fact(&self, category: &str, key: &str) -> SqliteResult<bool> {
        self.db.delete_fact(category, key)
    }

    pub fn delete_category(&self, category: &str) -> SqliteResult<usize> {
        self.db.delete_fact_category(category)
    }

    pub fn delete_all(&self) -> SqliteResult<usize> {
        self.db.delete_all_facts()
    }

    /// Store extracted candidates. Ephemeral categories are dropped; a vector is
    /// minted only when the stored value actually changed. Returns how many
    /// candidates were written.
    pub async fn remember(&self, candidates: &[CandidateFact], vectors: &VectorMemoryStore) -> usize {
        let mut stored = 0;

        for fact in candidates {
            if categories::is_ephemeral(&fact.category) {
                log::debug!("[FACTS] Skipping ephemeral {}:{}", fact.category, fact.key);
                continue;
            }

            let outcome = match self.upsert(fact) {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::warn!("[FACTS] Failed to store {}:{}: {}", fact.category, fact.key, e);
                    continue;
                }
            };
            stored += 1;

            if !outcome.changed {
                continue;
            }
            log::info!(
                "[FACTS] {} {}:{} = {}",
                if outcome.is_new { "Learned" } else { "Updated" },
                fact.category,
                fact.key,
                fact.value
            );

            if let Err(e) = vectors
                .add(&fact.embedding_text(), EmbeddingKind::PermanentFact, Some(&fact.category))
                .await
            {
                log::warn!("[FACTS] Stored {}:{} but could not embed it: {}", fact.category, fact.key, e);
            }
        }

        stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;

    fn setup() -> (FactRepository, VectorMemoryStore, Arc<HashEmbedder>, tempfile::TempDir) {
        let db = Arc::new(Database::new(":memory:").unwrap());
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(HashEmbedder::new(32));
        let vectors = VectorMemoryStore::load(dir.path(), 32, embedder.clone()).unwrap();
        (FactRepository::new(db), vectors, embedder, dir)
    }

    #[tokio::test]
    async fn test_identical_reassertion_does_not_embed_again() {
        let (repo, vectors, embedder, _dir) = setup();
        let fact = CandidateFact::new("interests", "music", "jazz", 90);

        assert_eq!(repo.remember(&[fact.clone()], &vectors).await, 1);
        assert_eq!(embedder.calls(), 1);
        assert_eq!(repo.remember(&[fact.clone()], &vectors).await, 1);
        assert_eq!(embedder.calls(), 1);
        assert_eq!(vectors.len(), 1);

        let rows = repo.query_by_categories(&["interests"]).unwrap();
        assert_eq!(rows[0].value, "jazz");
        assert_eq!(vectors.records()[0].source_text, "[interests] music: jazz");
    }

    #[tokio::test]
    async fn test_changed_value_embeds_again() {
        let (repo, vectors, embedder, _dir) = setup();
        repo.remember(&[CandidateFact::new("work_study", "job", "nurse", 90)], &vectors).await;
        repo.remember(&[CandidateFact::new("work_study", "job", "doctor", 90)], &vectors).await;
        assert_eq!(embedder.calls(), 2);
        assert_eq!(repo.query_by_categories(&["work_study"]).unwrap()[0].value, "doctor");
    }

    #[tokio::test]
    async fn test_ephemeral_facts_are_never_stored() {
        let (repo, vectors, embedder, _dir) = setup();
        let stored = repo
            .remember(&[CandidateFact::new("current_state", "mood", "tired", 95)], &vectors)
            .await;
        assert_eq!(stored, 0);
        assert_eq!(embedder.calls(), 0);
        assert!(repo.query_by_categories(&["current_state"]).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_still_stores_fact() {
        let (repo, vectors, embedder, _dir) = setup();
        embedder.set_failing(true);
        assert_eq!(repo.remember(&[CandidateFact::new("family", "sister", "Lucia", 90)], &vectors).await, 1);
        assert!(vectors.is_empty());
        assert_eq!(repo.delete_category("family").unwrap(), 1);
    }
}
