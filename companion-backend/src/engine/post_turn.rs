//! Background learning after a reply has been returned.
//!
//! Each step logs and swallows its own failure so one broken provider call
//! never stops the rest of the pass.

use std::sync::Arc;

use super::EngineCore;
use crate::memory::{
    categories, emotional, DiaryWriter, EmbeddingKind, EmotionTracker, EnrichmentJob, ExtractionPipeline,
    FactRepository, SynthesisEngine,
};
use crate::models::{MemoryMode, NewEpisode};
use crate::time::now_utc;

/// Hours of silence after which the next turn triggers a diary entry
const DIARY_GAP_HOURS: f64 = 3.0;
const DIARY_EVERY_N_MESSAGES: i64 = 25;
const BACKSTORY_EVERY_N_MESSAGES: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TurnKind {
    User,
    Continuation,
}

pub(crate) struct PostTurn {
    pub kind: TurnKind,
    pub user_text: String,
    pub reply: String,
    pub scenario_id: Option<i64>,
    pub mode: MemoryMode,
}

pub(crate) async fn run(core: Arc<EngineCore>, turn: PostTurn) {
    match turn.kind {
        TurnKind::User => user_pass(&core, &turn).await,
        TurnKind::Continuation => continuation_pass(&core, &turn).await,
    }
    // new facts may change the confirmed name, threads or promises
    core.assembler.invalidate();
}

async fn user_pass(core: &EngineCore, turn: &PostTurn) {
    let models = &core.config.models;
    let extraction = ExtractionPipeline::new(core.db.clone(), core.generator.clone(), &models.extraction, turn.mode);

    let closed = extraction.close_threads(&turn.user_text);
    if closed > 0 {
        log::info!("[POST_TURN] Closed {} thread(s)", closed);
    }

    let candidates = extraction.extract(&turn.user_text, &turn.reply).await;
    if !candidates.is_empty() {
        let stored = FactRepository::new(core.db.clone())
            .remember(&candidates, &core.vectors)
            .await;
        log::info!("[POST_TURN] Stored {}/{} fact(s)", stored, candidates.len());
    }

    let mentions = extraction.extract_casual_mentions(&turn.user_text).await;
    if mentions > 0 {
        log::debug!("[POST_TURN] {} new open thread(s)", mentions);
    }

    let exchange = format!("User: {}\nCharacter: {}", turn.user_text, turn.reply);
    store_episode(core, turn, &exchange, EmbeddingKind::Episode).await;

    if EmotionTracker::new(core.db.clone(), core.generator.clone(), &models.extraction)
        .detect(&turn.user_text)
        .await
        .is_none()
    {
        log::debug!("[POST_TURN] No emotion sample recorded");
    }

    let user_count = match core.db.count_user_messages() {
        Ok(n) => n,
        Err(e) => {
            log::error!("[POST_TURN] Failed to count user messages: {}", e);
            return;
        }
    };
    let gap_hours = match emotional::session_gap(&core.db, now_utc()) {
        Ok(gap) => gap.hours,
        Err(e) => {
            log::warn!("[POST_TURN] Failed to read session gap: {}", e);
            0.0
        }
    };

    let diary = DiaryWriter::new(core.db.clone(), core.generator.clone(), &models.generation, core.clock);
    if gap_hours >= DIARY_GAP_HOURS || user_count % DIARY_EVERY_N_MESSAGES == 0 {
        let name = core.assembler.character().name.clone();
        match diary.maybe_write_daily_entry(&name).await {
            Ok(Some(_)) => log::info!("[POST_TURN] Diary entry written"),
            Ok(None) => {}
            Err(e) => log::warn!("[POST_TURN] Diary entry failed: {}", e),
        }
    }
    if user_count % BACKSTORY_EVERY_N_MESSAGES == 0 {
        if let Err(e) = diary.refresh_backstory().await {
            log::warn!("[POST_TURN] Backstory refresh failed: {}", e);
        }
    }

    let synthesis = SynthesisEngine::new(core.db.clone(), core.generator.clone(), &models.synthesis, core.clock);
    match synthesis.should_regenerate() {
        Ok((true, reason)) => {
            let report = synthesis.run(reason).await;
            log::info!(
                "[POST_TURN] Synthesis ({}): profile={} history={} digests={} errors={}",
                reason.label(),
                report.profile_written,
                report.history_written,
                report.digests_written,
                report.errors.len()
            );
        }
        Ok((false, _)) => {}
        Err(e) => log::error!("[POST_TURN] Synthesis check failed: {}", e),
    }
}

async fn continuation_pass(core: &EngineCore, turn: &PostTurn) {
    let models = &core.config.models;

    // a continuation only has the character's own words, so only companion
    // mode treats them as evidence about the user
    if turn.mode == MemoryMode::Companion {
        let extraction =
            ExtractionPipeline::new(core.db.clone(), core.generator.clone(), &models.extraction, turn.mode);
        let candidates = extraction
            .extract_with_exclusions("", &turn.reply, categories::CONTINUATION_EXCLUDED)
            .await;
        if !candidates.is_empty() {
            let stored = FactRepository::new(core.db.clone())
                .remember(&candidates, &core.vectors)
                .await;
            log::info!("[POST_TURN] Stored {}/{} fact(s) from continuation", stored, candidates.len());
        }
    }

    let text = format!("Character continues: {}", turn.reply);
    store_episode(core, turn, &text, EmbeddingKind::EpisodeContinue).await;
}

/// Embed the exchange, store the episode row and enrich it. A failed
/// embedding still keeps the row, just without a vector link.
async fn store_episode(core: &EngineCore, turn: &PostTurn, embed_text: &str, kind: EmbeddingKind) {
    let embedding_id = match core.vectors.add(embed_text, kind, None).await {
        Ok(index) => Some(index as i64),
        Err(e) => {
            log::warn!("[POST_TURN] Episode embedding failed: {}", e);
            None
        }
    };

    let episode = NewEpisode {
        user_text: turn.user_text.clone(),
        agent_text: turn.reply.clone(),
        embedding_id,
        scenario_id: turn.scenario_id,
    };
    let episode_id = match core.db.insert_episode(&episode) {
        Ok(id) => id,
        Err(e) => {
            log::error!("[POST_TURN] Failed to store episode: {}", e);
            return;
        }
    };

    let enrichment = EnrichmentJob::new(core.db.clone(), core.generator.clone(), &core.config.models.enrichment);
    if enrichment.enrich(episode_id, &turn.user_text, &turn.reply).await.is_none() {
        log::debug!("[POST_TURN] Episode {} left unenriched", episode_id);
    }
}
