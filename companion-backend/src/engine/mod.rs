//! Per-turn orchestration.
//!
//! The synchronous path stores the message, assembles the preamble and the
//! memory context, generates the reply and recomputes the relationship phase.
//! Everything that learns from the exchange runs afterwards on a detached task
//! (see `post_turn`), so the caller never waits on it.

mod post_turn;

#[cfg(test)]
mod engine_tests;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::ai::{AiClient, AiError, CompletionRequest, Message, TextGenerator};
use crate::config::Config;
use crate::context::{ContextAssembler, ContextCache};
use crate::db::Database;
use crate::embedding::{self, EmbeddingError};
use crate::memory::{
    relationship, EmbeddingKind, SynthesisEngine, SynthesisReport, VectorMemoryStore, VectorStoreError, CONTINUE_MARKER,
};
use crate::models::{ChatRole, MemoryMode};
use crate::time::LocalClock;

use post_turn::{PostTurn, TurnKind};

const CHAT_MAX_TOKENS: u32 = 600;
const CHAT_TEMPERATURE: f32 = 0.88;

const CONTINUE_INSTRUCTION: &str = "The user has not written anything new. Continue naturally from your last message: follow the scene, expand on what you said, or move the situation forward. Do not wait for the user's input.";

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Generation failed: {0}")]
    Generation(#[from] AiError),
    #[error("The model returned an empty reply")]
    EmptyReply,
    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),
    #[error("Embedding setup failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("Scenario {0} not found")]
    ScenarioNotFound(i64),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Shared by the synchronous path and every background pass
pub(crate) struct EngineCore {
    pub db: Arc<Database>,
    pub vectors: Arc<VectorMemoryStore>,
    pub generator: Arc<dyn TextGenerator>,
    pub assembler: ContextAssembler,
    pub config: Config,
    pub clock: LocalClock,
}

pub struct CompanionEngine {
    core: Arc<EngineCore>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl CompanionEngine {
    /// Open the active character's database and vector store and connect the
    /// configured providers.
    pub fn from_config(config: Config) -> Result<Self, EngineError> {
        let dir = config.character_dir();
        std::fs::create_dir_all(&dir)
            .map_err(|e| EngineError::Config(format!("cannot create {}: {}", dir.display(), e)))?;

        let db_path = config.database_path();
        let db = Arc::new(Database::new(&db_path.to_string_lossy())?);
        let embedder = embedding::provider_from_config(&config)?;
        let vectors = Arc::new(VectorMemoryStore::load(&dir, config.embedding_dimension, embedder)?);
        let generator: Arc<dyn TextGenerator> = Arc::new(AiClient::from_config(&config).map_err(EngineError::Config)?);

        log::info!(
            "[ENGINE] Character '{}' ready ({} provider, {} vectors)",
            config.character_id,
            generator.provider_name(),
            vectors.len()
        );
        Ok(Self::new(config, db, vectors, generator))
    }

    pub fn new(
        config: Config,
        db: Arc<Database>,
        vectors: Arc<VectorMemoryStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let assembler = ContextAssembler::new(db.clone(), vectors.clone(), Arc::new(ContextCache::new()), &config);
        let clock = LocalClock::new(config.utc_offset_hours);
        Self {
            core: Arc::new(EngineCore {
                db,
                vectors,
                generator,
                assembler,
                config,
                clock,
            }),
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.core.db
    }

    pub fn vectors(&self) -> &Arc<VectorMemoryStore> {
        &self.core.vectors
    }

    pub fn mode(&self) -> MemoryMode {
        self.core.assembler.mode()
    }

    /// One user turn: store, generate, store the reply, recompute the phase,
    /// then learn from the exchange in the background.
    pub async fn process_turn(&self, user_text: &str) -> Result<String, EngineError> {
        let user_text = user_text.trim();
        let core = &self.core;
        let mode = core.assembler.mode();

        core.db.insert_message(ChatRole::User, user_text)?;
        let history = core.db.recent_messages(mode.history_window())?;
        let scenario_id = core.db.active_scenario()?.map(|s| s.id);

        let system = self.system_text(user_text).await;
        let mut messages = vec![Message::system(system)];
        // the newest stored message is the one just inserted
        for message in history.iter().take(history.len().saturating_sub(1)) {
            messages.push(to_chat_message(message.role, &message.content));
        }
        messages.push(Message::user(user_text));

        log::info!("[ENGINE] User message: {}", user_text);
        let reply = self.generate(messages, mode).await?;
        core.db.insert_message(ChatRole::Assistant, &reply)?;

        self.refresh_phase();
        self.spawn_background(PostTurn {
            kind: TurnKind::User,
            user_text: user_text.to_string(),
            reply: reply.clone(),
            scenario_id,
            mode,
        });
        Ok(reply)
    }

    /// The character carries on without new user input.
    pub async fn process_continuation(&self) -> Result<String, EngineError> {
        let core = &self.core;
        let mode = core.assembler.mode();

        let history = core.db.recent_messages(mode.history_window())?;
        let scenario_id = core.db.active_scenario()?.map(|s| s.id);

        let system = format!("{}\n\n{}", self.system_text("").await, CONTINUE_INSTRUCTION);
        let mut messages = vec![Message::system(system)];
        for message in &history {
            messages.push(to_chat_message(message.role, &message.content));
        }
        if history.last().is_none_or(|m| m.role == ChatRole::Assistant) {
            messages.push(Message::user(CONTINUE_MARKER));
        }

        let reply = self.generate(messages, mode).await?;
        core.db.insert_message(ChatRole::Assistant, &reply)?;

        self.refresh_phase();
        self.spawn_background(PostTurn {
            kind: TurnKind::Continuation,
            user_text: CONTINUE_MARKER.to_string(),
            reply: reply.clone(),
            scenario_id,
            mode,
        });
        Ok(reply)
    }

    pub fn recompute_phase(&self) -> Result<u8, EngineError> {
        Ok(relationship::recompute(&self.core.db)?)
    }

    /// Phase bookkeeping after a stored reply. A failure only costs one stale
    /// phase, so the reply still goes out and the background pass still runs.
    fn refresh_phase(&self) {
        if let Err(e) = self.recompute_phase() {
            log::warn!("[ENGINE] Phase recompute failed: {}", e);
        }
    }

    /// The memory block exactly as the next generation call would see it
    pub async fn get_assembled_context(&self, user_text: &str) -> String {
        self.core
            .assembler
            .build_context(user_text, self.core.config.context_token_budget)
            .await
    }

    pub fn system_preamble(&self, user_text: &str) -> String {
        self.core.assembler.build_system_preamble(user_text)
    }

    pub async fn trigger_synthesis_if_due(&self) -> Result<Option<SynthesisReport>, EngineError> {
        let engine = self.synthesis_engine();
        let (due, reason) = engine.should_regenerate()?;
        if !due {
            log::debug!("[ENGINE] Synthesis not due");
            return Ok(None);
        }
        Ok(Some(engine.run(reason).await))
    }

    pub fn switch_scenario(&self, scenario_id: i64) -> Result<(), EngineError> {
        if !self.core.db.activate_scenario(scenario_id)? {
            return Err(EngineError::ScenarioNotFound(scenario_id));
        }
        self.core.assembler.invalidate();
        log::info!("[ENGINE] Switched to scenario {}", scenario_id);
        Ok(())
    }

    /// Drop cached character data after the card changed on disk.
    pub fn reload_character(&self) {
        self.core.assembler.invalidate();
        log::info!("[ENGINE] Character '{}' reloaded", self.core.assembler.character().name);
    }

    /// Forget everything learned about the user: facts, their vectors, the
    /// synthesis built on them and the relationship progress. The chat log stays.
    pub fn reset_memory(&self) -> Result<(), EngineError> {
        let core = &self.core;
        let facts = core.db.delete_all_facts()?;
        core.db.delete_all_synthesis()?;

        let removed = core
            .vectors
            .rebuild_excluding(|record| record.kind == EmbeddingKind::PermanentFact)?;
        // slots were re-indexed, so stored episode links are no longer valid
        core.db.clear_episode_embedding_ids()?;

        relationship::reset(&core.db)?;
        core.assembler.invalidate();
        log::info!("[ENGINE] Memory reset: {} facts and {} vectors removed", facts, removed);
        Ok(())
    }

    /// Wait for every background pass started so far.
    pub async fn wait_for_background(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.background.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("[ENGINE] Background pass panicked: {}", e);
            }
        }
    }

    async fn system_text(&self, user_text: &str) -> String {
        let core = &self.core;
        let preamble = core.assembler.build_system_preamble(user_text);
        let context = core
            .assembler
            .build_context(user_text, core.config.context_token_budget)
            .await;
        if context.is_empty() {
            preamble
        } else {
            format!("{}\n\n{}", preamble, context)
        }
    }

    async fn generate(&self, messages: Vec<Message>, mode: MemoryMode) -> Result<String, EngineError> {
        let core = &self.core;
        let request = CompletionRequest::new(&core.config.models.chat, messages, CHAT_MAX_TOKENS)
            .with_temperature(CHAT_TEMPERATURE);
        let raw = core.generator.complete(request).await.map_err(|e| {
            log::error!("[ENGINE] Generation error ({}): {}", core.generator.provider_name(), e);
            e
        })?;

        let reply = trim_reply(raw.trim(), mode.reply_word_limit());
        if reply.is_empty() {
            return Err(EngineError::EmptyReply);
        }
        Ok(reply)
    }

    fn synthesis_engine(&self) -> SynthesisEngine {
        let core = &self.core;
        SynthesisEngine::new(core.db.clone(), core.generator.clone(), &core.config.models.synthesis, core.clock)
    }

    fn spawn_background(&self, turn: PostTurn) {
        let core = self.core.clone();
        let handle = tokio::spawn(post_turn::run(core, turn));
        let mut background = self.background.lock();
        background.retain(|h| !h.is_finished());
        background.push(handle);
    }
}

fn to_chat_message(role: ChatRole, content: &str) -> Message {
    match role {
        ChatRole::User => Message::user(content),
        ChatRole::Assistant => Message::assistant(content),
    }
}

/// Keep a reply under `limit` words, cutting at the last whole sentence that
/// fits. A first sentence that is already too long is cut at the word limit.
pub fn trim_reply(reply: &str, limit: usize) -> String {
    let words: Vec<&str> = reply.split_whitespace().collect();
    if words.len() <= limit {
        return reply.to_string();
    }

    let mut kept: Vec<&str> = Vec::new();
    let mut total = 0;
    for sentence in reply.split(". ") {
        let count = sentence.split_whitespace().count();
        if total + count > limit {
            break;
        }
        kept.push(sentence);
        total += count;
    }

    if kept.is_empty() {
        return format!("{}...", words[..limit].join(" "));
    }
    let mut text = kept.join(". ");
    if !text.ends_with('.') {
        text.push('.');
    }
    text
}
