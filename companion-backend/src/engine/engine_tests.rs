//! End-to-end tests for the turn pipeline: the synchronous reply path and the
//! background learning pass, with a scripted generator and a local embedder.

use std::sync::Arc;

use crate::ai::{MessageRole, MockAiClient};
use crate::config::Config;
use crate::db::Database;
use crate::embedding::HashEmbedder;
use crate::engine::{CompanionEngine, EngineError};
use crate::memory::{EmbeddingKind, SynthesisReason, VectorMemoryStore, CONTINUE_MARKER};
use crate::models::{ChatRole, MemoryMode, RelationshipState};

const CHAT_NEEDLE: &str = "RESPONSE RULES";
const EXTRACTION_NEEDLE: &str = "Return ONLY a JSON array";

const NAME_FACT: &str = r#"[{"category": "identity", "key": "name", "value": "Leo", "confidence": 95}]"#;
const ENRICHMENT: &str =
    r#"{"summary": "Leo introduced himself", "topics": ["introductions"], "emotion": "calm", "importance": 4}"#;

/// Test harness with an in-memory database, a vector store in a temp dir and
/// a scripted generator shared with the engine.
struct TestHarness {
    engine: CompanionEngine,
    db: Arc<Database>,
    mock: Arc<MockAiClient>,
    embedder: Arc<HashEmbedder>,
    _dir: tempfile::TempDir,
}

impl TestHarness {
    fn new(mock: MockAiClient) -> Self {
        Self::with_mode(mock, MemoryMode::Roleplay)
    }

    fn with_mode(mock: MockAiClient, mode: MemoryMode) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            character_id: "luna".to_string(),
            memory_mode: mode,
            embedding_dimension: 32,
            ..Config::default()
        };

        let db = Arc::new(Database::new(":memory:").expect("in-memory db"));
        let embedder = Arc::new(HashEmbedder::new(32));
        let vectors = Arc::new(
            VectorMemoryStore::load(dir.path(), 32, embedder.clone()).expect("vector store"),
        );
        let mock = Arc::new(mock);
        let engine = CompanionEngine::new(config, db.clone(), vectors, mock.clone());

        Self { engine, db, mock, embedder, _dir: dir }
    }

    fn chat_requests(&self) -> Vec<crate::ai::CompletionRequest> {
        self.mock
            .requests()
            .into_iter()
            .filter(|r| r.messages.iter().any(|m| m.content.contains(CHAT_NEEDLE)))
            .collect()
    }
}

/// Every memory job answered, chat answered with `reply`.
fn scripted(reply: &str) -> MockAiClient {
    MockAiClient::new(Vec::new())
        .respond_to(CHAT_NEEDLE, reply)
        .respond_to(EXTRACTION_NEEDLE, NAME_FACT)
        .respond_to("mentioned in passing", "[]")
        .respond_to("Analyse this exchange", ENRICHMENT)
        .respond_to("Briefly analyse the emotion", r#"{"emotion": "joy", "intensity": 3}"#)
        .respond_to("", "ok")
}

#[tokio::test]
async fn test_turn_stores_both_messages_and_learns_in_background() {
    let h = TestHarness::new(scripted("*smiles* Nice to meet you, Leo."));

    let reply = h.engine.process_turn("  Hi, my name is Leo and I just moved here  ").await.unwrap();
    assert_eq!(reply, "*smiles* Nice to meet you, Leo.");

    let messages = h.db.recent_messages(10).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, ChatRole::User);
    assert_eq!(messages[0].content, "Hi, my name is Leo and I just moved here");
    assert_eq!(messages[1].role, ChatRole::Assistant);

    h.engine.wait_for_background().await;

    let facts = h.db.list_facts().unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].value, "Leo");

    assert_eq!(h.db.count_episodes().unwrap(), 1);
    let episode = h.db.get_episode(1).unwrap().expect("episode stored");
    assert!(episode.embedding_id.is_some());
    assert_eq!(episode.summary.as_deref(), Some("Leo introduced himself"));
    assert_eq!(episode.importance, Some(4));

    let kinds: Vec<EmbeddingKind> = h.engine.vectors().records().iter().map(|r| r.kind).collect();
    assert!(kinds.contains(&EmbeddingKind::PermanentFact));
    assert!(kinds.contains(&EmbeddingKind::Episode));
}

#[tokio::test]
async fn test_history_does_not_repeat_current_message() {
    let h = TestHarness::new(scripted("*nods* Go on."));

    h.engine.process_turn("first message about my week").await.unwrap();
    h.engine.process_turn("second message about my job").await.unwrap();
    h.engine.wait_for_background().await;

    let requests = h.chat_requests();
    assert_eq!(requests.len(), 2);

    let last = &requests[1];
    let roles: Vec<MessageRole> = last.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![MessageRole::System, MessageRole::User, MessageRole::Assistant, MessageRole::User]
    );
    assert_eq!(last.messages[3].content, "second message about my job");
    let mentions = last
        .messages
        .iter()
        .filter(|m| m.content == "second message about my job")
        .count();
    assert_eq!(mentions, 1);
    assert_eq!(last.temperature, Some(0.88));
    assert_eq!(last.max_tokens, 600);
}

#[tokio::test]
async fn test_long_reply_is_trimmed_to_word_limit() {
    let long = vec!["word"; 300].join(" ");
    let h = TestHarness::new(scripted(&long));

    let reply = h.engine.process_turn("tell me a long story please").await.unwrap();
    assert_eq!(reply.split_whitespace().count(), MemoryMode::Roleplay.reply_word_limit());
    assert!(reply.ends_with("..."));

    let stored = h.db.last_message().unwrap().expect("reply stored");
    assert_eq!(stored.content, reply);
    h.engine.wait_for_background().await;
}

#[tokio::test]
async fn test_generation_failure_keeps_user_message_only() {
    let h = TestHarness::new(MockAiClient::failing());

    let result = h.engine.process_turn("are you there?").await;
    assert!(matches!(result, Err(EngineError::Generation(_))));

    assert_eq!(h.db.count_messages().unwrap(), 1);
    assert_eq!(h.db.count_user_messages().unwrap(), 1);
    assert_eq!(h.db.count_episodes().unwrap(), 0);
}

#[tokio::test]
async fn test_phase_failure_does_not_fail_the_turn() {
    let h = TestHarness::new(scripted("*smiles* Hi."));
    // the phase recompute counts facts, so it fails without this table
    h.db.conn().execute("DROP TABLE permanent_facts", []).unwrap();

    let reply = h.engine.process_turn("hola, soy Leo").await.unwrap();
    assert_eq!(reply, "*smiles* Hi.");
    assert_eq!(h.db.last_message().unwrap().expect("reply stored").content, "*smiles* Hi.");

    // the background pass still ran
    h.engine.wait_for_background().await;
    assert_eq!(h.db.count_episodes().unwrap(), 1);
}

#[tokio::test]
async fn test_blank_reply_is_an_error() {
    let h = TestHarness::new(scripted("   "));

    let result = h.engine.process_turn("hello there friend").await;
    assert!(matches!(result, Err(EngineError::EmptyReply)));
    assert_eq!(h.db.count_messages().unwrap(), 1);
}

#[tokio::test]
async fn test_continuation_after_assistant_turn() {
    let h = TestHarness::new(scripted("*looks outside* The rain stopped."));

    h.engine.process_turn("what are you doing today?").await.unwrap();
    h.engine.wait_for_background().await;
    let extraction_calls = h.mock.calls_matching(EXTRACTION_NEEDLE);

    let reply = h.engine.process_continuation().await.unwrap();
    assert_eq!(reply, "*looks outside* The rain stopped.");
    h.engine.wait_for_background().await;

    let requests = h.chat_requests();
    let last = requests.last().expect("continuation request");
    assert!(last.messages[0].content.contains("has not written anything new"));
    let tail = last.messages.last().unwrap();
    assert_eq!(tail.role, MessageRole::User);
    assert_eq!(tail.content, CONTINUE_MARKER);

    // no new user message, one more assistant message
    assert_eq!(h.db.count_user_messages().unwrap(), 1);
    assert_eq!(h.db.count_messages().unwrap(), 3);

    // roleplay continuations are not mined for facts
    assert_eq!(h.mock.calls_matching(EXTRACTION_NEEDLE), extraction_calls);

    let episode = h.db.get_episode(2).unwrap().expect("continuation episode");
    assert_eq!(episode.user_text, CONTINUE_MARKER);
    let kinds: Vec<EmbeddingKind> = h.engine.vectors().records().iter().map(|r| r.kind).collect();
    assert!(kinds.contains(&EmbeddingKind::EpisodeContinue));
}

#[tokio::test]
async fn test_companion_continuation_extracts_facts() {
    let h = TestHarness::with_mode(scripted("*hums* You said you were Leo, right?"), MemoryMode::Companion);

    h.engine.process_continuation().await.unwrap();
    h.engine.wait_for_background().await;

    assert_eq!(h.mock.calls_matching(EXTRACTION_NEEDLE), 1);
    assert_eq!(h.db.list_facts().unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_embedding_still_stores_episode() {
    let h = TestHarness::new(scripted("*waves* Hey."));
    h.embedder.set_failing(true);

    h.engine.process_turn("hey, long day at the office").await.unwrap();
    h.engine.wait_for_background().await;

    let episode = h.db.get_episode(1).unwrap().expect("episode stored");
    assert!(episode.embedding_id.is_none());
    assert!(h.engine.vectors().is_empty());
    // the fact itself survives without its vector
    assert_eq!(h.db.list_facts().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reset_memory_forgets_facts_and_keeps_chat() {
    let h = TestHarness::new(scripted("*smiles* Hi Leo."));

    h.engine.process_turn("Hi, my name is Leo").await.unwrap();
    h.engine.wait_for_background().await;
    assert!(!h.db.list_facts().unwrap().is_empty());

    h.engine.reset_memory().unwrap();

    assert!(h.db.list_facts().unwrap().is_empty());
    assert!(h.db.list_synthesis().unwrap().is_empty());
    assert!(h
        .engine
        .vectors()
        .records()
        .iter()
        .all(|r| r.kind != EmbeddingKind::PermanentFact));
    let episode = h.db.get_episode(1).unwrap().expect("episode kept");
    assert!(episode.embedding_id.is_none());

    assert_eq!(h.db.get_relationship().unwrap().phase, RelationshipState::default().phase);
    assert_eq!(h.db.count_messages().unwrap(), 2);
}

#[tokio::test]
async fn test_switch_scenario() {
    let h = TestHarness::new(scripted("*sits by the fire*"));

    assert!(matches!(h.engine.switch_scenario(42), Err(EngineError::ScenarioNotFound(42))));

    let id = h.db.insert_scenario("Cabin", "A snowed-in cabin in the mountains", None).unwrap();
    h.engine.switch_scenario(id).unwrap();

    h.engine.process_turn("it is so cold tonight").await.unwrap();
    h.engine.wait_for_background().await;

    let episode = h.db.get_episode(1).unwrap().expect("episode stored");
    assert_eq!(episode.scenario_id, Some(id));
}

#[tokio::test]
async fn test_first_synthesis_is_due_on_fresh_database() {
    let h = TestHarness::new(scripted("ok"));

    let report = h.engine.trigger_synthesis_if_due().await.unwrap().expect("due");
    assert_eq!(report.reason, SynthesisReason::FirstSynthesis);
    assert!(!report.profile_written);
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn test_assembled_context_shows_learned_facts() {
    let h = TestHarness::new(scripted("*smiles* Hi Leo."));

    h.engine.process_turn("Hi, my name is Leo").await.unwrap();
    h.engine.wait_for_background().await;

    let context = h.engine.get_assembled_context("what do you remember about me?").await;
    assert!(context.contains("Leo"));

    let preamble = h.engine.system_preamble("what do you remember about me?");
    assert!(preamble.contains("Leo"));
}
