//! Memory and context engine for a long-running companion agent.
//!
//! The crate is split the same way the runtime flows:
//! - `db` / `models` - SQLite persistence for messages, facts, episodes, synthesis, relationship
//! - `memory` - vector store, extraction, enrichment, synthesis, relationship phase, emotion, diary
//! - `context` - bounded context block and system preamble assembly
//! - `ai` / `embedding` - outbound generation and embedding capabilities
//! - `engine` - the per-turn orchestration and its detached background pass

pub mod ai;
pub mod character;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod http;
pub mod memory;
pub mod models;
pub mod time;

pub use config::Config;
pub use engine::{CompanionEngine, EngineError};
