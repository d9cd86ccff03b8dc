use std::env;
use std::path::PathBuf;

use crate::models::MemoryMode;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub character_id: String,
    pub memory_mode: MemoryMode,
    pub llm_provider: String,
    pub llm_api_key: String,
    pub llm_endpoint: Option<String>,
    pub models: TaskModels,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub embedding_api_key: String,
    pub embedding_endpoint: Option<String>,
    pub embedding_dimension: usize,
    pub context_token_budget: usize,
    pub llm_max_retries: u32,
    pub utc_offset_hours: i32,
    pub reply_language: String,
}

/// Model id per task. Empty strings fall back to the provider default.
#[derive(Debug, Clone, Default)]
pub struct TaskModels {
    pub chat: String,
    pub extraction: String,
    pub enrichment: String,
    pub synthesis: String,
    pub generation: String,
}

impl Config {
    pub fn from_env() -> Self {
        let llm_api_key = env::var("LLM_API_KEY").unwrap_or_default();
        let llm_provider = env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let default_model = default_model_for(&llm_provider);
        let model_var = |name: &str| env::var(name).unwrap_or_else(|_| default_model.to_string());

        Self {
            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string())),
            character_id: env::var("CHARACTER_ID").unwrap_or_else(|_| "default".to_string()),
            memory_mode: env::var("MEMORY_MODE")
                .ok()
                .and_then(|m| MemoryMode::from_str(&m))
                .unwrap_or_default(),
            models: TaskModels {
                chat: model_var("MODEL_CHAT"),
                extraction: model_var("MODEL_EXTRACTION"),
                enrichment: model_var("MODEL_ENRICHMENT"),
                synthesis: model_var("MODEL_SYNTHESIS"),
                generation: model_var("MODEL_GENERATION"),
            },
            llm_endpoint: env::var("LLM_ENDPOINT").ok().filter(|e| !e.is_empty()),
            llm_provider,
            embedding_provider: env::var("EMBEDDING_PROVIDER").unwrap_or_else(|_| "auto".to_string()),
            embedding_model: env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "mistral-embed".to_string()),
            embedding_api_key: env::var("EMBEDDING_API_KEY").unwrap_or_else(|_| llm_api_key.clone()),
            embedding_endpoint: env::var("EMBEDDING_ENDPOINT").ok().filter(|e| !e.is_empty()),
            embedding_dimension: parse_var("EMBEDDING_DIMENSION", 1024),
            context_token_budget: parse_var("CONTEXT_TOKEN_BUDGET", 3000),
            llm_max_retries: parse_var("LLM_MAX_RETRIES", 3),
            utc_offset_hours: parse_var("UTC_OFFSET_HOURS", -3),
            reply_language: env::var("REPLY_LANGUAGE").unwrap_or_else(|_| "Spanish".to_string()),
            llm_api_key,
        }
    }

    /// Directory holding everything that belongs to the active character.
    pub fn character_dir(&self) -> PathBuf {
        self.data_dir.join(&self.character_id)
    }

    pub fn character_path(&self) -> PathBuf {
        self.character_dir().join("character.json")
    }

    pub fn database_path(&self) -> PathBuf {
        self.character_dir().join("memory.db")
    }
}

impl Default for Config {
    /// Offline defaults, used by tests and as a base for programmatic setup.
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            character_id: "default".to_string(),
            memory_mode: MemoryMode::default(),
            llm_provider: "openai".to_string(),
            llm_api_key: String::new(),
            llm_endpoint: None,
            models: TaskModels::default(),
            embedding_provider: "auto".to_string(),
            embedding_model: "mistral-embed".to_string(),
            embedding_api_key: String::new(),
            embedding_endpoint: None,
            embedding_dimension: 1024,
            context_token_budget: 3000,
            llm_max_retries: 3,
            utc_offset_hours: -3,
            reply_language: "Spanish".to_string(),
        }
    }
}

fn default_model_for(provider: &str) -> &'static str {
    match provider.to_lowercase().as_str() {
        "claude" | "anthropic" => "claude-sonnet-4-20250514",
        "mistral" => "mistral-small-latest",
        "openrouter" => "mistralai/mistral-small",
        "ollama" | "llama" => "llama3.3",
        _ => "gpt-4o-mini",
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("{} has an invalid value '{}', using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_paths_hang_off_data_dir() {
        let config = Config {
            data_dir: PathBuf::from("/tmp/companions"),
            character_id: "luna".to_string(),
            ..Config::default()
        };
        assert_eq!(config.character_dir(), PathBuf::from("/tmp/companions/luna"));
        assert_eq!(config.database_path(), PathBuf::from("/tmp/companions/luna/memory.db"));
        assert_eq!(config.character_path(), PathBuf::from("/tmp/companions/luna/character.json"));
    }

    #[test]
    fn test_default_model_per_provider() {
        assert_eq!(default_model_for("Claude"), "claude-sonnet-4-20250514");
        assert_eq!(default_model_for("ollama"), "llama3.3");
        assert_eq!(default_model_for("unknown"), "gpt-4o-mini");
    }
}
