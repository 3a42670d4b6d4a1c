use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::task::ValidationMode;

/// Endpoint override for one tool-augmented agent family.
///
/// Unset fields fall back to the top-level LLM settings, so a deployment can point
/// the search agent at a tool-capable proxy while everything else talks to Groq.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ToolsetRoute {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ToolsetRoutes {
    #[serde(default)]
    pub web_search: ToolsetRoute,
    #[serde(default)]
    pub finance_data: ToolsetRoute,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Firestore,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirestoreConfig {
    #[serde(default)]
    pub project_id: String,
    #[serde(default = "default_firestore_database")]
    pub database: String,
    #[serde(default = "default_firestore_base_url")]
    pub base_url: String,
    /// OAuth access token sent as a bearer token. Left empty for emulators and open rules.
    #[serde(default)]
    pub access_token: Option<String>,
}

fn default_firestore_database() -> String {
    "(default)".to_string()
}

fn default_firestore_base_url() -> String {
    "https://firestore.googleapis.com/v1".to_string()
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            database: default_firestore_database(),
            base_url: default_firestore_base_url(),
            access_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Issue the identity cookie as `SameSite=None; Secure` for browser clients
    /// served from another site.
    #[serde(default)]
    pub cross_site_cookie: bool,

    // LLM configuration (OpenAI-compatible: Groq, Ollama, vLLM, OpenAI, etc.)
    #[serde(default = "default_llm_url")]
    pub llm_api_url: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default)]
    pub llm_api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub toolsets: ToolsetRoutes,

    // Document store
    #[serde(default)]
    pub store: StoreKind,
    #[serde(default)]
    pub firestore: FirestoreConfig,
    /// JSON file preloaded into the in-memory store.
    #[serde(default)]
    pub memory_seed_path: Option<String>,
    #[serde(default = "default_personality_collection")]
    pub personality_collection: String,
    #[serde(default = "default_fitness_history_collection")]
    pub fitness_history_collection: String,
    #[serde(default = "default_task_history_collection")]
    pub task_history_collection: String,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default)]
    pub task_validation: ValidationMode,
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_llm_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_llm_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_personality_collection() -> String {
    "personalityScores".to_string()
}

fn default_fitness_history_collection() -> String {
    "fitnessMessages".to_string()
}

fn default_task_history_collection() -> String {
    "taskMessages".to_string()
}

fn default_history_limit() -> usize {
    5
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cross_site_cookie: false,
            llm_api_url: default_llm_url(),
            llm_model: default_llm_model(),
            llm_api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            toolsets: ToolsetRoutes::default(),
            store: StoreKind::default(),
            firestore: FirestoreConfig::default(),
            memory_seed_path: None,
            personality_collection: default_personality_collection(),
            fitness_history_collection: default_fitness_history_collection(),
            task_history_collection: default_task_history_collection(),
            history_limit: default_history_limit(),
            task_validation: ValidationMode::default(),
        }
    }
}

impl ServiceConfig {
    /// Get the directory containing the executable
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    /// Get the path to the config file (relative to executable)
    pub fn config_path() -> PathBuf {
        Self::get_base_dir().join("pasta_config.toml")
    }

    /// Load config from pasta_config.toml (next to executable), or `PASTA_CONFIG` when set.
    /// Environment variables are applied on top in both cases.
    pub fn load() -> Self {
        let path = env::var("PASTA_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(Self::config_path);

        let base = match Self::load_from(&path) {
            Ok(Some(config)) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Ok(None) => {
                tracing::warn!("No config file found, using defaults + env vars");
                Self::default()
            }
            Err(e) => {
                tracing::error!("{:#}", e);
                Self::default()
            }
        };

        base.with_env_overrides(|key| env::var(key).ok())
    }

    /// Parse a config file. `Ok(None)` means the file does not exist.
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
        };
        let config = toml::from_str::<ServiceConfig>(&contents)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(Some(config))
    }

    /// Apply environment overrides. `lookup` is `std::env::var` outside tests.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(bind) = non_empty("PASTA_BACKEND_BIND") {
            self.bind = bind;
        }

        if let Some(flag) = non_empty("PASTA_COOKIE_CROSS_SITE") {
            let flag = flag.trim();
            self.cross_site_cookie = flag == "1" || flag.eq_ignore_ascii_case("true");
        }

        if let Some(url) = non_empty("LLM_API_URL") {
            self.llm_api_url = url;
        }

        if let Some(model) = non_empty("LLM_MODEL") {
            self.llm_model = model;
        }

        if let Some(key) = non_empty("LLM_API_KEY").or_else(|| non_empty("GROQ_API_KEY")) {
            self.llm_api_key = Some(key);
        }

        if let Some(project) = non_empty("FIRESTORE_PROJECT_ID") {
            self.firestore.project_id = project;
        }

        if let Some(database) = non_empty("FIRESTORE_DATABASE") {
            self.firestore.database = database;
        }

        if let Some(url) = non_empty("FIRESTORE_BASE_URL") {
            self.firestore.base_url = url;
        }

        if let Some(token) = non_empty("FIRESTORE_TOKEN") {
            self.firestore.access_token = Some(token);
        }

        if let Some(store) = non_empty("PASTA_STORE") {
            match store.trim().to_ascii_lowercase().as_str() {
                "firestore" => self.store = StoreKind::Firestore,
                "memory" => self.store = StoreKind::Memory,
                other => tracing::warn!("Ignoring unknown PASTA_STORE '{}'", other),
            }
        }

        if let Some(seed) = non_empty("PASTA_MEMORY_SEED") {
            self.memory_seed_path = Some(seed);
        }

        if let Some(mode) = non_empty("PASTA_TASK_VALIDATION") {
            match mode.parse::<ValidationMode>() {
                Ok(mode) => self.task_validation = mode,
                Err(e) => tracing::warn!("Ignoring PASTA_TASK_VALIDATION: {}", e),
            }
        }

        if let Some(limit) = non_empty("PASTA_HISTORY_LIMIT") {
            if let Ok(limit) = limit.trim().parse() {
                self.history_limit = limit;
            }
        }

        if let Some(timeout) = non_empty("PASTA_REQUEST_TIMEOUT_SECS") {
            if let Ok(seconds) = timeout.trim().parse() {
                self.request_timeout_secs = seconds;
            }
        }

        self
    }
}
