use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::agent::Dispatcher;
use crate::config::{ServiceConfig, StoreKind};
use crate::http_client::build_http_client;
use crate::llm_client::LlmClient;
use crate::pipeline::{Pipeline, PipelineSettings};
use crate::store::{DocumentStore, FirestoreStore, MemoryStore};

/// Everything the HTTP surface needs, wired from one config.
pub struct BackendRuntime {
    pub config: ServiceConfig,
    pub pipeline: Pipeline,
}

impl BackendRuntime {
    pub async fn bootstrap(config: ServiceConfig) -> Result<Self> {
        let timeout = (config.request_timeout_secs > 0)
            .then(|| Duration::from_secs(config.request_timeout_secs));
        let client = build_http_client(timeout)?;

        if config.llm_api_key.is_none() {
            tracing::warn!("No LLM API key configured (set GROQ_API_KEY or LLM_API_KEY)");
        }
        let llm = LlmClient::from_config(&config, client.clone());
        let store = build_store(&config, client).await?;

        tracing::info!(
            model = %config.llm_model,
            store = ?config.store,
            validation = ?config.task_validation,
            history_limit = config.history_limit,
            "Backend runtime ready"
        );

        let pipeline = Pipeline::new(
            store,
            Dispatcher::new(Arc::new(llm)),
            PipelineSettings::from(&config),
        );
        Ok(Self { config, pipeline })
    }
}

async fn build_store(
    config: &ServiceConfig,
    client: reqwest::Client,
) -> Result<Arc<dyn DocumentStore>> {
    match config.store {
        StoreKind::Firestore => {
            if config.firestore.project_id.trim().is_empty() {
                anyhow::bail!(
                    "Firestore store selected but no project id configured (set FIRESTORE_PROJECT_ID or PASTA_STORE=memory)"
                );
            }
            if config.firestore.access_token.is_none() {
                tracing::warn!("No Firestore access token; requests rely on public security rules");
            }
            Ok(Arc::new(FirestoreStore::new(client, &config.firestore)))
        }
        StoreKind::Memory => {
            let store = MemoryStore::new();
            if let Some(path) = config.memory_seed_path.as_deref() {
                let loaded = load_seed_file(&store, Path::new(path)).await?;
                tracing::info!("Seeded in-memory store with {} documents from {}", loaded, path);
            }
            Ok(Arc::new(store))
        }
    }
}

async fn load_seed_file(store: &MemoryStore, path: &Path) -> Result<usize> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    let seed: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse seed file {}", path.display()))?;
    store
        .load_seed(&seed)
        .await
        .with_context(|| format!("Invalid seed file {}", path.display()))
}
