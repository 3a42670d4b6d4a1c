use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::{GenerationRequest, TextGenerator, Toolset};
use crate::config::{ServiceConfig, ToolsetRoute};

/// Where one family of agents sends its completions.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

impl Endpoint {
    fn overlay(&self, route: &ToolsetRoute) -> Self {
        Self {
            api_url: route.api_url.clone().unwrap_or_else(|| self.api_url.clone()),
            api_key: route.api_key.clone().unwrap_or_else(|| self.api_key.clone()),
            model: route.model.clone().unwrap_or_else(|| self.model.clone()),
        }
    }
}

#[derive(Clone)]
pub struct LlmClient {
    default: Endpoint,
    web_search: Endpoint,
    finance_data: Endpoint,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

impl LlmClient {
    pub fn new(api_url: String, api_key: String, model: String, client: reqwest::Client) -> Self {
        let default = Endpoint {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        };
        Self {
            web_search: default.clone(),
            finance_data: default.clone(),
            default,
            temperature: Some(0.7),
            max_tokens: Some(2000),
            client,
        }
    }

    pub fn from_config(config: &ServiceConfig, client: reqwest::Client) -> Self {
        let mut llm = Self::new(
            config.llm_api_url.clone(),
            config.llm_api_key.clone().unwrap_or_default(),
            config.llm_model.clone(),
            client,
        );
        llm.web_search = llm.default.overlay(&config.toolsets.web_search);
        llm.finance_data = llm.default.overlay(&config.toolsets.finance_data);
        llm.temperature = Some(config.temperature);
        llm.max_tokens = Some(config.max_tokens);
        llm
    }

    pub fn endpoint_for(&self, toolset: Toolset) -> &Endpoint {
        match toolset {
            Toolset::None => &self.default,
            Toolset::WebSearch => &self.web_search,
            Toolset::FinanceData => &self.finance_data,
        }
    }

    /// Generate a completion using the OpenAI API format
    pub async fn complete(&self, endpoint: &Endpoint, messages: Vec<Message>) -> Result<String> {
        let url = format!("{}/chat/completions", endpoint.api_url.trim_end_matches('/'));

        let request = ChatCompletionRequest {
            model: endpoint.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut req = self.client.post(&url).json(&request);

        // Add API key header if provided (not needed for local models)
        if !endpoint.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", endpoint.api_key));
        }

        let response = req.send().await.context("Failed to send LLM request")?;

        // Check for HTTP errors and include response body for debugging
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            anyhow::bail!("LLM API returned error {}: {}", status, body);
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse LLM response")?;

        let content = completion
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("No response from LLM"))?;

        Ok(content)
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        let endpoint = self.endpoint_for(request.toolset);
        tracing::debug!(
            agent = %request.agent,
            model = %endpoint.model,
            toolset = ?request.toolset,
            "Dispatching completion"
        );

        let messages = vec![
            Message {
                role: "system".to_string(),
                content: request.system_prompt,
            },
            Message {
                role: "user".to_string(),
                content: request.query,
            },
        ];

        self.complete(endpoint, messages)
            .await
            .with_context(|| format!("{} failed to generate a response", request.agent))
    }
}
