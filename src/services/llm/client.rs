use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Completion, LanguageModelGateway, TokenUsage};

const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: Option<String>,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl LlmConfig {
    /// Optional: LLM_API_URL (defaults to a local llama-server),
    /// LLM_MODEL, LLM_TIMEOUT_MS.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("LLM_API_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        config.model = std::env::var("LLM_MODEL").ok();
        if let Some(ms) = std::env::var("LLM_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()) {
            config.timeout = Duration::from_millis(ms);
        }
        config
    }
}

/// llama-server style `/completion` client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: String,
    stream: bool,
    n_predict: u32,
    temperature: f32,
    stop: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    content: String,
    #[serde(default)]
    tokens_evaluated: u32,
    #[serde(default)]
    tokens_predicted: u32,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(config.timeout) // network-level deadline
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    pub fn from_env() -> Self {
        Self::new(LlmConfig::from_env())
    }
}

#[async_trait]
impl LanguageModelGateway for LlmClient {
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Completion> {
        let request_body = CompletionRequest {
            prompt: format!("System: {}\nUser: {}\nAssistant:", system_prompt, prompt),
            stream: false,
            n_predict: max_tokens,
            temperature,
            stop: vec!["User:", "System:"],
            model: self.config.model.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/completion", self.config.base_url))
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("LLM server error: {}", response.status()));
        }

        let body: CompletionResponse = response.json().await?;
        Ok(Completion {
            text: body.content.trim().to_string(),
            usage: TokenUsage {
                prompt_tokens: body.tokens_evaluated,
                completion_tokens: body.tokens_predicted,
            },
        })
    }
}
