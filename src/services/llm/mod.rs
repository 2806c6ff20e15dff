pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::{LlmClient, LlmConfig};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// Text generation backend. Only used to write node titles and content;
/// it never influences which actions run or in what order.
#[async_trait]
pub trait LanguageModelGateway: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> anyhow::Result<Completion>;
}
