// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! LLM provider plumbing.
//!
//! Providers are registered by id in a manager; the extraction layer picks
//! the configured one. Provider failures are classified at this boundary:
//! rate limits back off, unavailability retries, malformed output is
//! dropped per item by the extraction layer.

use crate::config::LlmConfig;
use dashmap::DashMap;
use graphmem_core::GraphMemError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

mod embedder;
mod extraction;
mod providers;

pub use embedder::{GatedEmbedder, OpenAiEmbedder};
pub use extraction::{CandidateEntity, CandidateFact, ExtractionClient};
pub use providers::{AnthropicProvider, OpenAiProvider};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub duration_ms: u32,
}

/// Provider-boundary error classification.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// The provider asked us to slow down (HTTP 429 and friends).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Transport failure, 5xx, or timeout.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The response arrived but could not be used.
    #[error("bad output: {0}")]
    BadOutput(String),
}

impl From<LlmError> for GraphMemError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::RateLimited(msg) => GraphMemError::RateLimited(msg),
            LlmError::Unavailable(msg) => GraphMemError::Unavailable(msg),
            LlmError::BadOutput(msg) => GraphMemError::BadLlmOutput(msg),
        }
    }
}

#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        model: Option<String>,
    ) -> Result<ChatResponse, LlmError>;

    fn list_models(&self) -> Vec<String>;
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    pub models: Vec<String>,
}

/// Registry of chat providers keyed by id.
pub struct LlmProviderManager {
    providers: DashMap<String, Arc<dyn LlmProvider>>,
}

impl LlmProviderManager {
    /// Initialize providers from configuration. A provider is registered
    /// only when its credentials are present.
    pub fn from_config(llm_config: &LlmConfig) -> Self {
        let manager = Self {
            providers: DashMap::new(),
        };

        if let Some(key) = &llm_config.openai_api_key {
            let provider = OpenAiProvider::new(key.clone(), llm_config.provider_base_url.clone());
            manager.register("openai", Arc::new(provider));
            info!("initialized OpenAI provider");
        } else {
            warn!("OPENAI_API_KEY not set, OpenAI provider disabled");
        }

        if let Some(key) = &llm_config.anthropic_api_key {
            let provider = AnthropicProvider::new(key.clone());
            manager.register("anthropic", Arc::new(provider));
            info!("initialized Anthropic provider");
        } else {
            warn!("ANTHROPIC_API_KEY not set, Anthropic provider disabled");
        }

        manager
    }

    pub fn empty() -> Self {
        Self {
            providers: DashMap::new(),
        }
    }

    /// Register or replace a provider. Tests use this to inject scripted
    /// providers.
    pub fn register(&self, id: &str, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(id.to_string(), provider);
    }

    pub async fn chat(
        &self,
        provider_id: &str,
        model: Option<String>,
        messages: Vec<ChatMessage>,
    ) -> Result<ChatResponse, LlmError> {
        let provider = self
            .providers
            .get(provider_id)
            .ok_or_else(|| LlmError::Unavailable(format!("provider not found: {}", provider_id)))?
            .clone();
        provider.chat(messages, model).await
    }

    pub fn list_providers(&self) -> Vec<ProviderInfo> {
        self.providers
            .iter()
            .map(|entry| {
                let (id, provider) = entry.pair();
                ProviderInfo {
                    id: id.clone(),
                    name: provider.name().to_string(),
                    models: provider.list_models(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_provider_is_unavailable() {
        let manager = LlmProviderManager::empty();
        let err = manager
            .chat("openai", None, vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[test]
    fn llm_errors_map_to_core_kinds() {
        assert_eq!(
            GraphMemError::from(LlmError::RateLimited("429".into())).kind(),
            "rate_limited"
        );
        assert_eq!(
            GraphMemError::from(LlmError::Unavailable("503".into())).kind(),
            "unavailable"
        );
        assert_eq!(
            GraphMemError::from(LlmError::BadOutput("not json".into())).kind(),
            "bad_llm_output"
        );
    }
}
