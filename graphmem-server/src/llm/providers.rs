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

use super::{ChatMessage, ChatResponse, LlmError, LlmProvider};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client as OpenAIClient,
};
use serde_json::json;
use std::time::Instant;

fn classify_openai(e: OpenAIError) -> LlmError {
    match e {
        OpenAIError::ApiError(api) => {
            let code = api.code.clone().unwrap_or_default();
            let kind = api.r#type.clone().unwrap_or_default();
            if code.contains("rate_limit") || kind.contains("rate_limit") {
                LlmError::RateLimited(api.message)
            } else {
                LlmError::Unavailable(api.message)
            }
        }
        OpenAIError::Reqwest(e) => LlmError::Unavailable(e.to_string()),
        OpenAIError::JSONDeserialize(e) => LlmError::BadOutput(e.to_string()),
        other => LlmError::Unavailable(other.to_string()),
    }
}

// OpenAI-compatible provider.
pub struct OpenAiProvider {
    client: OpenAIClient<OpenAIConfig>,
    models: Vec<String>,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = base_url {
            config = config.with_api_base(base);
        }
        Self {
            client: OpenAIClient::with_config(config),
            models: vec![
                "gpt-4o".to_string(),
                "gpt-4o-mini".to_string(),
                "gpt-4-turbo".to_string(),
            ],
        }
    }

    fn convert_messages(&self, messages: Vec<ChatMessage>) -> Vec<ChatCompletionRequestMessage> {
        messages
            .into_iter()
            .filter_map(|msg| match msg.role.as_str() {
                "system" => ChatCompletionRequestSystemMessageArgs::default()
                    .content(msg.content)
                    .build()
                    .ok()
                    .map(ChatCompletionRequestMessage::System),
                "user" => ChatCompletionRequestUserMessageArgs::default()
                    .content(msg.content)
                    .build()
                    .ok()
                    .map(ChatCompletionRequestMessage::User),
                "assistant" => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(msg.content)
                    .build()
                    .ok()
                    .map(ChatCompletionRequestMessage::Assistant),
                _ => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        model: Option<String>,
    ) -> Result<ChatResponse, LlmError> {
        let start = Instant::now();
        let model_name = model.unwrap_or_else(|| "gpt-4o-mini".to_string());

        let request = CreateChatCompletionRequestArgs::default()
            .model(&model_name)
            .messages(self.convert_messages(messages))
            .build()
            .map_err(classify_openai)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(classify_openai)?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        let (input_tokens, output_tokens) = response
            .usage
            .map(|u| (Some(u.prompt_tokens), Some(u.completion_tokens)))
            .unwrap_or((None, None));

        Ok(ChatResponse {
            content,
            provider: "openai".to_string(),
            model: model_name,
            input_tokens,
            output_tokens,
            duration_ms: start.elapsed().as_millis() as u32,
        })
    }

    fn list_models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn name(&self) -> &str {
        "OpenAI"
    }
}

// Anthropic provider, raw HTTP.
pub struct AnthropicProvider {
    api_key: String,
    client: reqwest::Client,
    models: Vec<String>,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            models: vec![
                "claude-3-5-sonnet-20241022".to_string(),
                "claude-3-5-haiku-20241022".to_string(),
            ],
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        model: Option<String>,
    ) -> Result<ChatResponse, LlmError> {
        let start = Instant::now();
        let model_name = model.unwrap_or_else(|| "claude-3-5-haiku-20241022".to_string());

        // Anthropic keeps the system prompt out of the message list.
        let system: Vec<&ChatMessage> = messages.iter().filter(|m| m.role == "system").collect();
        let system_prompt = system
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let formatted: Vec<_> = messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| json!({"role": m.role, "content": m.content}))
            .collect();

        let mut body = json!({
            "model": model_name,
            "messages": formatted,
            "max_tokens": 4096,
        });
        if !system_prompt.is_empty() {
            body["system"] = json!(system_prompt);
        }

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited(format!("anthropic returned {}", status)));
        }
        if status.is_server_error() {
            return Err(LlmError::Unavailable(format!("anthropic returned {}", status)));
        }
        if !status.is_success() {
            return Err(LlmError::BadOutput(format!("anthropic returned {}", status)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::BadOutput(e.to_string()))?;

        let content = json["content"][0]["text"]
            .as_str()
            .unwrap_or("")
            .to_string();
        let input_tokens = json["usage"]["input_tokens"].as_u64().map(|t| t as u32);
        let output_tokens = json["usage"]["output_tokens"].as_u64().map(|t| t as u32);

        Ok(ChatResponse {
            content,
            provider: "anthropic".to_string(),
            model: model_name,
            input_tokens,
            output_tokens,
            duration_ms: start.elapsed().as_millis() as u32,
        })
    }

    fn list_models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn name(&self) -> &str {
        "Anthropic"
    }
}
