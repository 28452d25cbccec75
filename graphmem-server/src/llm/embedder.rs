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

//! Embedding providers.
//!
//! `OpenAiEmbedder` talks to an OpenAI-compatible embeddings endpoint;
//! deployments without credentials fall back to the deterministic
//! `HashEmbedder` from core. `GatedEmbedder` wraps any client with the
//! shared provider semaphore and the per-call timeout, so callers never
//! hold a permit across unrelated work.

use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client as OpenAIClient};
use async_trait::async_trait;
use graphmem_core::{EmbeddingClient, GraphMemError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

/// Default per-call embedding timeout.
pub const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI-compatible embeddings client.
pub struct OpenAiEmbedder {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, base_url: Option<String>, model: String, dimension: usize) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = base_url {
            config = config.with_api_base(base);
        }
        Self {
            client: OpenAIClient::with_config(config),
            model,
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let batch = self.embed_batch(&[text.to_string()]).await?;
        batch
            .into_iter()
            .next()
            .ok_or_else(|| GraphMemError::Unavailable("embedding response was empty".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(texts.to_vec())
            .build()
            .map_err(|e| GraphMemError::Unavailable(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| GraphMemError::Unavailable(e.to_string()))?;

        let mut out: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();
        for embedding in &mut out {
            if embedding.len() != self.dimension {
                warn!(
                    got = embedding.len(),
                    want = self.dimension,
                    "embedding dimension mismatch; check vector_dim against the provider"
                );
                embedding.resize(self.dimension, 0.0);
            }
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Wraps an embedding client with the shared provider semaphore and a
/// per-call timeout. Timeouts classify as unavailable, which retries on
/// the provider schedule.
pub struct GatedEmbedder {
    inner: Arc<dyn EmbeddingClient>,
    gate: Arc<Semaphore>,
    timeout: Duration,
}

impl GatedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingClient>, gate: Arc<Semaphore>) -> Self {
        Self {
            inner,
            gate,
            timeout: EMBED_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl EmbeddingClient for GatedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| GraphMemError::Internal("provider gate closed".into()))?;
        tokio::time::timeout(self.timeout, self.inner.embed(text))
            .await
            .map_err(|_| GraphMemError::Unavailable("embedding call timed out".into()))?
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| GraphMemError::Internal("provider gate closed".into()))?;
        tokio::time::timeout(self.timeout, self.inner.embed_batch(texts))
            .await
            .map_err(|_| GraphMemError::Unavailable("embedding call timed out".into()))?
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphmem_core::HashEmbedder;

    #[tokio::test]
    async fn gated_embedder_delegates() {
        let inner = Arc::new(HashEmbedder::new(16));
        let gated = GatedEmbedder::new(inner.clone(), Arc::new(Semaphore::new(1)));
        assert_eq!(gated.dimension(), 16);
        let a = gated.embed("hello").await.unwrap();
        let b = inner.embed("hello").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn gated_embedder_times_out() {
        struct SlowEmbedder;
        #[async_trait]
        impl EmbeddingClient for SlowEmbedder {
            async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(vec![0.0])
            }
            fn dimension(&self) -> usize {
                1
            }
        }

        let gated = GatedEmbedder::new(Arc::new(SlowEmbedder), Arc::new(Semaphore::new(1)))
            .with_timeout(Duration::from_millis(20));
        let err = gated.embed("x").await.unwrap_err();
        assert_eq!(err.kind(), "unavailable");
    }
}
