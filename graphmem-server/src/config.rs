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

//! Server configuration.
//!
//! Loaded with priority file > env > defaults and threaded explicitly
//! through the orchestrator and search engine; there are no process-wide
//! configuration singletons.

use anyhow::Result;
use graphmem_core::LabelSchema;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub graph_store: GraphStoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Deployment-declared custom entity labels, merged over the built-in
    /// ontology at startup.
    #[serde(default)]
    pub ontology: Vec<LabelSchema>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// HTTP API listen address.
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Enable CORS (development default).
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphStoreConfig {
    /// Graph database URL. Empty selects the in-memory driver.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider id: "openai", "anthropic", or "scripted" in tests.
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Extraction model.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Embedding model.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimensionality; must match the embedding provider.
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,

    /// OpenAI-compatible API key.
    pub openai_api_key: Option<String>,

    /// Anthropic API key.
    pub anthropic_api_key: Option<String>,

    /// Override base URL for OpenAI-compatible providers.
    pub provider_base_url: Option<String>,

    /// Global LLM/embedding call parallelism (the shared semaphore S).
    #[serde(default = "default_llm_semaphore")]
    pub semaphore: usize,

    /// Retry schedule for rate-limited/unavailable providers.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_retry_cap_ms")]
    pub retry_cap_ms: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Cross-group concurrency cap (the inflight bound N).
    #[serde(default = "default_max_inflight")]
    pub max_inflight_episodes: usize,

    /// Minimum gap between dispatches within a group.
    #[serde(default)]
    pub episode_spacing_ms: u64,

    /// Group used when a caller omits one.
    #[serde(default = "default_group_id")]
    pub default_group_id: String,
}

fn default_http_addr() -> String {
    "127.0.0.1:47300".to_string()
}

fn default_enable_cors() -> bool {
    true
}

fn default_llm_provider() -> String {
    "openai".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_vector_dim() -> usize {
    1536
}

fn default_llm_semaphore() -> usize {
    10
}

fn default_retry_base_ms() -> u64 {
    2_000
}

fn default_retry_cap_ms() -> u64 {
    120_000
}

fn default_retry_max_attempts() -> u32 {
    5
}

fn default_max_inflight() -> usize {
    10
}

fn default_group_id() -> String {
    "default".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            enable_cors: default_enable_cors(),
        }
    }
}

impl Default for GraphStoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            user: String::new(),
            password: String::new(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            embedding_model: default_embedding_model(),
            vector_dim: default_vector_dim(),
            openai_api_key: None,
            anthropic_api_key: None,
            provider_base_url: None,
            semaphore: default_llm_semaphore(),
            retry_base_ms: default_retry_base_ms(),
            retry_cap_ms: default_retry_cap_ms(),
            retry_max_attempts: default_retry_max_attempts(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_inflight_episodes: default_max_inflight(),
            episode_spacing_ms: 0,
            default_group_id: default_group_id(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    ///
    /// Supported variables:
    /// - GRAPHMEM_HTTP_ADDR, GRAPHMEM_ENABLE_CORS
    /// - GRAPHMEM_GRAPH_STORE_URL, GRAPHMEM_GRAPH_STORE_USER, GRAPHMEM_GRAPH_STORE_PASSWORD
    /// - GRAPHMEM_LLM_PROVIDER, GRAPHMEM_LLM_MODEL, GRAPHMEM_EMBEDDING_MODEL
    /// - GRAPHMEM_VECTOR_DIM, GRAPHMEM_LLM_SEMAPHORE
    /// - GRAPHMEM_LLM_RETRY_BASE_MS, GRAPHMEM_LLM_RETRY_CAP_MS, GRAPHMEM_LLM_RETRY_MAX_ATTEMPTS
    /// - GRAPHMEM_MAX_INFLIGHT_EPISODES, GRAPHMEM_EPISODE_SPACING_MS, GRAPHMEM_DEFAULT_GROUP_ID
    /// - OPENAI_API_KEY, ANTHROPIC_API_KEY, GRAPHMEM_PROVIDER_BASE_URL
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("GRAPHMEM_HTTP_ADDR") {
            config.http.listen_addr = addr;
        }
        if let Ok(cors) = std::env::var("GRAPHMEM_ENABLE_CORS") {
            config.http.enable_cors = cors.parse().unwrap_or(true);
        }

        if let Ok(url) = std::env::var("GRAPHMEM_GRAPH_STORE_URL") {
            config.graph_store.url = url;
        }
        if let Ok(user) = std::env::var("GRAPHMEM_GRAPH_STORE_USER") {
            config.graph_store.user = user;
        }
        if let Ok(password) = std::env::var("GRAPHMEM_GRAPH_STORE_PASSWORD") {
            config.graph_store.password = password;
        }

        if let Ok(provider) = std::env::var("GRAPHMEM_LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(model) = std::env::var("GRAPHMEM_LLM_MODEL") {
            config.llm.model = model;
        }
        if let Ok(model) = std::env::var("GRAPHMEM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(dim) = std::env::var("GRAPHMEM_VECTOR_DIM") {
            if let Ok(val) = dim.parse() {
                config.llm.vector_dim = val;
            }
        }
        if let Ok(s) = std::env::var("GRAPHMEM_LLM_SEMAPHORE") {
            if let Ok(val) = s.parse() {
                config.llm.semaphore = val;
            }
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.llm.openai_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            config.llm.anthropic_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("GRAPHMEM_PROVIDER_BASE_URL") {
            config.llm.provider_base_url = Some(url);
        }
        if let Ok(ms) = std::env::var("GRAPHMEM_LLM_RETRY_BASE_MS") {
            if let Ok(val) = ms.parse() {
                config.llm.retry_base_ms = val;
            }
        }
        if let Ok(ms) = std::env::var("GRAPHMEM_LLM_RETRY_CAP_MS") {
            if let Ok(val) = ms.parse() {
                config.llm.retry_cap_ms = val;
            }
        }
        if let Ok(attempts) = std::env::var("GRAPHMEM_LLM_RETRY_MAX_ATTEMPTS") {
            if let Ok(val) = attempts.parse() {
                config.llm.retry_max_attempts = val;
            }
        }

        if let Ok(n) = std::env::var("GRAPHMEM_MAX_INFLIGHT_EPISODES") {
            if let Ok(val) = n.parse() {
                config.ingest.max_inflight_episodes = val;
            }
        }
        if let Ok(ms) = std::env::var("GRAPHMEM_EPISODE_SPACING_MS") {
            if let Ok(val) = ms.parse() {
                config.ingest.episode_spacing_ms = val;
            }
        }
        if let Ok(group) = std::env::var("GRAPHMEM_DEFAULT_GROUP_ID") {
            config.ingest.default_group_id = group;
        }

        config
    }

    /// Load configuration with priority: file > env > defaults.
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!("loading configuration from {:?}", path);
                Self::from_file(&path)?
            }
            Some(path) => {
                tracing::warn!("config file {:?} not found, using env/defaults", path);
                Self::default()
            }
            None => Self::default(),
        };

        // Override with environment variables
        Ok(Self::merge_with_env(config))
    }

    /// Merge config with environment variables (env takes priority).
    /// A file typically carries the deployment shape; secrets and host
    /// overrides arrive through the environment.
    fn merge_with_env(mut config: Self) -> Self {
        let env_config = Self::from_env();

        // Only override if the env var was explicitly set.
        if std::env::var("GRAPHMEM_HTTP_ADDR").is_ok() {
            config.http.listen_addr = env_config.http.listen_addr;
        }
        if std::env::var("GRAPHMEM_ENABLE_CORS").is_ok() {
            config.http.enable_cors = env_config.http.enable_cors;
        }
        if std::env::var("GRAPHMEM_GRAPH_STORE_URL").is_ok() {
            config.graph_store.url = env_config.graph_store.url;
        }
        if std::env::var("GRAPHMEM_GRAPH_STORE_USER").is_ok() {
            config.graph_store.user = env_config.graph_store.user;
        }
        if std::env::var("GRAPHMEM_GRAPH_STORE_PASSWORD").is_ok() {
            config.graph_store.password = env_config.graph_store.password;
        }
        if std::env::var("GRAPHMEM_LLM_PROVIDER").is_ok() {
            config.llm.provider = env_config.llm.provider;
        }
        if std::env::var("GRAPHMEM_LLM_MODEL").is_ok() {
            config.llm.model = env_config.llm.model;
        }
        if std::env::var("GRAPHMEM_EMBEDDING_MODEL").is_ok() {
            config.llm.embedding_model = env_config.llm.embedding_model;
        }
        if std::env::var("GRAPHMEM_VECTOR_DIM").is_ok() {
            config.llm.vector_dim = env_config.llm.vector_dim;
        }
        if std::env::var("GRAPHMEM_LLM_SEMAPHORE").is_ok() {
            config.llm.semaphore = env_config.llm.semaphore;
        }
        if std::env::var("OPENAI_API_KEY").is_ok() {
            config.llm.openai_api_key = env_config.llm.openai_api_key;
        }
        if std::env::var("ANTHROPIC_API_KEY").is_ok() {
            config.llm.anthropic_api_key = env_config.llm.anthropic_api_key;
        }
        if std::env::var("GRAPHMEM_PROVIDER_BASE_URL").is_ok() {
            config.llm.provider_base_url = env_config.llm.provider_base_url;
        }
        if std::env::var("GRAPHMEM_LLM_RETRY_BASE_MS").is_ok() {
            config.llm.retry_base_ms = env_config.llm.retry_base_ms;
        }
        if std::env::var("GRAPHMEM_LLM_RETRY_CAP_MS").is_ok() {
            config.llm.retry_cap_ms = env_config.llm.retry_cap_ms;
        }
        if std::env::var("GRAPHMEM_LLM_RETRY_MAX_ATTEMPTS").is_ok() {
            config.llm.retry_max_attempts = env_config.llm.retry_max_attempts;
        }
        if std::env::var("GRAPHMEM_MAX_INFLIGHT_EPISODES").is_ok() {
            config.ingest.max_inflight_episodes = env_config.ingest.max_inflight_episodes;
        }
        if std::env::var("GRAPHMEM_EPISODE_SPACING_MS").is_ok() {
            config.ingest.episode_spacing_ms = env_config.ingest.episode_spacing_ms;
        }
        if std::env::var("GRAPHMEM_DEFAULT_GROUP_ID").is_ok() {
            config.ingest.default_group_id = env_config.ingest.default_group_id;
        }

        config
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.http.listen_addr.parse()?)
    }

    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        if self.ingest.max_inflight_episodes == 0 {
            anyhow::bail!("max_inflight_episodes must be at least 1");
        }
        if self.llm.semaphore == 0 {
            anyhow::bail!("llm semaphore must be at least 1");
        }
        if self.llm.vector_dim == 0 {
            anyhow::bail!("vector_dim must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.ingest.max_inflight_episodes, 10);
        assert_eq!(config.llm.semaphore, 10);
        assert_eq!(config.llm.retry_base_ms, 2_000);
        assert_eq!(config.llm.retry_cap_ms, 120_000);
        assert_eq!(config.llm.retry_max_attempts, 5);
        assert_eq!(config.ingest.default_group_id, "default");
    }

    #[test]
    fn toml_round_trip_with_ontology() {
        let toml_src = r#"
            [http]
            listen_addr = "0.0.0.0:9000"

            [llm]
            provider = "anthropic"
            semaphore = 4

            [ingest]
            max_inflight_episodes = 3
            episode_spacing_ms = 250

            [[ontology]]
            name = "Service"
            description = "A deployed software service"

            [[ontology.attributes]]
            name = "tier"
            kind = "string"
        "#;
        let config: ServerConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.http.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.semaphore, 4);
        assert_eq!(config.ingest.max_inflight_episodes, 3);
        assert_eq!(config.ontology.len(), 1);
        assert_eq!(config.ontology[0].name, "Service");
        config.validate().unwrap();
    }

    #[test]
    fn zero_bounds_rejected() {
        let mut config = ServerConfig::default();
        config.ingest.max_inflight_episodes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overlays_file_on_load() {
        let path = std::env::temp_dir().join("graphmem-config-merge-test.toml");
        std::fs::write(
            &path,
            r#"
            [http]
            listen_addr = "0.0.0.0:9100"

            [llm]
            semaphore = 7
            model = "gpt-4o"
        "#,
        )
        .unwrap();

        std::env::set_var("GRAPHMEM_LLM_SEMAPHORE", "3");
        std::env::set_var("OPENAI_API_KEY", "sk-test-merge");

        let config = ServerConfig::load(Some(path.clone())).unwrap();

        std::env::remove_var("GRAPHMEM_LLM_SEMAPHORE");
        std::env::remove_var("OPENAI_API_KEY");
        std::fs::remove_file(&path).ok();

        // Env wins over the file for keys it sets...
        assert_eq!(config.llm.semaphore, 3);
        assert_eq!(config.llm.openai_api_key.as_deref(), Some("sk-test-merge"));
        // ...while file-only keys survive the merge.
        assert_eq!(config.http.listen_addr, "0.0.0.0:9100");
        assert_eq!(config.llm.model, "gpt-4o");
    }

    #[test]
    fn missing_file_falls_back_to_env_defaults() {
        std::env::set_var("GRAPHMEM_LLM_RETRY_MAX_ATTEMPTS", "2");

        let config =
            ServerConfig::load(Some(PathBuf::from("/nonexistent/graphmem.toml"))).unwrap();

        std::env::remove_var("GRAPHMEM_LLM_RETRY_MAX_ATTEMPTS");

        assert_eq!(config.llm.retry_max_attempts, 2);
        assert_eq!(config.ingest.max_inflight_episodes, 10);
    }
}
