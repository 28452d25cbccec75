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

//! Graphmem Server
//!
//! The temporal knowledge-graph service: episode ingestion through the
//! per-group queue, LLM extraction and resolution, hybrid search, and the
//! mutation surface, wired behind an axum HTTP API.

pub mod api;
pub mod config;
pub mod ingestion;
pub mod llm;
pub mod mutation;
pub mod resolver;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use graphmem_core::{EmbeddingClient, HashEmbedder, Ontology};
use graphmem_query::SearchEngine;
use graphmem_store::{GraphStore, MemoryGraphStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::AppState;
use config::ServerConfig;
use graphmem_core::RetryPolicy;
use ingestion::{EpisodeQueue, Orchestrator, QueueConfig};
use llm::{ExtractionClient, GatedEmbedder, LlmProviderManager, OpenAiEmbedder};
use mutation::MutationService;

/// Assemble the application state from configuration.
pub fn build_state(config: ServerConfig) -> Result<AppState> {
    let config = Arc::new(config);

    let mut ontology = Ontology::builtin();
    for schema in &config.ontology {
        ontology.register(schema.clone());
    }
    let ontology = Arc::new(ontology);

    // The external graph database plugs in behind the GraphStore trait;
    // this build ships the in-memory reference driver.
    if !config.graph_store.url.is_empty() {
        tracing::warn!(
            url = %config.graph_store.url,
            "graph_store.url is set but no external driver is compiled in; using the in-memory driver"
        );
    }
    let store: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new());

    // The shared provider gate (S): every LLM and embedding call in the
    // process passes through it.
    let llm_gate = Arc::new(Semaphore::new(config.llm.semaphore));

    let manager = Arc::new(LlmProviderManager::from_config(&config.llm));
    let extractor = Arc::new(ExtractionClient::new(
        manager,
        config.llm.provider.clone(),
        Some(config.llm.model.clone()),
        ontology,
        llm_gate.clone(),
    ));

    let base_embedder: Arc<dyn EmbeddingClient> = match &config.llm.openai_api_key {
        Some(key) => Arc::new(OpenAiEmbedder::new(
            key.clone(),
            config.llm.provider_base_url.clone(),
            config.llm.embedding_model.clone(),
            config.llm.vector_dim,
        )),
        None => {
            tracing::warn!("no embedding credentials; using the deterministic local embedder");
            Arc::new(HashEmbedder::new(config.llm.vector_dim))
        }
    };
    let embedder: Arc<dyn EmbeddingClient> =
        Arc::new(GatedEmbedder::new(base_embedder, llm_gate.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        extractor,
        embedder.clone(),
    ));

    let llm_retry = RetryPolicy::llm()
        .with_initial_delay(Duration::from_millis(config.llm.retry_base_ms))
        .with_max_delay(Duration::from_millis(config.llm.retry_cap_ms))
        .with_max_attempts(config.llm.retry_max_attempts);
    let queue = Arc::new(EpisodeQueue::new(
        QueueConfig {
            max_inflight: config.ingest.max_inflight_episodes,
            spacing: Duration::from_millis(config.ingest.episode_spacing_ms),
            llm_retry,
            store_retry: RetryPolicy::graph_store(),
        },
        store.clone(),
        orchestrator,
    ));

    let search = Arc::new(SearchEngine::new(
        store.clone(),
        embedder.clone(),
        llm_gate,
    )?);
    let mutations = Arc::new(MutationService::new(store.clone(), embedder, queue.clone()));

    Ok(AppState {
        store,
        search,
        queue,
        mutations,
        config,
    })
}

/// Build the HTTP router.
pub fn build_router(state: AppState) -> Router {
    let enable_cors = state.config.http.enable_cors;
    let mut router = Router::new()
        .route("/api/v1/health", get(api::health_check))
        .route(
            "/api/v1/episodes",
            post(api::ingest_episode).get(api::list_episodes),
        )
        .route("/api/v1/episodes/:id", axum::routing::delete(api::delete_episode))
        .route("/api/v1/episodes/:id/status", get(api::episode_status))
        .route("/api/v1/search", post(api::search))
        .route(
            "/api/v1/edges/:id",
            get(api::get_edge)
                .post(api::update_edge)
                .delete(api::delete_edge),
        )
        .route("/api/v1/citations/:kind/:id", get(api::citation_chain))
        .route("/api/v1/groups/clear", post(api::clear_groups))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }
    router
}

/// Run the server until shutdown.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "graphmem_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting graphmem server");
    config.validate()?;
    let addr = config.socket_addr()?;

    let state = build_state(config)?;
    state.store.bootstrap().await?;

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}
