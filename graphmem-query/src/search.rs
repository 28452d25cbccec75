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

//! Hybrid search over edges, nodes, and episodes.
//!
//! Edge and node search fuse a vector candidate list and a lexical
//! candidate list with reciprocal rank fusion; ties break by vector score,
//! then recency. An optional center node applies a graph-proximity
//! re-rank: each candidate's score is scaled by `1/(1 + hops)` and
//! candidates beyond three hops are dropped. Episode search is lexical
//! only, with a most-recent fallback for empty queries.
//!
//! Search is read-only and runs outside the episode queue; each underlying
//! store query sees a consistent snapshot, and no repeatable read is
//! promised across queries within one request.

use crate::citations::{Citation, CitationService, TaggedCitation};
use crate::fusion::reciprocal_rank_fusion;
use graphmem_core::{EmbeddingClient, Entity, Episode, GraphMemError, RelationEdge, Result};
use graphmem_store::GraphStore;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Hop radius for center-node proximity; candidates further out are dropped.
const MAX_CENTER_HOPS: usize = 3;
/// Hard ceiling on result counts, matching the API contract.
const MAX_RESULTS_CEILING: usize = 100;

const QUERY_CACHE_SIZE: u64 = 1000;
const QUERY_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Deserialize)]
pub struct EdgeQuery {
    pub query: String,
    pub max_results: usize,
    #[serde(default)]
    pub group_ids: Vec<String>,
    #[serde(default)]
    pub center_node_id: Option<Uuid>,
    /// Include soft-updated (expired) edge versions.
    #[serde(default)]
    pub include_historical: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeQuery {
    pub query: String,
    pub max_results: usize,
    #[serde(default)]
    pub group_ids: Vec<String>,
    /// Label filter, applied after fusion.
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EpisodeQuery {
    pub query: String,
    pub max_results: usize,
    #[serde(default)]
    pub group_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeHit {
    #[serde(flatten)]
    pub edge: RelationEdge,
    pub score: f32,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeHit {
    #[serde(flatten)]
    pub entity: Entity,
    pub score: f32,
    pub citations: Vec<TaggedCitation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpisodeHit {
    #[serde(flatten)]
    pub episode: Episode,
    pub score: f32,
}

/// The hybrid search engine.
pub struct SearchEngine {
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn EmbeddingClient>,
    citations: CitationService,
    /// Shared provider gate; embedding calls for queries count against the
    /// same global parallelism budget as ingestion.
    llm_gate: Arc<Semaphore>,
    query_cache: Cache<String, Vec<f32>>,
}

impl SearchEngine {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn EmbeddingClient>,
        llm_gate: Arc<Semaphore>,
    ) -> Result<Self> {
        let citations = CitationService::new(store.clone())?;
        let query_cache = Cache::builder()
            .max_capacity(QUERY_CACHE_SIZE)
            .time_to_live(QUERY_CACHE_TTL)
            .build();
        Ok(Self {
            store,
            embedder,
            citations,
            llm_gate,
            query_cache,
        })
    }

    pub fn citation_service(&self) -> &CitationService {
        &self.citations
    }

    async fn query_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let key = text.trim().to_lowercase();
        if let Some(cached) = self.query_cache.get(&key) {
            return Ok(cached);
        }
        let _permit = self
            .llm_gate
            .acquire()
            .await
            .map_err(|_| GraphMemError::Internal("provider gate closed".into()))?;
        let embedding = self.embedder.embed(text).await?;
        self.query_cache.insert(key, embedding.clone());
        Ok(embedding)
    }

    /// Fact search over relation edges.
    pub async fn search_edges(&self, query: &EdgeQuery) -> Result<Vec<EdgeHit>> {
        let limit = query.max_results.min(MAX_RESULTS_CEILING);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let fetch = 2 * limit;

        let query_embedding = self.query_embedding(&query.query).await?;
        let vector_list = self
            .store
            .edge_knn(&query.group_ids, &query_embedding, fetch)
            .await?;
        let lexical_list = self
            .store
            .edge_text_search(&query.group_ids, &query.query, fetch)
            .await?;

        let mut by_id: HashMap<Uuid, RelationEdge> = HashMap::new();
        let mut vector_scores: HashMap<Uuid, f32> = HashMap::new();
        for (edge, score) in &vector_list {
            vector_scores.insert(edge.id, *score);
            by_id.entry(edge.id).or_insert_with(|| edge.clone());
        }
        for (edge, _) in &lexical_list {
            by_id.entry(edge.id).or_insert_with(|| edge.clone());
        }

        let lists = [
            vector_list.iter().map(|(e, _)| e.id).collect::<Vec<_>>(),
            lexical_list.iter().map(|(e, _)| e.id).collect::<Vec<_>>(),
        ];
        let fused = reciprocal_rank_fusion(&lists);

        let mut ranked: Vec<(Uuid, f32)> = fused.into_iter().collect();

        // Proximity re-rank around the center node, when requested. An
        // unknown center yields an empty neighborhood and therefore empty
        // results, not an error.
        if let Some(center) = query.center_node_id {
            let neighborhood = self.store.neighborhood(center, MAX_CENTER_HOPS).await?;
            ranked = ranked
                .into_iter()
                .filter_map(|(id, score)| {
                    let edge = by_id.get(&id)?;
                    let hops = neighborhood.edge_distance(edge)?;
                    Some((id, score / (1.0 + hops as f32)))
                })
                .collect();
        }

        self.sort_ranked(&mut ranked, &vector_scores, &by_id);

        let mut hits = Vec::with_capacity(limit);
        for (id, score) in ranked {
            if hits.len() >= limit {
                break;
            }
            let Some(edge) = by_id.get(&id) else { continue };
            if !query.include_historical && edge.expired_at.is_some() {
                continue;
            }
            let citations = self.citations.edge_citations(edge).await?;
            hits.push(EdgeHit {
                edge: edge.clone(),
                score,
                citations,
            });
        }
        Ok(hits)
    }

    /// Entity search.
    pub async fn search_nodes(&self, query: &NodeQuery) -> Result<Vec<NodeHit>> {
        let limit = query.max_results.min(MAX_RESULTS_CEILING);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let fetch = 2 * limit;

        let query_embedding = self.query_embedding(&query.query).await?;
        let vector_list = self
            .store
            .entity_knn(&query.group_ids, &query_embedding, fetch)
            .await?;
        let lexical_list = self
            .store
            .entity_text_search(&query.group_ids, &query.query, fetch)
            .await?;

        let mut by_id: HashMap<Uuid, Entity> = HashMap::new();
        let mut vector_scores: HashMap<Uuid, f32> = HashMap::new();
        for (entity, score) in &vector_list {
            vector_scores.insert(entity.id, *score);
            by_id.entry(entity.id).or_insert_with(|| entity.clone());
        }
        for (entity, _) in &lexical_list {
            by_id.entry(entity.id).or_insert_with(|| entity.clone());
        }

        let lists = [
            vector_list.iter().map(|(e, _)| e.id).collect::<Vec<_>>(),
            lexical_list.iter().map(|(e, _)| e.id).collect::<Vec<_>>(),
        ];
        let mut ranked: Vec<(Uuid, f32)> = reciprocal_rank_fusion(&lists).into_iter().collect();

        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let va = vector_scores.get(&a.0).copied().unwrap_or(0.0);
                    let vb = vector_scores.get(&b.0).copied().unwrap_or(0.0);
                    vb.partial_cmp(&va).unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| {
                    let ca = by_id.get(&a.0).map(|e| e.created_at);
                    let cb = by_id.get(&b.0).map(|e| e.created_at);
                    cb.cmp(&ca)
                })
        });

        let mut hits = Vec::with_capacity(limit);
        for (id, score) in ranked {
            if hits.len() >= limit {
                break;
            }
            let Some(entity) = by_id.get(&id) else { continue };
            if !query.labels.is_empty()
                && !entity.labels.iter().any(|l| query.labels.contains(l))
            {
                continue;
            }
            let citations = self.citations.node_citations(entity.id).await?;
            hits.push(NodeHit {
                entity: entity.clone(),
                score,
                citations,
            });
        }
        Ok(hits)
    }

    /// Raw episode search: lexical only. An empty query returns the most
    /// recent episodes by `ingested_at` descending.
    pub async fn search_episodes(&self, query: &EpisodeQuery) -> Result<Vec<EpisodeHit>> {
        let limit = query.max_results.min(MAX_RESULTS_CEILING);
        if limit == 0 {
            return Ok(Vec::new());
        }

        if query.query.trim().is_empty() {
            let episodes = self.store.recent_episodes(&query.group_ids, limit).await?;
            return Ok(episodes
                .into_iter()
                .map(|episode| EpisodeHit { episode, score: 0.0 })
                .collect());
        }

        let scored = self
            .store
            .episode_text_search(&query.group_ids, &query.query, limit)
            .await?;
        Ok(scored
            .into_iter()
            .map(|(episode, score)| EpisodeHit { episode, score })
            .collect())
    }

    fn sort_ranked(
        &self,
        ranked: &mut [(Uuid, f32)],
        vector_scores: &HashMap<Uuid, f32>,
        by_id: &HashMap<Uuid, RelationEdge>,
    ) {
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let va = vector_scores.get(&a.0).copied().unwrap_or(0.0);
                    let vb = vector_scores.get(&b.0).copied().unwrap_or(0.0);
                    vb.partial_cmp(&va).unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| {
                    let ca = by_id.get(&a.0).map(|e| e.created_at);
                    let cb = by_id.get(&b.0).map(|e| e.created_at);
                    cb.cmp(&ca)
                })
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use graphmem_core::{EpisodeKind, HashEmbedder};
    use graphmem_store::MemoryGraphStore;

    struct Fixture {
        store: Arc<MemoryGraphStore>,
        engine: SearchEngine,
        embedder: HashEmbedder,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryGraphStore::new());
        let embedder = HashEmbedder::new(64);
        let engine = SearchEngine::new(
            store.clone(),
            Arc::new(embedder.clone()),
            Arc::new(Semaphore::new(4)),
        )
        .unwrap();
        Fixture {
            store,
            engine,
            embedder,
        }
    }

    async fn seed_entity(f: &Fixture, name: &str, label: &str) -> Entity {
        let mut e = Entity::new(name, label, "g");
        e.embedding = f.embedder.embed(name).await.unwrap();
        f.store.upsert_entity(&e).await.unwrap();
        e
    }

    async fn seed_edge(f: &Fixture, src: &Entity, dst: &Entity, relation: &str, fact: &str) -> RelationEdge {
        let episode = Episode::new(format!("ep-{}", fact), fact, EpisodeKind::Text, "g");
        f.store.upsert_episode(&episode).await.unwrap();
        let mut edge = RelationEdge::new(src.id, dst.id, relation, fact, "g");
        edge.fact_embedding = f.embedder.embed(fact).await.unwrap();
        edge.cite_episode(episode.id);
        f.store.upsert_edge(&edge).await.unwrap();
        edge
    }

    #[tokio::test]
    async fn edge_search_surfaces_lexical_match_with_citations() {
        let f = fixture();
        let alice = seed_entity(&f, "Alice", "Person").await;
        let acme = seed_entity(&f, "Acme", "Organization").await;
        let bob = seed_entity(&f, "Bob", "Person").await;

        seed_edge(&f, &alice, &acme, "WORKS_AT", "Alice works at Acme").await;
        seed_edge(&f, &bob, &acme, "FOUNDED", "Bob founded Acme in 1999").await;

        // Querying the fact verbatim pins both the lexical and the vector
        // list to the same leader.
        let hits = f
            .engine
            .search_edges(&EdgeQuery {
                query: "Alice works at Acme".into(),
                max_results: 10,
                group_ids: vec!["g".into()],
                center_node_id: None,
                include_historical: false,
            })
            .await
            .unwrap();

        assert!(!hits.is_empty());
        assert_eq!(hits[0].edge.relation, "WORKS_AT");
        assert_eq!(hits[0].citations.len(), 1);
    }

    #[tokio::test]
    async fn expired_edges_hidden_unless_historical() {
        let f = fixture();
        let alice = seed_entity(&f, "Alice", "Person").await;
        let acme = seed_entity(&f, "Acme", "Organization").await;

        let mut old = seed_edge(&f, &alice, &acme, "WORKS_AT", "Alice works at Acme as engineer").await;
        old.expired_at = Some(Utc::now());
        f.store.upsert_edge(&old).await.unwrap();

        let mut new = RelationEdge::new(alice.id, acme.id, "WORKS_AT", "Alice works at Acme as manager", "g");
        new.fact_embedding = f.embedder.embed(&new.fact).await.unwrap();
        new.created_at = old.created_at + chrono::Duration::seconds(5);
        new.original_fact = Some(old.fact.clone());
        new.episode_ids = old.episode_ids.clone();
        f.store.upsert_edge(&new).await.unwrap();

        let query = EdgeQuery {
            query: "Alice works at Acme".into(),
            max_results: 10,
            group_ids: vec!["g".into()],
            center_node_id: None,
            include_historical: false,
        };

        let current = f.engine.search_edges(&query).await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].edge.id, new.id);

        let historical = f
            .engine
            .search_edges(&EdgeQuery {
                include_historical: true,
                ..query
            })
            .await
            .unwrap();
        assert_eq!(historical.len(), 2);
        let ids: Vec<Uuid> = historical.iter().map(|h| h.edge.id).collect();
        assert!(ids.contains(&old.id) && ids.contains(&new.id));
        let old_hit = historical.iter().find(|h| h.edge.id == old.id).unwrap();
        assert!(old_hit.edge.expired_at.is_some());
    }

    #[tokio::test]
    async fn center_rerank_drops_distant_and_unknown_centers_yield_empty() {
        let f = fixture();
        let alice = seed_entity(&f, "Alice", "Person").await;
        let acme = seed_entity(&f, "Acme", "Organization").await;
        let mars = seed_entity(&f, "Mars Base", "Location").await;
        let crater = seed_entity(&f, "Crater Lab", "Location").await;

        seed_edge(&f, &alice, &acme, "WORKS_AT", "Alice works at Acme").await;
        // Disconnected component mentioning the same word "works".
        seed_edge(&f, &mars, &crater, "HOSTS", "Mars Base works with Crater Lab").await;

        let hits = f
            .engine
            .search_edges(&EdgeQuery {
                query: "works".into(),
                max_results: 10,
                group_ids: vec!["g".into()],
                center_node_id: Some(alice.id),
                include_historical: false,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1, "disconnected edge must be dropped");
        assert_eq!(hits[0].edge.relation, "WORKS_AT");

        let empty = f
            .engine
            .search_edges(&EdgeQuery {
                query: "works".into(),
                max_results: 10,
                group_ids: vec!["g".into()],
                center_node_id: Some(Uuid::new_v4()),
                include_historical: false,
            })
            .await
            .unwrap();
        assert!(empty.is_empty(), "unknown center is empty, not an error");
    }

    #[tokio::test]
    async fn zero_max_results_is_empty_success() {
        let f = fixture();
        let hits = f
            .engine
            .search_edges(&EdgeQuery {
                query: "anything".into(),
                max_results: 0,
                group_ids: Vec::new(),
                center_node_id: None,
                include_historical: false,
            })
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn node_search_applies_label_filter_after_fusion() {
        let f = fixture();
        seed_entity(&f, "Acme Corp", "Organization").await;
        seed_entity(&f, "Acme Jones", "Person").await;

        let all = f
            .engine
            .search_nodes(&NodeQuery {
                query: "Acme".into(),
                max_results: 10,
                group_ids: vec!["g".into()],
                labels: Vec::new(),
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let orgs = f
            .engine
            .search_nodes(&NodeQuery {
                query: "Acme".into(),
                max_results: 10,
                group_ids: vec!["g".into()],
                labels: vec!["Organization".into()],
            })
            .await
            .unwrap();
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].entity.name, "Acme Corp");
    }

    #[tokio::test]
    async fn empty_episode_query_returns_most_recent() {
        let f = fixture();
        for i in 0..3 {
            let mut ep = Episode::new(format!("e{}", i), "content", EpisodeKind::Text, "g");
            ep.ingested_at = Utc::now() + chrono::Duration::seconds(i);
            f.store.upsert_episode(&ep).await.unwrap();
        }

        let hits = f
            .engine
            .search_episodes(&EpisodeQuery {
                query: "  ".into(),
                max_results: 2,
                group_ids: vec!["g".into()],
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].episode.name, "e2");
        assert_eq!(hits[1].episode.name, "e1");
    }
}
