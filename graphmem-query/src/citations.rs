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

//! Citation resolution: episode provenance for edges and nodes.
//!
//! Edge citations follow the edge's `episode_ids` in assertion order; node
//! citations come from mention edges, tagged with how each episode touched
//! the entity. A `source_url` embedded in the source description is parsed
//! back out here — the embedded string form is the wire format and readers
//! must keep accepting it.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use graphmem_core::{Episode, EpisodeKind, GraphMemError, Mention, MentionOp, RelationEdge, Result};
use graphmem_store::GraphStore;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

const SOURCE_URL_PATTERN: &str = r"source_url:\s*(https?://[^\s,]+)";

/// One episode backing a fact or entity.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub episode_id: Uuid,
    pub name: String,
    pub kind: EpisodeKind,
    pub source_description: String,
    pub ingested_at: DateTime<Utc>,
    pub source_url: Option<String>,
}

/// A citation tagged with how the episode touched the entity or edge.
#[derive(Debug, Clone, Serialize)]
pub struct TaggedCitation {
    #[serde(flatten)]
    pub citation: Citation,
    pub operation: MentionOp,
}

/// Resolves episode provenance for edges and nodes.
pub struct CitationService {
    store: Arc<dyn GraphStore>,
    url_re: Regex,
}

impl CitationService {
    pub fn new(store: Arc<dyn GraphStore>) -> Result<Self> {
        let url_re = Regex::new(SOURCE_URL_PATTERN)
            .map_err(|e| GraphMemError::Internal(format!("source_url pattern: {}", e)))?;
        Ok(Self { store, url_re })
    }

    /// First embedded `source_url:` in a source description, if any.
    pub fn extract_source_url(&self, source_description: &str) -> Option<String> {
        self.url_re
            .captures(source_description)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn citation_for(&self, episode: &Episode) -> Citation {
        Citation {
            episode_id: episode.id,
            name: episode.name.clone(),
            kind: episode.kind,
            source_description: episode.source_description.clone(),
            ingested_at: episode.ingested_at,
            source_url: self.extract_source_url(&episode.source_description),
        }
    }

    /// Citations for an edge: its `episode_ids`, in assertion order.
    /// Episodes that have since been deleted are skipped. The fetches fan
    /// out concurrently; `join_all` keeps the assertion order.
    pub async fn edge_citations(&self, edge: &RelationEdge) -> Result<Vec<Citation>> {
        let fetched = join_all(edge.episode_ids.iter().map(|id| self.store.episode(*id))).await;
        let mut out = Vec::with_capacity(edge.episode_ids.len());
        for episode in fetched {
            if let Some(episode) = episode? {
                out.push(self.citation_for(&episode));
            }
        }
        Ok(out)
    }

    /// Citations for an entity: its mentioning episodes, deduplicated,
    /// chronological by `ingested_at`, tagged with the recorded operation.
    pub async fn node_citations(&self, entity_id: Uuid) -> Result<Vec<TaggedCitation>> {
        let mentions = self.store.mentions_of_entity(entity_id).await?;
        let mut seen: HashSet<Uuid> = HashSet::new();
        let deduped: Vec<Mention> = mentions
            .into_iter()
            .filter(|m| seen.insert(m.episode_id))
            .collect();

        let fetched = join_all(deduped.iter().map(|m| self.store.episode(m.episode_id))).await;
        let mut out = Vec::new();
        for (mention, episode) in deduped.iter().zip(fetched) {
            if let Some(episode) = episode? {
                out.push(TaggedCitation {
                    citation: self.citation_for(&episode),
                    operation: mention.operation,
                });
            }
        }
        out.sort_by(|a, b| a.citation.ingested_at.cmp(&b.citation.ingested_at));
        Ok(out)
    }

    /// The citation chain of an edge: every supporting episode in
    /// chronological order. The first assertion is tagged `created`; the
    /// synthesis episode appended by a soft update is tagged `updated`;
    /// everything else is a reference.
    pub async fn edge_chain(&self, edge_id: Uuid, max_depth: usize) -> Result<Vec<TaggedCitation>> {
        let edge = self
            .store
            .edge(edge_id)
            .await?
            .ok_or_else(|| GraphMemError::NotFound(format!("edge {}", edge_id)))?;

        let last_idx = edge.episode_ids.len().saturating_sub(1);
        let mut out = Vec::new();
        for (idx, episode_id) in edge.episode_ids.iter().enumerate() {
            let Some(episode) = self.store.episode(*episode_id).await? else {
                continue;
            };
            let operation = if idx == 0 {
                MentionOp::Created
            } else if idx == last_idx && edge.original_fact.is_some() {
                MentionOp::Updated
            } else {
                MentionOp::Referenced
            };
            out.push(TaggedCitation {
                citation: self.citation_for(&episode),
                operation,
            });
        }
        out.sort_by(|a, b| a.citation.ingested_at.cmp(&b.citation.ingested_at));
        out.truncate(max_depth);
        Ok(out)
    }

    /// The citation chain of a node.
    pub async fn node_chain(&self, entity_id: Uuid, max_depth: usize) -> Result<Vec<TaggedCitation>> {
        if self.store.entity(entity_id).await?.is_none() {
            return Err(GraphMemError::NotFound(format!("entity {}", entity_id)));
        }
        let mut chain = self.node_citations(entity_id).await?;
        chain.truncate(max_depth);
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphmem_core::{Entity, Mention};
    use graphmem_store::MemoryGraphStore;

    fn service() -> (Arc<MemoryGraphStore>, CitationService) {
        let store = Arc::new(MemoryGraphStore::new());
        let svc = CitationService::new(store.clone()).unwrap();
        (store, svc)
    }

    #[tokio::test]
    async fn source_url_extraction() {
        let (_, svc) = service();
        assert_eq!(
            svc.extract_source_url("slack thread, source_url: https://x.test/p/1"),
            Some("https://x.test/p/1".to_string())
        );
        assert_eq!(
            svc.extract_source_url("source_url: http://a.test/b, more text"),
            Some("http://a.test/b".to_string())
        );
        assert_eq!(svc.extract_source_url("no url here"), None);
        assert_eq!(svc.extract_source_url("source_url: ftp://nope"), None);
    }

    #[tokio::test]
    async fn edge_citations_follow_assertion_order() {
        let (store, svc) = service();
        let ep1 = Episode::new("first", "b", EpisodeKind::Text, "g")
            .with_source_description("news, source_url: https://n.test/1");
        let ep2 = Episode::new("second", "b", EpisodeKind::Text, "g");
        store.upsert_episode(&ep1).await.unwrap();
        store.upsert_episode(&ep2).await.unwrap();

        let mut edge = RelationEdge::new(Uuid::new_v4(), Uuid::new_v4(), "R", "f", "g");
        edge.cite_episode(ep1.id);
        edge.cite_episode(ep2.id);

        let citations = svc.edge_citations(&edge).await.unwrap();
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].episode_id, ep1.id);
        assert_eq!(citations[0].source_url.as_deref(), Some("https://n.test/1"));
        assert_eq!(citations[1].episode_id, ep2.id);
        assert!(citations[1].source_url.is_none());
    }

    #[tokio::test]
    async fn node_citations_dedupe_and_tag() {
        let (store, svc) = service();
        let entity = Entity::new("Alice", "Person", "g");
        store.upsert_entity(&entity).await.unwrap();

        let ep1 = Episode::new("e1", "b", EpisodeKind::Text, "g");
        let ep2 = Episode::new("e2", "b", EpisodeKind::Text, "g");
        store.upsert_episode(&ep1).await.unwrap();
        store.upsert_episode(&ep2).await.unwrap();

        store
            .upsert_mention(&Mention::new(ep1.id, entity.id, MentionOp::Created, "g"))
            .await
            .unwrap();
        store
            .upsert_mention(&Mention::new(ep2.id, entity.id, MentionOp::Updated, "g"))
            .await
            .unwrap();
        // Duplicate mention from the same episode must not double-cite.
        store
            .upsert_mention(&Mention::new(ep2.id, entity.id, MentionOp::Referenced, "g"))
            .await
            .unwrap();

        let citations = svc.node_citations(entity.id).await.unwrap();
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].operation, MentionOp::Created);
        assert_eq!(citations[1].operation, MentionOp::Updated);
    }

    #[tokio::test]
    async fn edge_chain_tags_update() {
        let (store, svc) = service();
        let ep1 = Episode::new("origin", "b", EpisodeKind::Text, "g");
        let ep2 = Episode::new("edit", "b", EpisodeKind::Structured, "g");
        store.upsert_episode(&ep1).await.unwrap();
        store.upsert_episode(&ep2).await.unwrap();

        let mut edge = RelationEdge::new(Uuid::new_v4(), Uuid::new_v4(), "R", "new fact", "g");
        edge.original_fact = Some("old fact".to_string());
        edge.cite_episode(ep1.id);
        edge.cite_episode(ep2.id);
        store.upsert_edge(&edge).await.unwrap();

        let chain = svc.edge_chain(edge.id, 10).await.unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].operation, MentionOp::Created);
        assert_eq!(chain[1].operation, MentionOp::Updated);

        let err = svc.edge_chain(Uuid::new_v4(), 10).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
