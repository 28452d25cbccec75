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

//! Mutations: soft edge updates and cascading deletes.
//!
//! A soft update never rewrites an edge. It expires the old edge and
//! creates a replacement that inherits the citation list plus a synthesis
//! episode describing the edit, so the citation chain stays complete.
//! Every mutation runs under the owning group's serialization lock, shared
//! with the episode queue; the expire-then-create pair completes before
//! the call returns, so any subsequent search sees both or neither.

use crate::ingestion::EpisodeQueue;
use chrono::Utc;
use graphmem_core::{
    EmbeddingClient, Episode, EpisodeKind, GraphMemError, RelationEdge, Result,
};
use graphmem_store::{CascadeReport, GraphStore};
use serde::Deserialize;
use serde_json::{json, Map};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Caller-supplied edit for a soft edge update.
#[derive(Debug, Clone, Deserialize)]
pub struct EdgeUpdate {
    pub fact: String,
    #[serde(default)]
    pub source_entity_id: Option<Uuid>,
    #[serde(default)]
    pub target_entity_id: Option<Uuid>,
    #[serde(default)]
    pub attributes: Option<Map<String, serde_json::Value>>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Result of a soft update.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UpdateOutcome {
    pub old_id: Uuid,
    pub new_id: Uuid,
    pub synthesis_episode_id: Uuid,
}

pub struct MutationService {
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn EmbeddingClient>,
    queue: Arc<EpisodeQueue>,
}

impl MutationService {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn EmbeddingClient>,
        queue: Arc<EpisodeQueue>,
    ) -> Self {
        Self {
            store,
            embedder,
            queue,
        }
    }

    /// Soft-update an edge: expire the old version and create a
    /// replacement carrying the history. `valid_at`/`invalid_at` are
    /// retained — validity belongs to the relation, not to the edit.
    pub async fn update_edge(&self, edge_id: Uuid, update: EdgeUpdate) -> Result<UpdateOutcome> {
        if update.fact.trim().is_empty() {
            return Err(GraphMemError::Validation("fact must not be empty".into()));
        }

        // Peek at the edge to learn its group, then re-load under the
        // group lock in case an ingest changed it meanwhile.
        let preliminary = self
            .store
            .edge(edge_id)
            .await?
            .ok_or_else(|| GraphMemError::NotFound(format!("edge {}", edge_id)))?;
        let lock = self.queue.group_serial_lock(&preliminary.group_id);
        let _guard = lock.lock().await;

        let mut old = self
            .store
            .edge(edge_id)
            .await?
            .ok_or_else(|| GraphMemError::NotFound(format!("edge {}", edge_id)))?;
        if old.expired_at.is_some() {
            return Err(GraphMemError::Conflict(format!(
                "edge {} is already superseded",
                edge_id
            )));
        }

        let now = Utc::now();

        // The synthesis episode keeps the citation chain complete.
        let synthesis_body = json!({
            "operation": "edge_update",
            "edge_id": edge_id,
            "original_fact": old.fact,
            "new_fact": update.fact,
            "reason": update.reason,
        })
        .to_string();
        let synthesis = Episode::new(
            format!("edge-update-{}", edge_id),
            synthesis_body,
            EpisodeKind::Structured,
            &old.group_id,
        )
        .with_source_description("graphmem fact update")
        .with_reference_time(now);
        self.store.upsert_episode(&synthesis).await?;

        let mut replacement = RelationEdge::new(
            update.source_entity_id.unwrap_or(old.source_id),
            update.target_entity_id.unwrap_or(old.target_id),
            old.relation.clone(),
            update.fact.clone(),
            &old.group_id,
        );
        replacement.fact_embedding = self.embedder.embed(&update.fact).await?;
        replacement.created_at = now;
        replacement.valid_at = old.valid_at;
        replacement.invalid_at = old.invalid_at;
        replacement.episode_ids = old.episode_ids.clone();
        replacement.cite_episode(synthesis.id);
        replacement.original_fact = Some(old.fact.clone());
        replacement.update_reason = update.reason.clone();
        replacement.attributes = update.attributes.unwrap_or_else(|| old.attributes.clone());

        // Expire first, then insert: both writes complete before we return,
        // and the replacement's created_at equals the expiry instant.
        old.expired_at = Some(now);
        self.store.upsert_edge(&old).await?;
        self.store.upsert_edge(&replacement).await?;

        info!(old = %old.id, new = %replacement.id, group = %old.group_id, "edge soft-updated");
        Ok(UpdateOutcome {
            old_id: old.id,
            new_id: replacement.id,
            synthesis_episode_id: synthesis.id,
        })
    }

    /// Cascading episode delete, serialized behind the group queue.
    pub async fn delete_episode(&self, episode_id: Uuid) -> Result<CascadeReport> {
        let episode = self
            .store
            .episode(episode_id)
            .await?
            .ok_or_else(|| GraphMemError::NotFound(format!("episode {}", episode_id)))?;
        let lock = self.queue.group_serial_lock(&episode.group_id);
        let _guard = lock.lock().await;
        self.store.delete_episode(episode_id).await
    }

    /// Delete a single edge, serialized behind the group queue.
    pub async fn delete_edge(&self, edge_id: Uuid) -> Result<()> {
        let edge = self
            .store
            .edge(edge_id)
            .await?
            .ok_or_else(|| GraphMemError::NotFound(format!("edge {}", edge_id)))?;
        let lock = self.queue.group_serial_lock(&edge.group_id);
        let _guard = lock.lock().await;
        self.store.delete_edge(edge_id).await
    }

    /// Remove all data for the given groups, one group at a time so each
    /// clear serializes with that group's queue.
    pub async fn clear_groups(&self, group_ids: &[String]) -> Result<()> {
        if group_ids.is_empty() {
            return Err(GraphMemError::Validation("no group ids given".into()));
        }
        for group_id in group_ids {
            let lock = self.queue.group_serial_lock(group_id);
            let _guard = lock.lock().await;
            self.store.clear_groups(std::slice::from_ref(group_id)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::{Orchestrator, QueueConfig};
    use crate::llm::{ExtractionClient, LlmProviderManager};
    use graphmem_core::{Entity, HashEmbedder, Ontology};
    use graphmem_store::MemoryGraphStore;
    use tokio::sync::Semaphore;

    fn service() -> (Arc<MemoryGraphStore>, MutationService, Arc<HashEmbedder>) {
        let store: Arc<MemoryGraphStore> = Arc::new(MemoryGraphStore::new());
        let embedder = Arc::new(HashEmbedder::new(32));
        let gate = Arc::new(Semaphore::new(2));
        let extractor = Arc::new(ExtractionClient::new(
            Arc::new(LlmProviderManager::empty()),
            "none",
            None,
            Arc::new(Ontology::builtin()),
            gate,
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            extractor,
            embedder.clone(),
        ));
        let queue = Arc::new(EpisodeQueue::new(
            QueueConfig::default(),
            store.clone(),
            orchestrator,
        ));
        let svc = MutationService::new(store.clone(), embedder.clone(), queue);
        (store, svc, embedder)
    }

    async fn seed_edge(store: &MemoryGraphStore, embedder: &HashEmbedder) -> RelationEdge {
        let alice = Entity::new("Alice", "Person", "g");
        let acme = Entity::new("Acme", "Organization", "g");
        store.upsert_entity(&alice).await.unwrap();
        store.upsert_entity(&acme).await.unwrap();

        let origin = Episode::new("origin", "Alice works at Acme", EpisodeKind::Text, "g");
        store.upsert_episode(&origin).await.unwrap();

        let mut edge = RelationEdge::new(alice.id, acme.id, "WORKS_AT", "Alice works at Acme", "g");
        edge.fact_embedding = embedder.embed(&edge.fact).await.unwrap();
        edge.valid_at = Some(Utc::now() - chrono::Duration::days(100));
        edge.cite_episode(origin.id);
        store.upsert_edge(&edge).await.unwrap();
        edge
    }

    #[tokio::test]
    async fn soft_update_expires_and_replaces() {
        let (store, svc, embedder) = service();
        let edge = seed_edge(&store, &embedder).await;

        let outcome = svc
            .update_edge(
                edge.id,
                EdgeUpdate {
                    fact: "Alice leads platform engineering at Acme".into(),
                    source_entity_id: None,
                    target_entity_id: None,
                    attributes: None,
                    reason: Some("role change".into()),
                },
            )
            .await
            .unwrap();

        let old = store.edge(outcome.old_id).await.unwrap().unwrap();
        let new = store.edge(outcome.new_id).await.unwrap().unwrap();

        assert!(old.expired_at.is_some());
        assert!(new.expired_at.is_none());
        assert!(new.created_at >= old.expired_at.unwrap());
        assert_eq!(new.original_fact.as_deref(), Some("Alice works at Acme"));
        assert_eq!(new.update_reason.as_deref(), Some("role change"));
        // valid_at is a property of the relation and survives the edit.
        assert_eq!(new.valid_at, edge.valid_at);
        // Citations: the original episode plus the synthesis episode.
        assert_eq!(new.episode_ids.len(), 2);
        assert_eq!(new.episode_ids[1], outcome.synthesis_episode_id);

        let synthesis = store
            .episode(outcome.synthesis_episode_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(synthesis.kind, EpisodeKind::Structured);
        assert!(synthesis.body.contains("Alice works at Acme"));
    }

    #[tokio::test]
    async fn updating_a_superseded_edge_conflicts() {
        let (store, svc, embedder) = service();
        let edge = seed_edge(&store, &embedder).await;

        let update = EdgeUpdate {
            fact: "first edit".into(),
            source_entity_id: None,
            target_entity_id: None,
            attributes: None,
            reason: None,
        };
        svc.update_edge(edge.id, update.clone()).await.unwrap();

        let err = svc.update_edge(edge.id, update).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn unknown_targets_are_not_found() {
        let (_, svc, _) = service();
        let err = svc
            .update_edge(
                Uuid::new_v4(),
                EdgeUpdate {
                    fact: "x".into(),
                    source_entity_id: None,
                    target_entity_id: None,
                    attributes: None,
                    reason: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");

        assert_eq!(
            svc.delete_episode(Uuid::new_v4()).await.unwrap_err().kind(),
            "not_found"
        );
        assert_eq!(
            svc.delete_edge(Uuid::new_v4()).await.unwrap_err().kind(),
            "not_found"
        );
    }

    #[tokio::test]
    async fn empty_fact_is_rejected() {
        let (_, svc, _) = service();
        let err = svc
            .update_edge(
                Uuid::new_v4(),
                EdgeUpdate {
                    fact: "   ".into(),
                    source_entity_id: None,
                    target_entity_id: None,
                    attributes: None,
                    reason: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
