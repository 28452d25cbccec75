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

//! In-memory reference driver.
//!
//! Concurrent maps keyed by id, a name index for deduplication lookups, and
//! an incidence index for traversal. Vector and lexical search are linear
//! scans over the group's candidates, which keeps the driver honest about
//! the contract without dragging in an index structure. Cycles are handled
//! by id-keyed visited sets; edges refer to entities by id only.

use crate::driver::{CascadeReport, GraphStore, Neighborhood};
use crate::text::{tokenize, LexicalScorer};
use async_trait::async_trait;
use dashmap::DashMap;
use graphmem_core::{cosine_similarity, Entity, Episode, GraphMemError, Mention, RelationEdge, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};
use uuid::Uuid;

fn in_groups(group_ids: &[String], group: &str) -> bool {
    group_ids.is_empty() || group_ids.iter().any(|g| g == group)
}

fn degenerate(query: &[f32]) -> bool {
    query.iter().map(|x| x * x).sum::<f32>().sqrt() < 1e-8
}

/// The in-memory graph store.
#[derive(Default)]
pub struct MemoryGraphStore {
    episodes: DashMap<Uuid, Episode>,
    entities: DashMap<Uuid, Entity>,
    edges: DashMap<Uuid, RelationEdge>,
    mentions: DashMap<Uuid, Mention>,
    /// (group_id, normalized name) -> entity ids.
    name_index: DashMap<(String, String), Vec<Uuid>>,
    /// entity id -> incident edge ids (either direction).
    incident: DashMap<Uuid, Vec<Uuid>>,
    bootstrapped: AtomicBool,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_entity_name(&self, entity: &Entity) {
        let key = (entity.group_id.clone(), entity.normalized_name());
        let mut ids = self.name_index.entry(key).or_default();
        if !ids.contains(&entity.id) {
            ids.push(entity.id);
        }
    }

    fn unindex_entity_name(&self, entity: &Entity) {
        let key = (entity.group_id.clone(), entity.normalized_name());
        if let Some(mut ids) = self.name_index.get_mut(&key) {
            ids.retain(|id| *id != entity.id);
        }
    }

    fn attach_incident(&self, entity_id: Uuid, edge_id: Uuid) {
        let mut ids = self.incident.entry(entity_id).or_default();
        if !ids.contains(&edge_id) {
            ids.push(edge_id);
        }
    }

    fn detach_incident(&self, entity_id: Uuid, edge_id: Uuid) {
        if let Some(mut ids) = self.incident.get_mut(&entity_id) {
            ids.retain(|id| *id != edge_id);
        }
    }

    fn remove_edge_internal(&self, id: Uuid) -> Option<RelationEdge> {
        let (_, edge) = self.edges.remove(&id)?;
        self.detach_incident(edge.source_id, id);
        self.detach_incident(edge.target_id, id);
        Some(edge)
    }

    fn remove_entity_internal(&self, id: Uuid) -> Option<Entity> {
        let (_, entity) = self.entities.remove(&id)?;
        self.unindex_entity_name(&entity);
        self.incident.remove(&id);
        Some(entity)
    }

    /// Delete the entity if it has neither mentions nor incident edges.
    fn gc_entity(&self, id: Uuid) -> bool {
        let has_edges = self
            .incident
            .get(&id)
            .map(|ids| !ids.is_empty())
            .unwrap_or(false);
        if has_edges {
            return false;
        }
        let has_mentions = self.mentions.iter().any(|m| m.entity_id == id);
        if has_mentions {
            return false;
        }
        self.remove_entity_internal(id).is_some()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn bootstrap(&self) -> Result<()> {
        if !self.bootstrapped.swap(true, Ordering::SeqCst) {
            info!("memory graph store ready (name + incidence indexes built lazily)");
        }
        Ok(())
    }

    async fn upsert_episode(&self, episode: &Episode) -> Result<()> {
        self.episodes.insert(episode.id, episode.clone());
        Ok(())
    }

    async fn upsert_entity(&self, entity: &Entity) -> Result<()> {
        if let Some(previous) = self.entities.get(&entity.id).map(|e| e.clone()) {
            if previous.group_id != entity.group_id || previous.normalized_name() != entity.normalized_name() {
                self.unindex_entity_name(&previous);
            }
        }
        self.entities.insert(entity.id, entity.clone());
        self.index_entity_name(entity);
        Ok(())
    }

    async fn upsert_edge(&self, edge: &RelationEdge) -> Result<()> {
        if let Some(previous) = self.edges.get(&edge.id).map(|e| e.clone()) {
            if previous.source_id != edge.source_id {
                self.detach_incident(previous.source_id, edge.id);
            }
            if previous.target_id != edge.target_id {
                self.detach_incident(previous.target_id, edge.id);
            }
        }
        self.edges.insert(edge.id, edge.clone());
        self.attach_incident(edge.source_id, edge.id);
        self.attach_incident(edge.target_id, edge.id);
        Ok(())
    }

    async fn upsert_mention(&self, mention: &Mention) -> Result<()> {
        self.mentions.insert(mention.id, mention.clone());
        Ok(())
    }

    async fn episode(&self, id: Uuid) -> Result<Option<Episode>> {
        Ok(self.episodes.get(&id).map(|e| e.clone()))
    }

    async fn episode_by_name(&self, group_id: &str, name: &str) -> Result<Option<Episode>> {
        Ok(self
            .episodes
            .iter()
            .find(|e| e.group_id == group_id && e.name == name)
            .map(|e| e.clone()))
    }

    async fn entity(&self, id: Uuid) -> Result<Option<Entity>> {
        Ok(self.entities.get(&id).map(|e| e.clone()))
    }

    async fn edge(&self, id: Uuid) -> Result<Option<RelationEdge>> {
        Ok(self.edges.get(&id).map(|e| e.clone()))
    }

    async fn recent_episodes(&self, group_ids: &[String], limit: usize) -> Result<Vec<Episode>> {
        let mut episodes: Vec<Episode> = self
            .episodes
            .iter()
            .filter(|e| in_groups(group_ids, &e.group_id))
            .map(|e| e.clone())
            .collect();
        episodes.sort_by(|a, b| b.ingested_at.cmp(&a.ingested_at));
        episodes.truncate(limit);
        Ok(episodes)
    }

    async fn entities_by_name(&self, group_id: &str, normalized_name: &str) -> Result<Vec<Entity>> {
        let key = (group_id.to_string(), normalized_name.to_string());
        let ids = self.name_index.get(&key).map(|v| v.clone()).unwrap_or_default();
        Ok(ids
            .into_iter()
            .filter_map(|id| self.entities.get(&id).map(|e| e.clone()))
            .collect())
    }

    async fn edges_between(&self, source_id: Uuid, target_id: Uuid, relation: &str) -> Result<Vec<RelationEdge>> {
        let candidate_ids = self.incident.get(&source_id).map(|v| v.clone()).unwrap_or_default();
        let mut out = Vec::new();
        for id in candidate_ids {
            if let Some(edge) = self.edges.get(&id) {
                if edge.source_id == source_id && edge.target_id == target_id && edge.relation == relation {
                    out.push(edge.clone());
                }
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn entity_knn(&self, group_ids: &[String], query: &[f32], k: usize) -> Result<Vec<(Entity, f32)>> {
        if degenerate(query) || k == 0 {
            return Ok(Vec::new());
        }
        let mut scored: Vec<(Entity, f32)> = self
            .entities
            .iter()
            .filter(|e| in_groups(group_ids, &e.group_id) && !e.embedding.is_empty())
            .map(|e| {
                let sim = cosine_similarity(query, &e.embedding);
                (e.clone(), sim)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn edge_knn(&self, group_ids: &[String], query: &[f32], k: usize) -> Result<Vec<(RelationEdge, f32)>> {
        if degenerate(query) || k == 0 {
            return Ok(Vec::new());
        }
        let mut scored: Vec<(RelationEdge, f32)> = self
            .edges
            .iter()
            .filter(|e| in_groups(group_ids, &e.group_id) && !e.fact_embedding.is_empty())
            .map(|e| {
                let sim = cosine_similarity(query, &e.fact_embedding);
                (e.clone(), sim)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn entity_text_search(&self, group_ids: &[String], query: &str, k: usize) -> Result<Vec<(Entity, f32)>> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let candidates: Vec<(Entity, Vec<String>)> = self
            .entities
            .iter()
            .filter(|e| in_groups(group_ids, &e.group_id))
            .map(|e| {
                let doc = tokenize(&format!("{} {}", e.name, e.summary));
                (e.clone(), doc)
            })
            .collect();
        let docs: Vec<Vec<String>> = candidates.iter().map(|(_, d)| d.clone()).collect();
        let scorer = LexicalScorer::new(&docs);
        let mut scored: Vec<(Entity, f32)> = candidates
            .into_iter()
            .map(|(e, doc)| {
                let s = scorer.score(&query_tokens, &doc);
                (e, s)
            })
            .filter(|(_, s)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn edge_text_search(&self, group_ids: &[String], query: &str, k: usize) -> Result<Vec<(RelationEdge, f32)>> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let candidates: Vec<(RelationEdge, Vec<String>)> = self
            .edges
            .iter()
            .filter(|e| in_groups(group_ids, &e.group_id))
            .map(|e| {
                let doc = tokenize(&e.fact);
                (e.clone(), doc)
            })
            .collect();
        let docs: Vec<Vec<String>> = candidates.iter().map(|(_, d)| d.clone()).collect();
        let scorer = LexicalScorer::new(&docs);
        let mut scored: Vec<(RelationEdge, f32)> = candidates
            .into_iter()
            .map(|(e, doc)| {
                let s = scorer.score(&query_tokens, &doc);
                (e, s)
            })
            .filter(|(_, s)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn episode_text_search(&self, group_ids: &[String], query: &str, k: usize) -> Result<Vec<(Episode, f32)>> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let candidates: Vec<(Episode, Vec<String>)> = self
            .episodes
            .iter()
            .filter(|e| in_groups(group_ids, &e.group_id))
            .map(|e| {
                let doc = tokenize(&format!("{} {}", e.name, e.body));
                (e.clone(), doc)
            })
            .collect();
        let docs: Vec<Vec<String>> = candidates.iter().map(|(_, d)| d.clone()).collect();
        let scorer = LexicalScorer::new(&docs);
        let mut scored: Vec<(Episode, f32)> = candidates
            .into_iter()
            .map(|(e, doc)| {
                let s = scorer.score(&query_tokens, &doc);
                (e, s)
            })
            .filter(|(_, s)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn neighborhood(&self, center: Uuid, max_hops: usize) -> Result<Neighborhood> {
        if !self.entities.contains_key(&center) {
            return Ok(Neighborhood::default());
        }

        let mut hops: HashMap<Uuid, usize> = HashMap::new();
        let mut seen_edges: HashSet<Uuid> = HashSet::new();
        let mut edges: Vec<RelationEdge> = Vec::new();
        let mut frontier: VecDeque<(Uuid, usize)> = VecDeque::new();

        hops.insert(center, 0);
        frontier.push_back((center, 0));

        while let Some((node, depth)) = frontier.pop_front() {
            if depth >= max_hops {
                continue;
            }
            let incident = self.incident.get(&node).map(|v| v.clone()).unwrap_or_default();
            for edge_id in incident {
                let Some(edge) = self.edges.get(&edge_id).map(|e| e.clone()) else {
                    continue;
                };
                if edge.expired_at.is_some() {
                    continue;
                }
                if seen_edges.insert(edge.id) {
                    edges.push(edge.clone());
                }
                let other = if edge.source_id == node { edge.target_id } else { edge.source_id };
                if !hops.contains_key(&other) && self.entities.contains_key(&other) {
                    hops.insert(other, depth + 1);
                    frontier.push_back((other, depth + 1));
                }
            }
        }

        Ok(Neighborhood { hops, edges })
    }

    async fn mentions_of_entity(&self, entity_id: Uuid) -> Result<Vec<Mention>> {
        let mut out: Vec<Mention> = self
            .mentions
            .iter()
            .filter(|m| m.entity_id == entity_id)
            .map(|m| m.clone())
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn mentions_of_episode(&self, episode_id: Uuid) -> Result<Vec<Mention>> {
        let mut out: Vec<Mention> = self
            .mentions
            .iter()
            .filter(|m| m.episode_id == episode_id)
            .map(|m| m.clone())
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn edges_of_entity(&self, entity_id: Uuid) -> Result<Vec<RelationEdge>> {
        let ids = self.incident.get(&entity_id).map(|v| v.clone()).unwrap_or_default();
        Ok(ids
            .into_iter()
            .filter_map(|id| self.edges.get(&id).map(|e| e.clone()))
            .collect())
    }

    async fn edges_citing(&self, episode_id: Uuid) -> Result<Vec<RelationEdge>> {
        Ok(self
            .edges
            .iter()
            .filter(|e| e.episode_ids.contains(&episode_id))
            .map(|e| e.clone())
            .collect())
    }

    async fn delete_edge(&self, id: Uuid) -> Result<()> {
        let Some(edge) = self.remove_edge_internal(id) else {
            return Err(GraphMemError::NotFound(format!("edge {}", id)));
        };
        self.gc_entity(edge.source_id);
        self.gc_entity(edge.target_id);
        Ok(())
    }

    async fn delete_episode(&self, id: Uuid) -> Result<CascadeReport> {
        if self.episodes.remove(&id).is_none() {
            return Err(GraphMemError::NotFound(format!("episode {}", id)));
        }
        let mut report = CascadeReport {
            episode_deleted: true,
            ..Default::default()
        };

        // Drop the episode's mentions, remembering which entities they touched.
        let mut affected: HashSet<Uuid> = HashSet::new();
        let mention_ids: Vec<Uuid> = self
            .mentions
            .iter()
            .filter(|m| m.episode_id == id)
            .map(|m| m.id)
            .collect();
        for mention_id in mention_ids {
            if let Some((_, mention)) = self.mentions.remove(&mention_id) {
                affected.insert(mention.entity_id);
            }
        }

        // Detach the episode from citing edges; an edge with no remaining
        // citations has nothing asserting it and is deleted.
        let citing: Vec<RelationEdge> = self
            .edges
            .iter()
            .filter(|e| e.episode_ids.contains(&id))
            .map(|e| e.clone())
            .collect();
        for mut edge in citing {
            edge.episode_ids.retain(|ep| *ep != id);
            if edge.episode_ids.is_empty() {
                self.remove_edge_internal(edge.id);
                affected.insert(edge.source_id);
                affected.insert(edge.target_id);
                report.edges_deleted += 1;
            } else {
                self.edges.insert(edge.id, edge);
                report.edges_detached += 1;
            }
        }

        for entity_id in affected {
            if self.gc_entity(entity_id) {
                report.entities_deleted += 1;
            }
        }

        debug!(
            episode = %id,
            edges_deleted = report.edges_deleted,
            edges_detached = report.edges_detached,
            entities_deleted = report.entities_deleted,
            "cascading episode delete"
        );
        Ok(report)
    }

    async fn clear_groups(&self, group_ids: &[String]) -> Result<()> {
        if group_ids.is_empty() {
            return Err(GraphMemError::Validation("no group ids to clear".into()));
        }
        let edge_ids: Vec<Uuid> = self
            .edges
            .iter()
            .filter(|e| in_groups(group_ids, &e.group_id))
            .map(|e| e.id)
            .collect();
        for id in edge_ids {
            self.remove_edge_internal(id);
        }
        let entity_ids: Vec<Uuid> = self
            .entities
            .iter()
            .filter(|e| in_groups(group_ids, &e.group_id))
            .map(|e| e.id)
            .collect();
        for id in entity_ids {
            self.remove_entity_internal(id);
        }
        self.mentions.retain(|_, m| !in_groups(group_ids, &m.group_id));
        self.episodes.retain(|_, e| !in_groups(group_ids, &e.group_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphmem_core::{EpisodeKind, MentionOp};

    fn entity(name: &str, group: &str, embedding: Vec<f32>) -> Entity {
        let mut e = Entity::new(name, "Person", group);
        e.embedding = embedding;
        e
    }

    #[tokio::test]
    async fn read_after_write() {
        let store = MemoryGraphStore::new();
        let ep = Episode::new("e1", "body", EpisodeKind::Text, "g1");
        store.upsert_episode(&ep).await.unwrap();
        assert!(store.episode(ep.id).await.unwrap().is_some());
        assert!(store.episode_by_name("g1", "e1").await.unwrap().is_some());
        assert!(store.episode_by_name("g2", "e1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn name_index_tracks_upserts() {
        let store = MemoryGraphStore::new();
        let e = entity("Alice Smith", "g1", vec![1.0, 0.0]);
        store.upsert_entity(&e).await.unwrap();

        let found = store.entities_by_name("g1", "alice smith").await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(store.entities_by_name("g2", "alice smith").await.unwrap().is_empty());

        let mut renamed = found[0].clone();
        renamed.name = "Alice Jones".to_string();
        store.upsert_entity(&renamed).await.unwrap();
        assert!(store.entities_by_name("g1", "alice smith").await.unwrap().is_empty());
        assert_eq!(store.entities_by_name("g1", "alice jones").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn knn_orders_by_similarity_and_rejects_degenerate() {
        let store = MemoryGraphStore::new();
        store.upsert_entity(&entity("a", "g", vec![1.0, 0.0])).await.unwrap();
        store.upsert_entity(&entity("b", "g", vec![0.7, 0.7])).await.unwrap();
        store.upsert_entity(&entity("c", "g", vec![0.0, 1.0])).await.unwrap();

        let hits = store.entity_knn(&["g".to_string()], &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.name, "a");
        assert_eq!(hits[1].0.name, "b");

        let none = store.entity_knn(&["g".to_string()], &[0.0, 0.0], 2).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn neighborhood_walks_hops_and_skips_expired() {
        let store = MemoryGraphStore::new();
        let a = entity("a", "g", vec![1.0]);
        let b = entity("b", "g", vec![1.0]);
        let c = entity("c", "g", vec![1.0]);
        for e in [&a, &b, &c] {
            store.upsert_entity(e).await.unwrap();
        }
        let ep = Uuid::new_v4();
        let mut ab = RelationEdge::new(a.id, b.id, "KNOWS", "a knows b", "g");
        ab.cite_episode(ep);
        let mut bc = RelationEdge::new(b.id, c.id, "KNOWS", "b knows c", "g");
        bc.cite_episode(ep);
        store.upsert_edge(&ab).await.unwrap();
        store.upsert_edge(&bc).await.unwrap();

        let n = store.neighborhood(a.id, 2).await.unwrap();
        assert_eq!(n.hops.get(&a.id), Some(&0));
        assert_eq!(n.hops.get(&b.id), Some(&1));
        assert_eq!(n.hops.get(&c.id), Some(&2));
        assert_eq!(n.edges.len(), 2);

        // Expire b->c; c drops out of the 2-hop neighborhood.
        let mut expired = bc.clone();
        expired.expired_at = Some(chrono::Utc::now());
        store.upsert_edge(&expired).await.unwrap();
        let n = store.neighborhood(a.id, 2).await.unwrap();
        assert!(!n.hops.contains_key(&c.id));

        // Unknown center: empty, not an error.
        let n = store.neighborhood(Uuid::new_v4(), 2).await.unwrap();
        assert!(n.hops.is_empty());
    }

    #[tokio::test]
    async fn cascade_delete_cleans_orphans() {
        let store = MemoryGraphStore::new();
        let ep1 = Episode::new("e1", "b", EpisodeKind::Text, "g");
        let ep2 = Episode::new("e2", "b", EpisodeKind::Text, "g");
        store.upsert_episode(&ep1).await.unwrap();
        store.upsert_episode(&ep2).await.unwrap();

        let alice = entity("Alice", "g", vec![1.0]);
        let acme = entity("Acme", "g", vec![1.0]);
        store.upsert_entity(&alice).await.unwrap();
        store.upsert_entity(&acme).await.unwrap();

        store
            .upsert_mention(&Mention::new(ep1.id, alice.id, MentionOp::Created, "g"))
            .await
            .unwrap();
        store
            .upsert_mention(&Mention::new(ep1.id, acme.id, MentionOp::Created, "g"))
            .await
            .unwrap();
        store
            .upsert_mention(&Mention::new(ep2.id, alice.id, MentionOp::Referenced, "g"))
            .await
            .unwrap();

        let mut works = RelationEdge::new(alice.id, acme.id, "WORKS_AT", "Alice works at Acme", "g");
        works.cite_episode(ep1.id);
        works.cite_episode(ep2.id);
        store.upsert_edge(&works).await.unwrap();

        // ep2 detaches but the edge survives on ep1's citation.
        let report = store.delete_episode(ep2.id).await.unwrap();
        assert_eq!(report.edges_detached, 1);
        assert_eq!(report.edges_deleted, 0);
        assert!(store.edge(works.id).await.unwrap().is_some());

        // ep1 takes the edge and both now-orphaned entities with it.
        let report = store.delete_episode(ep1.id).await.unwrap();
        assert_eq!(report.edges_deleted, 1);
        assert_eq!(report.entities_deleted, 2);
        assert!(store.edge(works.id).await.unwrap().is_none());
        assert!(store.entity(alice.id).await.unwrap().is_none());
        assert!(store.entity(acme.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_unknown_episode_is_not_found() {
        let store = MemoryGraphStore::new();
        let err = store.delete_episode(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn clear_groups_removes_only_named_groups() {
        let store = MemoryGraphStore::new();
        let e1 = Episode::new("e1", "b", EpisodeKind::Text, "g1");
        let e2 = Episode::new("e2", "b", EpisodeKind::Text, "g2");
        store.upsert_episode(&e1).await.unwrap();
        store.upsert_episode(&e2).await.unwrap();
        store.upsert_entity(&entity("x", "g1", vec![1.0])).await.unwrap();

        store.clear_groups(&["g1".to_string()]).await.unwrap();
        assert!(store.episode(e1.id).await.unwrap().is_none());
        assert!(store.episode(e2.id).await.unwrap().is_some());
        assert!(store.entities_by_name("g1", "x").await.unwrap().is_empty());
    }
}
