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

//! Entity and edge resolution.
//!
//! New extractions are reconciled against the existing graph: entities
//! deduplicate by normalized name or embedding similarity within their
//! group (groups are strictly isolated — candidates never cross group
//! boundaries), and candidate edges either create, duplicate into, or
//! contradict existing edges. Contradiction wins over duplication wins
//! over creation.

use crate::llm::{CandidateEntity, CandidateFact};
use chrono::Utc;
use graphmem_core::{
    normalize_name, normalize_relation, EmbeddingClient, Entity, Episode, RelationEdge, Result,
};
use graphmem_store::GraphStore;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Cosine similarity floor for embedding-based entity matches.
pub const SIMILARITY_FLOOR: f32 = 0.85;
/// Candidate pool size for embedding-based entity matches.
pub const CANDIDATE_K: usize = 5;

/// Outcome of resolving one candidate entity.
#[derive(Debug, Clone)]
pub enum EntityResolution {
    /// No match; a fresh entity was built.
    Created(Entity),
    /// Matched an existing entity. `changed` reports whether the merge
    /// modified attributes, labels, or summary.
    Merged { entity: Entity, changed: bool },
}

impl EntityResolution {
    pub fn entity(&self) -> &Entity {
        match self {
            EntityResolution::Created(e) => e,
            EntityResolution::Merged { entity, .. } => entity,
        }
    }

    pub fn into_entity(self) -> Entity {
        match self {
            EntityResolution::Created(e) => e,
            EntityResolution::Merged { entity, .. } => entity,
        }
    }
}

/// Outcome of resolving one candidate fact.
#[derive(Debug, Clone)]
pub enum EdgeResolution {
    /// No related existing edge; a new edge was built.
    Created(RelationEdge),
    /// The fact contradicts currently-asserted edges: each gets
    /// `invalid_at` closed, and a new edge is created alongside.
    Invalidated {
        invalidated: Vec<RelationEdge>,
        created: RelationEdge,
    },
    /// Same assertion, no time change: the existing edge gains this
    /// episode as a citation and nothing else changes.
    Duplicate(RelationEdge),
}

pub struct Resolver {
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn EmbeddingClient>,
}

impl Resolver {
    pub fn new(store: Arc<dyn GraphStore>, embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self { store, embedder }
    }

    /// Resolve a candidate entity against the group's existing entities.
    ///
    /// Matching: exact normalized-name equality on the deduplication key
    /// `(normalized name, primary label)`, or embedding cosine similarity
    /// >= 0.85 among the top-5 neighbors. A candidate carrying only the
    /// fallback label makes no label claim and matches any label. On
    /// multiple matches, exact name beats similarity, and ties fall to the
    /// earliest `created_at`.
    pub async fn resolve_entity(
        &self,
        group_id: &str,
        candidate: &CandidateEntity,
    ) -> Result<EntityResolution> {
        let normalized = normalize_name(&candidate.name);
        let embedding = self.embedder.embed(&candidate.name).await?;

        let label_agnostic = candidate.label == graphmem_core::ontology::FALLBACK_LABEL;
        let mut exact: Vec<Entity> = self
            .store
            .entities_by_name(group_id, &normalized)
            .await?
            .into_iter()
            .filter(|e| label_agnostic || e.primary_label() == candidate.label)
            .collect();

        let matched = if !exact.is_empty() {
            exact.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Some(exact.remove(0))
        } else {
            let neighbors = self
                .store
                .entity_knn(&[group_id.to_string()], &embedding, CANDIDATE_K)
                .await?;
            // Same name under a different primary label is a different
            // concept, not a near-duplicate.
            let mut close: Vec<(Entity, f32)> = neighbors
                .into_iter()
                .filter(|(_, sim)| *sim >= SIMILARITY_FLOOR)
                .filter(|(e, _)| {
                    label_agnostic
                        || e.normalized_name() != normalized
                        || e.primary_label() == candidate.label
                })
                .collect();
            close.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.created_at.cmp(&b.0.created_at))
            });
            close.into_iter().next().map(|(e, _)| e)
        };

        match matched {
            None => {
                let mut entity = Entity::new(candidate.name.trim(), &candidate.label, group_id);
                entity.summary = candidate.summary.clone();
                entity.attributes = candidate.attributes.clone();
                entity.embedding = embedding;
                debug!(name = %entity.name, label = %candidate.label, "creating entity");
                Ok(EntityResolution::Created(entity))
            }
            Some(mut existing) => {
                let mut changed = merge_attributes(&mut existing.attributes, &candidate.attributes);
                if !candidate.label.is_empty() && !existing.labels.contains(&candidate.label) {
                    existing.labels.push(candidate.label.clone());
                    changed = true;
                }
                if existing.summary.is_empty() && !candidate.summary.is_empty() {
                    existing.summary = candidate.summary.clone();
                    changed = true;
                }
                debug!(name = %existing.name, changed, "reusing entity");
                Ok(EntityResolution::Merged {
                    entity: existing,
                    changed,
                })
            }
        }
    }

    /// Resolve a candidate fact between two resolved endpoints against the
    /// edges already existing for that `(source, target, relation)` triple
    /// (the caller supplies them, including any not-yet-persisted edges
    /// from the same episode).
    pub async fn resolve_edge(
        &self,
        episode: &Episode,
        fact: &CandidateFact,
        source: &Entity,
        target: &Entity,
        existing: &[RelationEdge],
    ) -> Result<EdgeResolution> {
        let relation = normalize_relation(&fact.relation);
        let now = Utc::now();

        let current: Vec<&RelationEdge> = existing.iter().filter(|e| e.is_current(now)).collect();

        // Contradiction: explicit negation, or a strictly later valid_at on
        // the same triple.
        let contradicted: Vec<RelationEdge> = current
            .iter()
            .filter(|edge| {
                fact.negates
                    || match (fact.valid_at, edge.valid_at) {
                        (Some(new_at), Some(old_at)) => new_at > old_at,
                        _ => false,
                    }
            })
            .map(|e| (*e).clone())
            .collect();

        if !contradicted.is_empty() {
            let closes_at = fact.valid_at.unwrap_or(episode.reference_time);
            let invalidated: Vec<RelationEdge> = contradicted
                .into_iter()
                .map(|mut edge| {
                    edge.invalid_at = Some(closes_at);
                    edge
                })
                .collect();
            let created = self
                .build_edge(episode, fact, source.id, target.id, &relation)
                .await?;
            debug!(relation = %relation, count = invalidated.len(), "fact contradicts existing edges");
            return Ok(EdgeResolution::Invalidated {
                invalidated,
                created,
            });
        }

        // Duplicate: a current edge asserting the same thing with no time
        // change. A fact without valid_at can never contradict, and a fact
        // whose valid_at equals the edge's is the same assertion.
        if let Some(existing_current) = current.into_iter().find(|edge| {
            fact.valid_at.is_none() || fact.valid_at == edge.valid_at
        }) {
            let mut updated = existing_current.clone();
            updated.cite_episode(episode.id);
            debug!(relation = %relation, edge = %updated.id, "duplicate fact, appending citation");
            return Ok(EdgeResolution::Duplicate(updated));
        }

        let created = self
            .build_edge(episode, fact, source.id, target.id, &relation)
            .await?;
        Ok(EdgeResolution::Created(created))
    }

    async fn build_edge(
        &self,
        episode: &Episode,
        fact: &CandidateFact,
        source_id: Uuid,
        target_id: Uuid,
        relation: &str,
    ) -> Result<RelationEdge> {
        let mut edge = RelationEdge::new(source_id, target_id, relation, fact.fact.clone(), &episode.group_id);
        edge.fact_embedding = self.embedder.embed(&fact.fact).await?;
        edge.valid_at = fact.valid_at;
        edge.invalid_at = fact.invalid_at;
        edge.cite_episode(episode.id);
        Ok(edge)
    }
}

/// Conservative shallow attribute merge: existing keys win unless the
/// incoming value is a longer string that contains the existing value.
/// Returns whether anything changed.
fn merge_attributes(
    existing: &mut serde_json::Map<String, serde_json::Value>,
    incoming: &serde_json::Map<String, serde_json::Value>,
) -> bool {
    let mut changed = false;
    for (key, value) in incoming {
        match existing.get(key) {
            None => {
                existing.insert(key.clone(), value.clone());
                changed = true;
            }
            Some(current) => {
                if let (Some(old), Some(new)) = (current.as_str(), value.as_str()) {
                    if new.len() > old.len() && new.contains(old) {
                        existing.insert(key.clone(), value.clone());
                        changed = true;
                    }
                }
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphmem_core::{EpisodeKind, HashEmbedder};
    use graphmem_store::MemoryGraphStore;
    use serde_json::{json, Map};

    fn resolver() -> (Arc<MemoryGraphStore>, Resolver, Arc<HashEmbedder>) {
        let store = Arc::new(MemoryGraphStore::new());
        let embedder = Arc::new(HashEmbedder::new(64));
        let r = Resolver::new(store.clone(), embedder.clone());
        (store, r, embedder)
    }

    fn candidate(name: &str, label: &str) -> CandidateEntity {
        CandidateEntity {
            name: name.to_string(),
            label: label.to_string(),
            summary: String::new(),
            attributes: Map::new(),
        }
    }

    fn fact(source: &str, target: &str, relation: &str, text: &str) -> CandidateFact {
        CandidateFact {
            source_name: source.to_string(),
            target_name: target.to_string(),
            relation: relation.to_string(),
            fact: text.to_string(),
            valid_at: None,
            invalid_at: None,
            negates: false,
        }
    }

    #[tokio::test]
    async fn unmatched_candidate_creates_entity() {
        let (_, r, _) = resolver();
        let resolution = r.resolve_entity("g", &candidate("Alice", "Person")).await.unwrap();
        match resolution {
            EntityResolution::Created(e) => {
                assert_eq!(e.name, "Alice");
                assert_eq!(e.labels, vec!["Person"]);
                assert!(!e.embedding.is_empty());
            }
            other => panic!("expected creation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn exact_name_match_reuses_entity_across_case() {
        let (store, r, embedder) = resolver();
        let mut existing = Entity::new("Alice Smith", "Person", "g");
        existing.embedding = embedder.embed("Alice Smith").await.unwrap();
        store.upsert_entity(&existing).await.unwrap();

        let resolution = r
            .resolve_entity("g", &candidate("alice  smith", "Person"))
            .await
            .unwrap();
        match resolution {
            EntityResolution::Merged { entity, changed } => {
                assert_eq!(entity.id, existing.id);
                assert!(!changed);
            }
            other => panic!("expected merge, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn same_name_different_label_stays_distinct() {
        let (store, r, embedder) = resolver();
        let mut paris_city = Entity::new("Paris", "Location", "g");
        paris_city.embedding = embedder.embed("Paris").await.unwrap();
        store.upsert_entity(&paris_city).await.unwrap();

        // A Person named Paris is a different concept.
        let resolution = r.resolve_entity("g", &candidate("Paris", "Person")).await.unwrap();
        assert!(matches!(resolution, EntityResolution::Created(_)));

        // A label-agnostic candidate (fallback label) reuses the existing
        // entity instead of forking a third one.
        let resolution = r.resolve_entity("g", &candidate("Paris", "Topic")).await.unwrap();
        match resolution {
            EntityResolution::Merged { entity, .. } => assert_eq!(entity.id, paris_city.id),
            other => panic!("expected merge, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn group_isolation_prevents_cross_group_merges() {
        let (store, r, embedder) = resolver();
        let mut other_group = Entity::new("Alice", "Person", "g1");
        other_group.embedding = embedder.embed("Alice").await.unwrap();
        store.upsert_entity(&other_group).await.unwrap();

        let resolution = r.resolve_entity("g2", &candidate("Alice", "Person")).await.unwrap();
        assert!(matches!(resolution, EntityResolution::Created(_)));
    }

    #[tokio::test]
    async fn multiple_exact_matches_pick_earliest() {
        let (store, r, embedder) = resolver();
        let mut older = Entity::new("Acme", "Organization", "g");
        older.embedding = embedder.embed("Acme").await.unwrap();
        older.created_at = Utc::now() - chrono::Duration::days(7);
        let mut newer = Entity::new("Acme", "Organization", "g");
        newer.embedding = older.embedding.clone();
        store.upsert_entity(&older).await.unwrap();
        store.upsert_entity(&newer).await.unwrap();

        let resolution = r.resolve_entity("g", &candidate("Acme", "Organization")).await.unwrap();
        assert_eq!(resolution.entity().id, older.id);
    }

    #[tokio::test]
    async fn attribute_merge_is_conservative() {
        let (store, r, embedder) = resolver();
        let mut existing = Entity::new("Alice", "Person", "g");
        existing.embedding = embedder.embed("Alice").await.unwrap();
        existing.attributes.insert("role".into(), json!("engineer"));
        existing.attributes.insert("email".into(), json!("a@x.test"));
        store.upsert_entity(&existing).await.unwrap();

        let mut incoming = candidate("Alice", "Person");
        incoming.attributes.insert("role".into(), json!("senior engineer"));
        incoming.attributes.insert("email".into(), json!("b@y.test"));

        let resolution = r.resolve_entity("g", &incoming).await.unwrap();
        let entity = resolution.entity();
        // "senior engineer" contains and extends "engineer": replaced.
        assert_eq!(entity.attributes.get("role"), Some(&json!("senior engineer")));
        // "b@y.test" does not contain "a@x.test": existing wins.
        assert_eq!(entity.attributes.get("email"), Some(&json!("a@x.test")));
    }

    #[tokio::test]
    async fn fresh_triple_creates_edge() {
        let (_, r, _) = resolver();
        let episode = Episode::new("e", "b", EpisodeKind::Text, "g");
        let alice = Entity::new("Alice", "Person", "g");
        let acme = Entity::new("Acme", "Organization", "g");

        let resolution = r
            .resolve_edge(&episode, &fact("Alice", "Acme", "works at", "Alice works at Acme"), &alice, &acme, &[])
            .await
            .unwrap();
        match resolution {
            EdgeResolution::Created(edge) => {
                assert_eq!(edge.relation, "WORKS_AT");
                assert_eq!(edge.episode_ids, vec![episode.id]);
                assert!(!edge.fact_embedding.is_empty());
            }
            other => panic!("expected creation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn duplicate_fact_appends_citation() {
        let (_, r, _) = resolver();
        let episode = Episode::new("e2", "b", EpisodeKind::Text, "g");
        let alice = Entity::new("Alice", "Person", "g");
        let acme = Entity::new("Acme", "Organization", "g");

        let mut existing = RelationEdge::new(alice.id, acme.id, "WORKS_AT", "Alice works at Acme", "g");
        existing.cite_episode(Uuid::new_v4());

        let resolution = r
            .resolve_edge(
                &episode,
                &fact("Alice", "Acme", "WORKS_AT", "Alice works at Acme"),
                &alice,
                &acme,
                std::slice::from_ref(&existing),
            )
            .await
            .unwrap();
        match resolution {
            EdgeResolution::Duplicate(updated) => {
                assert_eq!(updated.id, existing.id);
                assert_eq!(updated.episode_ids.len(), 2);
                assert_eq!(updated.episode_ids[1], episode.id);
            }
            other => panic!("expected duplicate, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn negating_fact_invalidates_and_creates() {
        let (_, r, _) = resolver();
        let episode = Episode::new("e2", "b", EpisodeKind::Text, "g");
        let alice = Entity::new("Alice", "Person", "g");
        let acme = Entity::new("Acme", "Organization", "g");

        let mut existing = RelationEdge::new(alice.id, acme.id, "WORKS_AT", "Alice works at Acme", "g");
        existing.valid_at = Some(Utc::now() - chrono::Duration::days(365));
        existing.cite_episode(Uuid::new_v4());

        let mut negation = fact("Alice", "Acme", "WORKS_AT", "Alice no longer works at Acme");
        negation.negates = true;
        negation.valid_at = Some(Utc::now() - chrono::Duration::days(30));

        let resolution = r
            .resolve_edge(&episode, &negation, &alice, &acme, std::slice::from_ref(&existing))
            .await
            .unwrap();
        match resolution {
            EdgeResolution::Invalidated { invalidated, created } => {
                assert_eq!(invalidated.len(), 1);
                assert_eq!(invalidated[0].invalid_at, negation.valid_at);
                assert_eq!(created.episode_ids, vec![episode.id]);
            }
            other => panic!("expected invalidation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn later_valid_at_contradicts_without_negate_tag() {
        let (_, r, _) = resolver();
        let episode = Episode::new("e2", "b", EpisodeKind::Text, "g");
        let alice = Entity::new("Alice", "Person", "g");
        let acme = Entity::new("Acme", "Organization", "g");

        let mut existing = RelationEdge::new(alice.id, acme.id, "ROLE", "Alice is an engineer at Acme", "g");
        existing.valid_at = Some(Utc::now() - chrono::Duration::days(365));
        existing.cite_episode(Uuid::new_v4());

        let mut newer = fact("Alice", "Acme", "ROLE", "Alice is a manager at Acme");
        newer.valid_at = Some(Utc::now() - chrono::Duration::days(10));

        let resolution = r
            .resolve_edge(&episode, &newer, &alice, &acme, std::slice::from_ref(&existing))
            .await
            .unwrap();
        assert!(matches!(resolution, EdgeResolution::Invalidated { .. }));
    }
}
