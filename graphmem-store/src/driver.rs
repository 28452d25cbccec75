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

//! The graph store driver contract.
//!
//! Drivers must provide read-after-write consistency within a single
//! logical request. They are not required to be transactional across
//! requests; the episode queue provides the higher-level serialization.
//! A `group_ids` slice that is empty means "all groups".

use async_trait::async_trait;
use graphmem_core::{Entity, Episode, Mention, RelationEdge, Result};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Result of an h-hop traversal from a center entity.
///
/// `hops` maps every reachable entity id (including the center, at 0) to
/// its shortest-path distance. `edges` are the connecting edges.
#[derive(Debug, Clone, Default)]
pub struct Neighborhood {
    pub hops: HashMap<Uuid, usize>,
    pub edges: Vec<RelationEdge>,
}

impl Neighborhood {
    /// Hop distance of an edge: the nearer of its two endpoints, if either
    /// is inside the neighborhood.
    pub fn edge_distance(&self, edge: &RelationEdge) -> Option<usize> {
        let s = self.hops.get(&edge.source_id);
        let t = self.hops.get(&edge.target_id);
        match (s, t) {
            (Some(a), Some(b)) => Some(*a.min(b)),
            (Some(a), None) => Some(*a),
            (None, Some(b)) => Some(*b),
            (None, None) => None,
        }
    }
}

/// Counts reported by a cascading episode delete.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CascadeReport {
    pub episode_deleted: bool,
    /// Edges that lost this episode from their citation list but survived.
    pub edges_detached: usize,
    /// Edges deleted because their citation list became empty.
    pub edges_deleted: usize,
    /// Entities deleted because they lost their last mention and edge.
    pub entities_deleted: usize,
}

/// Persistence contract for the knowledge graph.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// One-time index/constraint bootstrap, executed at startup.
    /// Idempotent.
    async fn bootstrap(&self) -> Result<()>;

    /// Atomic create-or-replace by id.
    async fn upsert_episode(&self, episode: &Episode) -> Result<()>;
    async fn upsert_entity(&self, entity: &Entity) -> Result<()>;
    async fn upsert_edge(&self, edge: &RelationEdge) -> Result<()>;
    async fn upsert_mention(&self, mention: &Mention) -> Result<()>;

    async fn episode(&self, id: Uuid) -> Result<Option<Episode>>;
    async fn episode_by_name(&self, group_id: &str, name: &str) -> Result<Option<Episode>>;
    async fn entity(&self, id: Uuid) -> Result<Option<Entity>>;
    async fn edge(&self, id: Uuid) -> Result<Option<RelationEdge>>;

    /// Most recent episodes by `ingested_at` descending.
    async fn recent_episodes(&self, group_ids: &[String], limit: usize) -> Result<Vec<Episode>>;

    /// Entities in the group whose normalized name matches exactly.
    async fn entities_by_name(&self, group_id: &str, normalized_name: &str) -> Result<Vec<Entity>>;

    /// Edges between the ordered endpoint pair with the given relation name,
    /// regardless of currency.
    async fn edges_between(&self, source_id: Uuid, target_id: Uuid, relation: &str) -> Result<Vec<RelationEdge>>;

    /// Top-k entities by cosine similarity of the name embedding.
    async fn entity_knn(&self, group_ids: &[String], query: &[f32], k: usize) -> Result<Vec<(Entity, f32)>>;

    /// Top-k edges by cosine similarity of the fact embedding.
    async fn edge_knn(&self, group_ids: &[String], query: &[f32], k: usize) -> Result<Vec<(RelationEdge, f32)>>;

    /// Lexical search over entity names and summaries. Scores are
    /// BM25-family: the exact formula is driver-defined but monotonic in
    /// term relevance.
    async fn entity_text_search(&self, group_ids: &[String], query: &str, k: usize) -> Result<Vec<(Entity, f32)>>;

    /// Lexical search over edge facts.
    async fn edge_text_search(&self, group_ids: &[String], query: &str, k: usize) -> Result<Vec<(RelationEdge, f32)>>;

    /// Lexical search over episode names and bodies.
    async fn episode_text_search(&self, group_ids: &[String], query: &str, k: usize) -> Result<Vec<(Episode, f32)>>;

    /// Entities within `max_hops` of the center, with connecting edges.
    /// Traversal follows non-expired edges only. An unknown center yields
    /// an empty neighborhood, not an error.
    async fn neighborhood(&self, center: Uuid, max_hops: usize) -> Result<Neighborhood>;

    async fn mentions_of_entity(&self, entity_id: Uuid) -> Result<Vec<Mention>>;
    async fn mentions_of_episode(&self, episode_id: Uuid) -> Result<Vec<Mention>>;

    /// All edges incident to the entity (either direction).
    async fn edges_of_entity(&self, entity_id: Uuid) -> Result<Vec<RelationEdge>>;

    /// All edges citing the episode in their `episode_ids`.
    async fn edges_citing(&self, episode_id: Uuid) -> Result<Vec<RelationEdge>>;

    /// Delete one edge, then garbage-collect endpoint entities left with
    /// neither mentions nor incident edges.
    async fn delete_edge(&self, id: Uuid) -> Result<()>;

    /// Cascading episode delete: removes the episode and its mentions,
    /// detaches the episode from citing edges, deletes edges whose citation
    /// list becomes empty, then deletes entities left with neither
    /// mentions nor incident edges.
    async fn delete_episode(&self, id: Uuid) -> Result<CascadeReport>;

    /// Remove all data belonging to the given groups.
    async fn clear_groups(&self, group_ids: &[String]) -> Result<()>;
}
