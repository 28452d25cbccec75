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

//! The per-episode ingestion transaction.
//!
//! extract → resolve → merge → persist, with candidate prefetch for entity
//! reuse. All writes happen in the final persist phase; everything before
//! it is pure planning, which is what makes cancellation and retries safe:
//! re-running the whole transaction is idempotent because resolution
//! deduplicates against whatever the previous attempt persisted.

use super::{CancelSignal, EpisodeState};
use crate::llm::{CandidateEntity, ExtractionClient};
use crate::resolver::{EdgeResolution, EntityResolution, Resolver};
use graphmem_core::{
    normalize_name, normalize_relation, EmbeddingClient, Entity, Episode, GraphMemError, Mention,
    MentionOp, RelationEdge, Result,
};
use graphmem_core::ontology::FALLBACK_LABEL;
use graphmem_store::GraphStore;
use serde::Serialize;
use serde_json::Map;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Upper bound on prefetched candidate entities offered to the extraction
/// prompt.
const CANDIDATE_PREFETCH: usize = 20;
/// Body prefix used for the candidate-prefetch embedding.
const SUMMARY_PREFIX_CHARS: usize = 512;

/// Counters from one episode's ingestion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub entities_created: usize,
    pub entities_merged: usize,
    pub edges_created: usize,
    pub edges_invalidated: usize,
    pub edges_duplicated: usize,
}

/// Runs the extract → resolve → merge → persist transaction.
pub struct Orchestrator {
    store: Arc<dyn GraphStore>,
    extractor: Arc<ExtractionClient>,
    embedder: Arc<dyn EmbeddingClient>,
    resolver: Resolver,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn GraphStore>,
        extractor: Arc<ExtractionClient>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Self {
        let resolver = Resolver::new(store.clone(), embedder.clone());
        Self {
            store,
            extractor,
            embedder,
            resolver,
        }
    }

    /// Process one episode. `on_state` receives phase transitions for the
    /// queue's status machinery; `cancel` is honored at every suspension
    /// point until persistence begins.
    pub async fn process(
        &self,
        episode: &Episode,
        on_state: &(dyn Fn(EpisodeState) + Send + Sync),
        cancel: &CancelSignal,
    ) -> Result<IngestReport> {
        check_cancel(cancel)?;

        // 1. Persist the episode node itself, idempotent on id.
        self.store.upsert_episode(episode).await?;

        on_state(EpisodeState::Extracting);

        // 2. Prefetch likely-related entities for name reuse.
        let summary: String = episode.body.chars().take(SUMMARY_PREFIX_CHARS).collect();
        let summary_embedding = self.embedder.embed(&summary).await?;
        let prefetched: Vec<Entity> = self
            .store
            .entity_knn(
                std::slice::from_ref(&episode.group_id),
                &summary_embedding,
                CANDIDATE_PREFETCH,
            )
            .await?
            .into_iter()
            .map(|(e, _)| e)
            .collect();

        check_cancel(cancel)?;

        // 3. Entity extraction.
        let candidates = self.extractor.extract_entities(episode, &prefetched).await?;

        on_state(EpisodeState::Resolving);
        check_cancel(cancel)?;

        let mut report = IngestReport::default();
        let mut resolved: Vec<(Entity, MentionOp)> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();

        for candidate in &candidates {
            let key = normalize_name(&candidate.name);
            if by_name.contains_key(&key) {
                debug!(name = %candidate.name, "duplicate candidate within episode, skipping");
                continue;
            }
            let resolution = self.resolver.resolve_entity(&episode.group_id, candidate).await?;
            let op = mention_op(&resolution, &mut report);
            by_name.insert(key, resolved.len());
            resolved.push((resolution.into_entity(), op));
        }

        check_cancel(cancel)?;

        // 4. Fact extraction over the resolved entity set.
        let entity_set: Vec<Entity> = resolved.iter().map(|(e, _)| e.clone()).collect();
        let facts = self.extractor.extract_facts(episode, &entity_set).await?;

        check_cancel(cancel)?;

        // 5. Edge resolution. Writes are still deferred; `planned` holds
        // every edge to persist keyed by id, so a later resolution in the
        // same episode sees earlier ones.
        let mut planned: HashMap<Uuid, RelationEdge> = HashMap::new();
        let mut order: Vec<Uuid> = Vec::new();

        for fact in &facts {
            let source_idx =
                self.endpoint(&episode.group_id, &fact.source_name, &mut resolved, &mut by_name, &mut report)
                    .await?;
            let target_idx =
                self.endpoint(&episode.group_id, &fact.target_name, &mut resolved, &mut by_name, &mut report)
                    .await?;
            let source = resolved[source_idx].0.clone();
            let target = resolved[target_idx].0.clone();

            let relation = normalize_relation(&fact.relation);
            let mut existing = self
                .store
                .edges_between(source.id, target.id, &relation)
                .await?;
            existing.extend(planned.values().filter(|e| {
                e.source_id == source.id && e.target_id == target.id && e.relation == relation
            }).cloned());

            let resolution = self
                .resolver
                .resolve_edge(episode, fact, &source, &target, &existing)
                .await?;

            match resolution {
                EdgeResolution::Created(edge) => {
                    report.edges_created += 1;
                    if !planned.contains_key(&edge.id) {
                        order.push(edge.id);
                    }
                    planned.insert(edge.id, edge);
                }
                EdgeResolution::Duplicate(edge) => {
                    report.edges_duplicated += 1;
                    if !planned.contains_key(&edge.id) {
                        order.push(edge.id);
                    }
                    planned.insert(edge.id, edge);
                }
                EdgeResolution::Invalidated { invalidated, created } => {
                    report.edges_invalidated += invalidated.len();
                    report.edges_created += 1;
                    for edge in invalidated {
                        if !planned.contains_key(&edge.id) {
                            order.push(edge.id);
                        }
                        planned.insert(edge.id, edge);
                    }
                    if !planned.contains_key(&created.id) {
                        order.push(created.id);
                    }
                    planned.insert(created.id, created);
                }
            }
        }

        // 6. Persist. No cancellation from here on: a partially merged
        // episode is worse than a completed one.
        on_state(EpisodeState::Persisting);

        for (entity, op) in &resolved {
            self.store.upsert_entity(entity).await?;
            self.store
                .upsert_mention(&Mention::new(episode.id, entity.id, *op, &episode.group_id))
                .await?;
        }
        for id in order {
            if let Some(edge) = planned.get(&id) {
                self.store.upsert_edge(edge).await?;
            }
        }

        info!(
            episode = %episode.id,
            group = %episode.group_id,
            entities_created = report.entities_created,
            entities_merged = report.entities_merged,
            edges_created = report.edges_created,
            edges_invalidated = report.edges_invalidated,
            edges_duplicated = report.edges_duplicated,
            "episode ingested"
        );
        Ok(report)
    }

    /// Find a fact endpoint among the episode's resolved entities, or
    /// resolve it through the entity rule with the fallback label when the
    /// extraction pass named an entity it never listed.
    async fn endpoint(
        &self,
        group_id: &str,
        name: &str,
        resolved: &mut Vec<(Entity, MentionOp)>,
        by_name: &mut HashMap<String, usize>,
        report: &mut IngestReport,
    ) -> Result<usize> {
        let key = normalize_name(name);
        if let Some(idx) = by_name.get(&key) {
            return Ok(*idx);
        }
        debug!(name, "fact endpoint missing from entity pass, resolving with fallback label");
        let candidate = CandidateEntity {
            name: name.to_string(),
            label: FALLBACK_LABEL.to_string(),
            summary: String::new(),
            attributes: Map::new(),
        };
        let resolution = self.resolver.resolve_entity(group_id, &candidate).await?;
        let op = mention_op(&resolution, report);
        let idx = resolved.len();
        by_name.insert(key, idx);
        resolved.push((resolution.into_entity(), op));
        Ok(idx)
    }
}

fn mention_op(resolution: &EntityResolution, report: &mut IngestReport) -> MentionOp {
    match resolution {
        EntityResolution::Created(_) => {
            report.entities_created += 1;
            MentionOp::Created
        }
        EntityResolution::Merged { changed: true, .. } => {
            report.entities_merged += 1;
            MentionOp::Updated
        }
        EntityResolution::Merged { changed: false, .. } => MentionOp::Referenced,
    }
}

fn check_cancel(cancel: &CancelSignal) -> Result<()> {
    if cancel.is_cancelled() {
        Err(GraphMemError::Cancelled)
    } else {
        Ok(())
    }
}
