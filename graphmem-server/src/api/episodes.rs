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

use crate::api::{ApiError, AppState};
use crate::ingestion::{EpisodeState, EpisodeStatus};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use graphmem_core::Episode;
use graphmem_query::TaggedCitation;
use graphmem_store::{CascadeReport, GraphStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MAX_EPISODE_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct EpisodeList {
    pub count: usize,
    pub episodes: Vec<Episode>,
}

/// GET /api/v1/episodes?group_id=&limit=
///
/// Most recent episodes by `ingested_at` descending.
pub async fn list_episodes(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<EpisodeList>, ApiError> {
    let groups: Vec<String> = params
        .group_id
        .filter(|g| !g.trim().is_empty())
        .map(|g| vec![g])
        .unwrap_or_default();
    let limit = params.limit.min(MAX_EPISODE_LIMIT);
    let episodes = state.store.recent_episodes(&groups, limit).await?;
    Ok(Json(EpisodeList {
        count: episodes.len(),
        episodes,
    }))
}

/// GET /api/v1/episodes/{id}/status
///
/// Live queue status when the episode is in flight this process lifetime;
/// otherwise derived from the persisted node (failures are flagged on it).
pub async fn episode_status(
    State(state): State<AppState>,
    Path(episode_id): Path<Uuid>,
) -> Result<Json<EpisodeStatus>, ApiError> {
    if let Some(status) = state.queue.status(episode_id) {
        return Ok(Json(status));
    }
    let episode = state
        .store
        .episode(episode_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("episode {}", episode_id)))?;
    let state_from_store = if episode.error.is_some() {
        EpisodeState::Failed
    } else {
        EpisodeState::Done
    };
    Ok(Json(EpisodeStatus {
        episode_id,
        group_id: episode.group_id,
        state: state_from_store,
        attempts: 0,
        error: episode.error,
    }))
}

/// DELETE /api/v1/episodes/{id}
///
/// Cascades: mentions are removed, edges lose this citation (and die with
/// their last one), and orphaned entities are collected.
pub async fn delete_episode(
    State(state): State<AppState>,
    Path(episode_id): Path<Uuid>,
) -> Result<Json<CascadeReport>, ApiError> {
    let report = state.mutations.delete_episode(episode_id).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct ClearRequest {
    pub group_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: Vec<String>,
}

/// POST /api/v1/groups/clear
pub async fn clear_groups(
    State(state): State<AppState>,
    Json(request): Json<ClearRequest>,
) -> Result<Json<ClearResponse>, ApiError> {
    state.mutations.clear_groups(&request.group_ids).await?;
    Ok(Json(ClearResponse {
        cleared: request.group_ids,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChainParams {
    #[serde(default = "default_chain_depth")]
    pub max_depth: usize,
}

fn default_chain_depth() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct ChainResponse {
    pub target_id: Uuid,
    pub target_kind: String,
    pub chain: Vec<TaggedCitation>,
}

/// GET /api/v1/citations/{kind}/{id}?max_depth=
///
/// Full provenance chain for an edge or node.
pub async fn citation_chain(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
    Query(params): Query<ChainParams>,
) -> Result<Json<ChainResponse>, ApiError> {
    let citations = state.search.citation_service();
    let chain = match kind.as_str() {
        "edge" => citations.edge_chain(id, params.max_depth).await?,
        "node" => citations.node_chain(id, params.max_depth).await?,
        other => {
            return Err(ApiError::BadRequest(format!(
                "citation kind must be 'edge' or 'node', got '{}'",
                other
            )))
        }
    };
    Ok(Json(ChainResponse {
        target_id: id,
        target_kind: kind,
        chain,
    }))
}
