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
use axum::{extract::State, Json};
use graphmem_query::{EdgeHit, EdgeQuery, EpisodeHit, EpisodeQuery, NodeHit, NodeQuery};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MAX_RESULTS: usize = 100;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    Edges,
    Nodes,
    Episodes,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    pub kind: SearchKind,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub group_ids: Vec<String>,
    /// Nodes only.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Edges only.
    #[serde(default)]
    pub center_node_id: Option<Uuid>,
    /// Edges only: include soft-updated versions.
    #[serde(default)]
    pub include_historical: bool,
}

fn default_max_results() -> usize {
    10
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SearchResults {
    Edges(Vec<EdgeHit>),
    Nodes(Vec<NodeHit>),
    Episodes(Vec<EpisodeHit>),
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub kind: SearchKind,
    pub count: usize,
    pub results: SearchResults,
}

/// POST /api/v1/search
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let max_results = request.max_results.min(MAX_RESULTS);

    let results = match request.kind {
        SearchKind::Edges => {
            let hits = state
                .search
                .search_edges(&EdgeQuery {
                    query: request.query,
                    max_results,
                    group_ids: request.group_ids,
                    center_node_id: request.center_node_id,
                    include_historical: request.include_historical,
                })
                .await?;
            SearchResults::Edges(hits)
        }
        SearchKind::Nodes => {
            let hits = state
                .search
                .search_nodes(&NodeQuery {
                    query: request.query,
                    max_results,
                    group_ids: request.group_ids,
                    labels: request.labels,
                })
                .await?;
            SearchResults::Nodes(hits)
        }
        SearchKind::Episodes => {
            let hits = state
                .search
                .search_episodes(&EpisodeQuery {
                    query: request.query,
                    max_results,
                    group_ids: request.group_ids,
                })
                .await?;
            SearchResults::Episodes(hits)
        }
    };

    let count = match &results {
        SearchResults::Edges(h) => h.len(),
        SearchResults::Nodes(h) => h.len(),
        SearchResults::Episodes(h) => h.len(),
    };

    Ok(Json(SearchResponse {
        kind: request.kind,
        count,
        results,
    }))
}
