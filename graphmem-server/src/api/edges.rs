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
use crate::mutation::{EdgeUpdate, UpdateOutcome};
use axum::{
    extract::{Path, State},
    Json,
};
use graphmem_core::RelationEdge;
use graphmem_query::Citation;
use graphmem_store::GraphStore;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct EdgeView {
    #[serde(flatten)]
    pub edge: RelationEdge,
    pub citations: Vec<Citation>,
}

/// GET /api/v1/edges/{id}
pub async fn get_edge(
    State(state): State<AppState>,
    Path(edge_id): Path<Uuid>,
) -> Result<Json<EdgeView>, ApiError> {
    let edge = state
        .store
        .edge(edge_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("edge {}", edge_id)))?;
    let citations = state
        .search
        .citation_service()
        .edge_citations(&edge)
        .await?;
    Ok(Json(EdgeView { edge, citations }))
}

/// POST /api/v1/edges/{id}
///
/// Soft update: the old edge is expired, a replacement carrying the
/// citation history (plus a synthesis episode) takes its place.
pub async fn update_edge(
    State(state): State<AppState>,
    Path(edge_id): Path<Uuid>,
    Json(update): Json<EdgeUpdate>,
) -> Result<Json<UpdateOutcome>, ApiError> {
    let outcome = state.mutations.update_edge(edge_id, update).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: Uuid,
}

/// DELETE /api/v1/edges/{id}
pub async fn delete_edge(
    State(state): State<AppState>,
    Path(edge_id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.mutations.delete_edge(edge_id).await?;
    Ok(Json(DeleteResponse { deleted: edge_id }))
}
