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

pub mod edges;
pub mod episodes;
pub mod health;
pub mod ingest;
pub mod search;

pub use edges::{delete_edge, get_edge, update_edge};
pub use episodes::{citation_chain, clear_groups, delete_episode, episode_status, list_episodes};
pub use health::health_check;
pub use ingest::ingest_episode;
pub use search::search;

use crate::config::ServerConfig;
use crate::ingestion::EpisodeQueue;
use crate::mutation::MutationService;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use graphmem_core::GraphMemError;
use graphmem_query::SearchEngine;
use graphmem_store::GraphStore;
use serde::Serialize;
use std::sync::Arc;

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<GraphMemError> for ApiError {
    fn from(e: GraphMemError) -> Self {
        match &e {
            GraphMemError::Validation(msg) => ApiError::BadRequest(msg.clone()),
            GraphMemError::NotFound(msg) => ApiError::NotFound(msg.clone()),
            GraphMemError::Conflict(msg) => ApiError::Conflict(msg.clone()),
            GraphMemError::RateLimited(_)
            | GraphMemError::Unavailable(_)
            | GraphMemError::Transient(_) => ApiError::Unavailable(e.to_string()),
            GraphMemError::Cancelled => ApiError::BadRequest("request cancelled".into()),
            _ => ApiError::Internal(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn GraphStore>,
    pub search: Arc<SearchEngine>,
    pub queue: Arc<EpisodeQueue>,
    pub mutations: Arc<MutationService>,
    pub config: Arc<ServerConfig>,
}
