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
use chrono::{DateTime, Utc};
use graphmem_core::episode::fold_source_url;
use graphmem_core::{Episode, EpisodeKind};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub group_id: Option<String>,
    /// `text`, `structured`, or `conversation`; legacy callers send
    /// `source` with `json`/`message` values.
    #[serde(default, alias = "source")]
    pub body_kind: Option<String>,
    #[serde(default)]
    pub source_description: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    /// Caller-supplied id; submission is idempotent on it.
    #[serde(default)]
    pub id: Option<Uuid>,
    /// ISO 8601; defaults to now.
    #[serde(default)]
    pub reference_time: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: String,
    pub episode_id: Uuid,
    pub name: String,
    pub group_id: String,
}

/// POST /api/v1/episodes
///
/// Accepts an episode and returns immediately; processing is asynchronous
/// and strictly ordered within the resolved group.
pub async fn ingest_episode(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("episode name must not be empty".into()));
    }
    if request.content.is_empty() {
        return Err(ApiError::BadRequest("episode content must not be empty".into()));
    }

    let group_id = request
        .group_id
        .filter(|g| !g.trim().is_empty())
        .unwrap_or_else(|| state.config.ingest.default_group_id.clone());

    let kind = request
        .body_kind
        .as_deref()
        .map(EpisodeKind::parse)
        .unwrap_or(EpisodeKind::Text);

    let source_description = fold_source_url(
        request.source_description.as_deref().unwrap_or(""),
        request.source_url.as_deref(),
    );

    let reference_time = request.reference_time.as_deref().and_then(|raw| {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                warn!(value = raw, error = %e, "invalid reference_time, using current time");
                None
            }
        }
    });

    let mut episode = Episode::new(request.name.trim(), request.content, kind, &group_id)
        .with_source_description(source_description);
    if let Some(id) = request.id {
        episode = episode.with_id(id);
    }
    if let Some(at) = reference_time {
        episode = episode.with_reference_time(at);
    }

    let handle = state.queue.submit(episode);

    Ok(Json(IngestResponse {
        status: "accepted".to_string(),
        episode_id: handle.episode_id,
        name: request.name.trim().to_string(),
        group_id,
    }))
}
