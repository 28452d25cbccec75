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

//! Episodes: the units of ingested information.
//!
//! An episode is immutable once created; everything else in the graph is
//! derived from episodes, and deleting one cascades through the edges and
//! entities it supports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The shape of an episode body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeKind {
    /// Plain prose.
    Text,
    /// Structured data (a JSON document rendered as a string).
    Structured,
    /// Conversation-style content (chat transcripts, message threads).
    Conversation,
}

impl EpisodeKind {
    /// Parse a caller-supplied kind, accepting the legacy aliases used by
    /// existing ingestion scripts (`json` for structured, `message` for
    /// conversation). Unknown values fall back to text.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "structured" | "json" => EpisodeKind::Structured,
            "conversation" | "message" => EpisodeKind::Conversation,
            _ => EpisodeKind::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeKind::Text => "text",
            EpisodeKind::Structured => "structured",
            EpisodeKind::Conversation => "conversation",
        }
    }
}

/// A unit of ingested information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Stable opaque identifier.
    pub id: Uuid,
    /// Caller-supplied episode name, unique-ish within a group.
    pub name: String,
    /// Raw content.
    pub body: String,
    /// Body shape.
    pub kind: EpisodeKind,
    /// Free-form source description. May carry an embedded
    /// `source_url: <url>` suffix; readers must keep accepting that form.
    #[serde(default)]
    pub source_description: String,
    /// Namespace. Episodes are strictly ordered within a group.
    pub group_id: String,
    /// System time the episode entered the graph.
    pub ingested_at: DateTime<Utc>,
    /// When the described event occurred. Defaults to `ingested_at`.
    pub reference_time: DateTime<Utc>,
    /// Set when ingestion failed after retries; the episode stays persisted
    /// so the failure is observable and never silently reprocessed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Episode {
    pub fn new(
        name: impl Into<String>,
        body: impl Into<String>,
        kind: EpisodeKind,
        group_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            body: body.into(),
            kind,
            source_description: String::new(),
            group_id: group_id.into(),
            ingested_at: now,
            reference_time: now,
            error: None,
        }
    }

    pub fn with_source_description(mut self, desc: impl Into<String>) -> Self {
        self.source_description = desc.into();
        self
    }

    pub fn with_reference_time(mut self, at: DateTime<Utc>) -> Self {
        self.reference_time = at;
        self
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }
}

/// Fold a caller-supplied source URL into the source description, keeping
/// the episode schema stable across storage backends. The embedded form is
/// what the citation service parses back out.
pub fn fold_source_url(description: &str, source_url: Option<&str>) -> String {
    match source_url {
        Some(url) if !url.trim().is_empty() => {
            if description.trim().is_empty() {
                format!("source_url: {}", url.trim())
            } else {
                format!("{}, source_url: {}", description, url.trim())
            }
        }
        _ => description.to_string(),
    }
}
