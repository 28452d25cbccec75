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

//! Relation edges and mention edges.
//!
//! A relation edge carries two orthogonal time axes: system time
//! (`created_at`, `expired_at`) and valid time (`valid_at`, `invalid_at`).
//! Soft updates never rewrite an edge; they expire it and create a
//! replacement, so history and citations survive every mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use uuid::Uuid;

/// A directed, named relation between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationEdge {
    pub id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    /// Relation name, normalized to SCREAMING_SNAKE_CASE.
    pub relation: String,
    /// Natural-language rendering of the fact.
    pub fact: String,
    /// Fact embedding. Not serialized on API responses.
    #[serde(skip_serializing, default)]
    pub fact_embedding: Vec<f32>,
    /// System time the edge was added.
    pub created_at: DateTime<Utc>,
    /// When the stated relation began to hold, if the source said.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_at: Option<DateTime<Utc>>,
    /// When a later episode asserted the relation ceased.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_at: Option<DateTime<Utc>>,
    /// Set when the edge was superseded through soft-update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<DateTime<Utc>>,
    /// Episodes that assert or updated this edge, in citation order.
    /// Never empty: an edge with no supporting episode is deleted.
    pub episode_ids: Vec<Uuid>,
    /// The superseded fact text, populated on edited edges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_fact: Option<String>,
    /// Caller-provided reason, populated on edited edges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_reason: Option<String>,
    /// Extra typed attributes carried on the relation.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, serde_json::Value>,
    pub group_id: String,
}

impl RelationEdge {
    pub fn new(
        source_id: Uuid,
        target_id: Uuid,
        relation: impl AsRef<str>,
        fact: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            target_id,
            relation: normalize_relation(relation.as_ref()),
            fact: fact.into(),
            fact_embedding: Vec::new(),
            created_at: Utc::now(),
            valid_at: None,
            invalid_at: None,
            expired_at: None,
            episode_ids: Vec::new(),
            original_fact: None,
            update_reason: None,
            attributes: Map::new(),
            group_id: group_id.into(),
        }
    }

    /// An edge is currently asserted iff it has not been superseded and its
    /// valid interval has not closed.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.expired_at.is_none() && self.invalid_at.map(|t| t > now).unwrap_or(true)
    }

    /// Append a citing episode, keeping the list ordered and duplicate-free.
    pub fn cite_episode(&mut self, episode_id: Uuid) {
        if !self.episode_ids.contains(&episode_id) {
            self.episode_ids.push(episode_id);
        }
    }
}

/// Normalize a relation name: SCREAMING_SNAKE_CASE, non-alphanumerics folded
/// to underscores.
pub fn normalize_relation(relation: &str) -> String {
    let mut out = String::with_capacity(relation.len());
    let mut last_underscore = true;
    for c in relation.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_uppercase());
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// How an episode's processing touched an entity. Recorded on the mention at
/// ingestion time so citation chains can distinguish creation from updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionOp {
    /// The episode caused the entity to be created.
    Created,
    /// The episode's processing changed the entity's attributes or summary.
    Updated,
    /// Any other mention.
    Referenced,
}

/// Provenance link from an episode to an entity it references.
/// Carries no time interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    pub id: Uuid,
    pub episode_id: Uuid,
    pub entity_id: Uuid,
    pub operation: MentionOp,
    pub group_id: String,
    pub created_at: DateTime<Utc>,
}

impl Mention {
    pub fn new(episode_id: Uuid, entity_id: Uuid, operation: MentionOp, group_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            episode_id,
            entity_id,
            operation,
            group_id: group_id.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn relation_normalization() {
        assert_eq!(normalize_relation("works at"), "WORKS_AT");
        assert_eq!(normalize_relation("WORKS_AT"), "WORKS_AT");
        assert_eq!(normalize_relation("  left-company "), "LEFT_COMPANY");
        assert_eq!(normalize_relation("depends   on"), "DEPENDS_ON");
    }

    #[test]
    fn currency_rules() {
        let now = Utc::now();
        let mut e = RelationEdge::new(Uuid::new_v4(), Uuid::new_v4(), "WORKS_AT", "f", "g");
        assert!(e.is_current(now));

        e.invalid_at = Some(now + Duration::days(30));
        assert!(e.is_current(now), "future invalid_at keeps the edge current");

        e.invalid_at = Some(now - Duration::days(1));
        assert!(!e.is_current(now));

        e.invalid_at = None;
        e.expired_at = Some(now);
        assert!(!e.is_current(now));
    }

    #[test]
    fn episode_citation_dedup() {
        let mut e = RelationEdge::new(Uuid::new_v4(), Uuid::new_v4(), "R", "f", "g");
        let ep = Uuid::new_v4();
        e.cite_episode(ep);
        e.cite_episode(ep);
        assert_eq!(e.episode_ids, vec![ep]);
    }
}
