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

//! Entities: deduplicated noun-like concepts extracted from episodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use uuid::Uuid;

/// A deduplicated concept in the graph (person, service, document, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Stable opaque identifier.
    pub id: Uuid,
    /// Canonical display name.
    pub name: String,
    /// LLM-authored summary; empty until extraction supplies one.
    #[serde(default)]
    pub summary: String,
    /// Ontology labels, primary label first. Within a group,
    /// `(normalized name, primary label)` is the deduplication key.
    pub labels: Vec<String>,
    /// Typed key/value bag, validated against the primary label's schema.
    #[serde(default)]
    pub attributes: Map<String, serde_json::Value>,
    /// Name embedding. Not serialized on API responses.
    #[serde(skip_serializing, default)]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub group_id: String,
}

impl Entity {
    pub fn new(name: impl Into<String>, label: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            summary: String::new(),
            labels: vec![label.into()],
            attributes: Map::new(),
            embedding: Vec::new(),
            created_at: Utc::now(),
            group_id: group_id.into(),
        }
    }

    /// The primary ontology label. Entities always carry at least one label;
    /// an empty list reads as the generic fallback.
    pub fn primary_label(&self) -> &str {
        self.labels.first().map(String::as_str).unwrap_or("Topic")
    }

    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Normalize an entity name for deduplication: lowercase, trimmed, interior
/// whitespace collapsed to single spaces.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_whitespace_and_case() {
        assert_eq!(normalize_name("  Alice   Smith "), "alice smith");
        assert_eq!(normalize_name("ACME Corp"), "acme corp");
        assert_eq!(normalize_name("acme corp"), normalize_name("Acme  Corp"));
    }

    #[test]
    fn primary_label_falls_back() {
        let mut e = Entity::new("Alice", "Person", "g");
        assert_eq!(e.primary_label(), "Person");
        e.labels.clear();
        assert_eq!(e.primary_label(), "Topic");
    }
}
