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

//! The ontology: entity labels and their attribute schemas.
//!
//! A fixed set of built-in labels covers the common cases; deployments can
//! register additional labels at startup through configuration. Validation
//! at the LLM boundary is schema-directed and lossy by design: attributes
//! that do not fit the schema are dropped with a warning, never an error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Value types an attribute can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    String,
    Integer,
    Float,
    Boolean,
}

impl AttributeKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            AttributeKind::String => value.is_string(),
            AttributeKind::Integer => value.is_i64() || value.is_u64(),
            AttributeKind::Float => value.is_number(),
            AttributeKind::Boolean => value.is_boolean(),
        }
    }
}

/// Schema for one attribute of a label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub name: String,
    pub kind: AttributeKind,
    #[serde(default)]
    pub description: String,
}

/// Schema for one entity label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attributes: Vec<AttributeSpec>,
}

impl LabelSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            attributes: Vec::new(),
        }
    }

    pub fn attribute(mut self, name: &str, kind: AttributeKind, description: &str) -> Self {
        self.attributes.push(AttributeSpec {
            name: name.to_string(),
            kind,
            description: description.to_string(),
        });
        self
    }
}

/// The label registry consulted at the LLM and graph-store boundaries.
#[derive(Debug, Clone)]
pub struct Ontology {
    labels: BTreeMap<String, LabelSchema>,
}

/// Fallback label for entities the LLM could not classify.
pub const FALLBACK_LABEL: &str = "Topic";

impl Ontology {
    /// The built-in label set.
    pub fn builtin() -> Self {
        let mut ontology = Self {
            labels: BTreeMap::new(),
        };
        for schema in [
            LabelSchema::new("Person", "An individual human")
                .attribute("role", AttributeKind::String, "Job title or function")
                .attribute("email", AttributeKind::String, "Contact address"),
            LabelSchema::new("Organization", "A company, team, or institution")
                .attribute("industry", AttributeKind::String, "Primary industry")
                .attribute("size", AttributeKind::Integer, "Approximate headcount"),
            LabelSchema::new("Location", "A physical or geographic place"),
            LabelSchema::new("Document", "A file, page, ticket, or other written artifact")
                .attribute("url", AttributeKind::String, "Canonical link"),
            LabelSchema::new("Event", "Something that happened at a point or span of time")
                .attribute("date", AttributeKind::String, "When it occurred"),
            LabelSchema::new(FALLBACK_LABEL, "A generic concept"),
        ] {
            ontology.register(schema);
        }
        ontology
    }

    /// Register or replace a label schema. Used for deployment-declared
    /// custom labels from configuration.
    pub fn register(&mut self, schema: LabelSchema) {
        self.labels.insert(schema.name.clone(), schema);
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains_key(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &LabelSchema> {
        self.labels.values()
    }

    /// Resolve an LLM-supplied label to a registered one. Matching is
    /// case-insensitive; unknown labels fall back to the generic label.
    pub fn resolve_label(&self, label: &str) -> String {
        let wanted = label.trim();
        if self.labels.contains_key(wanted) {
            return wanted.to_string();
        }
        let lower = wanted.to_lowercase();
        for name in self.labels.keys() {
            if name.to_lowercase() == lower {
                return name.clone();
            }
        }
        FALLBACK_LABEL.to_string()
    }

    /// Schema-directed attribute validation. Attributes without a spec on
    /// the label, and attributes whose value does not fit the declared kind,
    /// are dropped.
    pub fn validate_attributes(&self, label: &str, attributes: &Map<String, Value>) -> Map<String, Value> {
        let Some(schema) = self.labels.get(label) else {
            return Map::new();
        };
        let mut out = Map::new();
        for (key, value) in attributes {
            match schema.attributes.iter().find(|a| &a.name == key) {
                Some(spec) if spec.kind.accepts(value) => {
                    out.insert(key.clone(), value.clone());
                }
                Some(spec) => {
                    warn!(label, attribute = %key, expected = ?spec.kind, "dropping attribute with mismatched type");
                }
                None => {
                    warn!(label, attribute = %key, "dropping attribute not in label schema");
                }
            }
        }
        out
    }

    /// Render the ontology for inclusion in an extraction prompt.
    pub fn describe_for_prompt(&self) -> String {
        let mut out = String::new();
        for schema in self.labels.values() {
            out.push_str(&format!("- {}: {}", schema.name, schema.description));
            if !schema.attributes.is_empty() {
                let attrs: Vec<String> = schema
                    .attributes
                    .iter()
                    .map(|a| format!("{} ({:?})", a.name, a.kind))
                    .collect();
                out.push_str(&format!(" [attributes: {}]", attrs.join(", ")));
            }
            out.push('\n');
        }
        out
    }
}

impl Default for Ontology {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_label_is_case_insensitive() {
        let o = Ontology::builtin();
        assert_eq!(o.resolve_label("person"), "Person");
        assert_eq!(o.resolve_label("Organization"), "Organization");
        assert_eq!(o.resolve_label("Spaceship"), FALLBACK_LABEL);
    }

    #[test]
    fn attribute_validation_drops_mismatches() {
        let o = Ontology::builtin();
        let mut attrs = Map::new();
        attrs.insert("role".into(), json!("engineer"));
        attrs.insert("email".into(), json!(42)); // wrong type
        attrs.insert("shoe_size".into(), json!(44)); // not in schema

        let valid = o.validate_attributes("Person", &attrs);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid.get("role"), Some(&json!("engineer")));
    }

    #[test]
    fn custom_labels_register() {
        let mut o = Ontology::builtin();
        o.register(
            LabelSchema::new("Service", "A deployed software service")
                .attribute("tier", AttributeKind::String, "Criticality tier"),
        );
        assert!(o.contains("Service"));
        assert_eq!(o.resolve_label("service"), "Service");

        let mut attrs = Map::new();
        attrs.insert("tier".into(), json!("gold"));
        assert_eq!(o.validate_attributes("Service", &attrs).len(), 1);
    }
}
