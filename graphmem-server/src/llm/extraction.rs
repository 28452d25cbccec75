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

//! Entity and fact extraction via the LLM.
//!
//! Two prompt families: entity extraction (episode body + ontology + likely
//! known entities) and fact extraction (episode body + the resolved entity
//! set). Responses are JSON arrays; validation is schema-directed and
//! per-item lossy — a malformed item is dropped with a warning, and a
//! response with no usable array yields zero items, not a failed episode.

use super::{ChatMessage, LlmProviderManager};
use chrono::{DateTime, NaiveDate, Utc};
use graphmem_core::{Entity, Episode, GraphMemError, Ontology, Result};
use serde::Deserialize;
use serde_json::Map;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Default per-call LLM timeout.
pub const LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// An entity candidate emitted by the extraction pass.
#[derive(Debug, Clone)]
pub struct CandidateEntity {
    pub name: String,
    pub label: String,
    pub summary: String,
    pub attributes: Map<String, serde_json::Value>,
}

/// A fact candidate emitted by the extraction pass.
#[derive(Debug, Clone)]
pub struct CandidateFact {
    pub source_name: String,
    pub target_name: String,
    pub relation: String,
    pub fact: String,
    pub valid_at: Option<DateTime<Utc>>,
    pub invalid_at: Option<DateTime<Utc>>,
    /// The fact asserts that an existing relation ceased to hold.
    pub negates: bool,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    #[serde(alias = "candidate_name")]
    name: String,
    label: Option<String>,
    summary: Option<String>,
    #[serde(default)]
    attributes: Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawFact {
    #[serde(alias = "source")]
    source_name: String,
    #[serde(alias = "target")]
    target_name: String,
    #[serde(alias = "relation_name")]
    relation: String,
    #[serde(alias = "fact_text")]
    fact: String,
    valid_at: Option<String>,
    invalid_at: Option<String>,
    #[serde(default)]
    negates: bool,
}

/// Ontology-validating extraction client over the provider manager.
pub struct ExtractionClient {
    manager: Arc<LlmProviderManager>,
    provider_id: String,
    model: Option<String>,
    ontology: Arc<Ontology>,
    gate: Arc<Semaphore>,
    timeout: Duration,
}

impl ExtractionClient {
    pub fn new(
        manager: Arc<LlmProviderManager>,
        provider_id: impl Into<String>,
        model: Option<String>,
        ontology: Arc<Ontology>,
        gate: Arc<Semaphore>,
    ) -> Self {
        Self {
            manager,
            provider_id: provider_id.into(),
            model,
            ontology,
            gate,
            timeout: LLM_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ontology(&self) -> &Arc<Ontology> {
        &self.ontology
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| GraphMemError::Internal("provider gate closed".into()))?;
        let response = tokio::time::timeout(
            self.timeout,
            self.manager
                .chat(&self.provider_id, self.model.clone(), messages),
        )
        .await
        .map_err(|_| GraphMemError::Unavailable("llm call timed out".into()))??;
        Ok(response.content)
    }

    /// Extract entity candidates from an episode. `known` entities are
    /// offered as context so the model reuses existing names for concepts
    /// it recognizes.
    pub async fn extract_entities(
        &self,
        episode: &Episode,
        known: &[Entity],
    ) -> Result<Vec<CandidateEntity>> {
        let messages = vec![
            ChatMessage::system(
                "You are a knowledge graph extraction system. Extract entities from episodes. \
                 Output only a valid JSON array.",
            ),
            ChatMessage::user(self.entity_prompt(episode, known)),
        ];
        let response = self.chat(messages).await?;
        Ok(self.parse_entities(&response))
    }

    /// Extract fact candidates between the resolved entities.
    pub async fn extract_facts(
        &self,
        episode: &Episode,
        entities: &[Entity],
    ) -> Result<Vec<CandidateFact>> {
        let messages = vec![
            ChatMessage::system(
                "You are a knowledge graph extraction system. Extract relations between the \
                 given entities. Output only a valid JSON array.",
            ),
            ChatMessage::user(self.fact_prompt(episode, entities)),
        ];
        let response = self.chat(messages).await?;
        Ok(self.parse_facts(&response))
    }

    fn entity_prompt(&self, episode: &Episode, known: &[Entity]) -> String {
        let known_block = if known.is_empty() {
            "(none)".to_string()
        } else {
            known
                .iter()
                .map(|e| format!("- {} ({})", e.name, e.primary_label()))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            r#"## TASK
Extract the entities mentioned in the episode below.

## VALID LABELS (use EXACTLY these)
{ontology}
## KNOWN ENTITIES
Reuse one of these exact names when the episode refers to the same concept:
{known}

## EPISODE ({kind})
{body}

## OUTPUT
Return ONLY a JSON array, no markdown fences, no prose:
[{{"name": "...", "label": "...", "summary": "...", "attributes": {{}}}}]"#,
            ontology = self.ontology.describe_for_prompt(),
            known = known_block,
            kind = episode.kind.as_str(),
            body = episode.body,
        )
    }

    fn fact_prompt(&self, episode: &Episode, entities: &[Entity]) -> String {
        let entity_block = entities
            .iter()
            .map(|e| format!("- {}", e.name))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"## TASK
Extract relations between the entities below, as stated by the episode.
Use SCREAMING_SNAKE_CASE relation names (WORKS_AT, FOUNDED, LOCATED_IN, ...).
Dates are ISO 8601. Set "valid_at" when the episode says when a relation began,
"invalid_at" when it says when one ended, and "negates": true when the fact
asserts that a previously stated relation no longer holds.

## ENTITIES (use EXACTLY these names)
{entities}

## EPISODE (reference time {reference_time})
{body}

## OUTPUT
Return ONLY a JSON array, no markdown fences, no prose:
[{{"source_name": "...", "target_name": "...", "relation": "...", "fact": "...", "valid_at": null, "invalid_at": null, "negates": false}}]"#,
            entities = entity_block,
            reference_time = episode.reference_time.to_rfc3339(),
            body = episode.body,
        )
    }

    fn parse_entities(&self, response: &str) -> Vec<CandidateEntity> {
        let raw: Vec<RawEntity> = match parse_json_array(response) {
            Some(items) => items,
            None => {
                warn!("no entity array found in llm response");
                return Vec::new();
            }
        };

        let mut out = Vec::with_capacity(raw.len());
        for item in raw {
            let name = item.name.trim().to_string();
            if name.is_empty() {
                warn!("dropping extracted entity with empty name");
                continue;
            }
            let label = self
                .ontology
                .resolve_label(item.label.as_deref().unwrap_or(""));
            let attributes = self.ontology.validate_attributes(&label, &item.attributes);
            out.push(CandidateEntity {
                name,
                label,
                summary: item.summary.unwrap_or_default(),
                attributes,
            });
        }
        debug!(count = out.len(), "extracted entity candidates");
        out
    }

    fn parse_facts(&self, response: &str) -> Vec<CandidateFact> {
        let raw: Vec<RawFact> = match parse_json_array(response) {
            Some(items) => items,
            None => {
                warn!("no fact array found in llm response");
                return Vec::new();
            }
        };

        let mut out = Vec::with_capacity(raw.len());
        for item in raw {
            if item.source_name.trim().is_empty()
                || item.target_name.trim().is_empty()
                || item.fact.trim().is_empty()
            {
                warn!("dropping extracted fact with missing endpoint or text");
                continue;
            }
            out.push(CandidateFact {
                source_name: item.source_name.trim().to_string(),
                target_name: item.target_name.trim().to_string(),
                relation: item.relation.trim().to_string(),
                fact: item.fact.trim().to_string(),
                valid_at: item.valid_at.as_deref().and_then(parse_instant),
                invalid_at: item.invalid_at.as_deref().and_then(parse_instant),
                negates: item.negates,
            });
        }
        debug!(count = out.len(), "extracted fact candidates");
        out
    }
}

/// Locate and parse the first JSON array in a response. Models wrap output
/// in prose or fences often enough that strict parsing would throw away
/// usable answers.
fn parse_json_array<T: serde::de::DeserializeOwned>(response: &str) -> Option<Vec<T>> {
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&response[start..=end]) {
        Ok(items) => Some(items),
        Err(e) => {
            warn!(error = %e, "failed to parse json array from llm response");
            None
        }
    }
}

/// Lenient timestamp parsing for LLM-supplied dates: RFC 3339 first, then a
/// bare date at midnight UTC.
fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    let trimmed = s.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|ndt| DateTime::from_naive_utc_and_offset(ndt, Utc));
    }
    // Year-month alone shows up in "left in 2024-03" style episodes.
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", trimmed), "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|ndt| DateTime::from_naive_utc_and_offset(ndt, Utc));
    }
    warn!(value = trimmed, "unparseable timestamp from llm, ignoring");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn client() -> ExtractionClient {
        ExtractionClient::new(
            Arc::new(LlmProviderManager::empty()),
            "test",
            None,
            Arc::new(Ontology::builtin()),
            Arc::new(Semaphore::new(1)),
        )
    }

    #[test]
    fn parses_entities_and_validates_against_ontology() {
        let c = client();
        let response = r#"Here you go:
        [
            {"name": "Alice", "label": "Person", "summary": "An engineer", "attributes": {"role": "engineer", "bogus": 1}},
            {"name": "Acme", "label": "organization"},
            {"name": "", "label": "Person"},
            {"name": "Widget", "label": "UnknownLabel"}
        ]"#;

        let entities = c.parse_entities(response);
        assert_eq!(entities.len(), 3, "empty-name entity dropped");
        assert_eq!(entities[0].label, "Person");
        assert_eq!(entities[0].attributes.len(), 1, "unknown attribute dropped");
        assert_eq!(entities[1].label, "Organization", "label case-folded");
        assert_eq!(entities[2].label, "Topic", "unknown label falls back");
    }

    #[test]
    fn parses_facts_with_temporal_fields() {
        let c = client();
        let response = r#"[
            {"source_name": "Alice", "target_name": "Acme", "relation": "WORKS_AT",
             "fact": "Alice works at Acme", "valid_at": "2023-01-15", "negates": false},
            {"source_name": "Alice", "target_name": "Acme", "relation": "WORKS_AT",
             "fact": "Alice no longer works at Acme", "valid_at": "2024-03", "negates": true},
            {"source_name": "", "target_name": "Acme", "relation": "X", "fact": "junk"}
        ]"#;

        let facts = c.parse_facts(response);
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].valid_at.unwrap().year(), 2023);
        assert!(!facts[0].negates);
        let v = facts[1].valid_at.unwrap();
        assert_eq!((v.year(), v.month(), v.day()), (2024, 3, 1));
        assert!(facts[1].negates);
    }

    #[test]
    fn unusable_responses_yield_zero_items() {
        let c = client();
        assert!(c.parse_entities("I could not find any entities.").is_empty());
        assert!(c.parse_entities("[{broken json]").is_empty());
        assert!(c.parse_facts("nothing here").is_empty());
    }

    #[test]
    fn instant_parsing_accepts_rfc3339() {
        let dt = parse_instant("2024-11-20T10:30:00Z").unwrap();
        assert_eq!(dt.year(), 2024);
        assert!(parse_instant("soon").is_none());
        assert!(parse_instant("").is_none());
    }
}
