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

//! Graphmem Core
//!
//! Fundamental data structures for the temporal knowledge graph: episodes,
//! entities, relation edges, mentions, the ontology registry, and the shared
//! error and resilience primitives used by every other crate in the
//! workspace.

pub mod edge;
pub mod embedding;
pub mod entity;
pub mod episode;
pub mod error;
pub mod ontology;
pub mod resilience;

pub use edge::{normalize_relation, Mention, MentionOp, RelationEdge};
pub use embedding::{cosine_similarity, EmbeddingClient, HashEmbedder};
pub use entity::{normalize_name, Entity};
pub use episode::{Episode, EpisodeKind};
pub use error::{GraphMemError, Result};
pub use ontology::{AttributeKind, AttributeSpec, LabelSchema, Ontology};
pub use resilience::RetryPolicy;
