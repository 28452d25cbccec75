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

//! Graphmem Query
//!
//! Hybrid search over the knowledge graph: embedding similarity and lexical
//! scoring fused by reciprocal rank, graph-proximity re-ranking around an
//! optional center node, and the citation service that threads each result
//! back to the episodes that created it.

pub mod citations;
pub mod fusion;
pub mod search;

pub use citations::{Citation, CitationService, TaggedCitation};
pub use fusion::{reciprocal_rank_fusion, RRF_K};
pub use search::{
    EdgeHit, EdgeQuery, EpisodeHit, EpisodeQuery, NodeHit, NodeQuery, SearchEngine,
};
