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

//! Graphmem Store
//!
//! The graph-store driver contract and the in-memory reference driver.
//! Production deployments implement [`GraphStore`] against their graph
//! database of choice; the in-memory driver backs tests and single-process
//! deployments.

pub mod driver;
pub mod memory;
pub mod text;

pub use driver::{CascadeReport, GraphStore, Neighborhood};
pub use memory::MemoryGraphStore;
