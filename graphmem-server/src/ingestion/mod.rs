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

//! Ingestion: the episode queue and the per-episode orchestrator.
//!
//! ```text
//! submit ──► per-group FIFO ──► drain worker ──► Orchestrator
//!               (serial            (≤ N across       extract → resolve →
//!                per group)         groups)           merge → persist
//! ```

pub mod orchestrator;
pub mod queue;

pub use orchestrator::{IngestReport, Orchestrator};
pub use queue::{EpisodeQueue, QueueConfig, QueueStats, TaskHandle};

use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

/// Per-episode processing states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeState {
    Queued,
    Dispatched,
    Extracting,
    Resolving,
    Persisting,
    Retrying,
    Done,
    Failed,
    Cancelled,
}

impl EpisodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EpisodeState::Done | EpisodeState::Failed | EpisodeState::Cancelled
        )
    }
}

/// Observable status of a submitted episode.
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeStatus {
    pub episode_id: Uuid,
    pub group_id: String,
    pub state: EpisodeState,
    /// Retry attempts consumed so far.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EpisodeStatus {
    pub fn queued(episode_id: Uuid, group_id: String) -> Self {
        Self {
            episode_id,
            group_id,
            state: EpisodeState::Queued,
            attempts: 0,
            error: None,
        }
    }
}

/// Cancellation signal checked at suspension points. Once persistence has
/// begun the orchestrator stops checking, so a cancelled episode never
/// leaves a partial graph behind.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive so the receiver stays valid forever.
        std::mem::forget(tx);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}
