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

//! The episode queue: per-group serial FIFOs with cross-group parallelism.
//!
//! One lazily-created FIFO per group. A drain worker owns each non-empty
//! group and processes its episodes strictly in submission order; workers
//! across groups share the process-wide inflight semaphore (N). Submission
//! acknowledges immediately with a typed handle; the queue itself is
//! in-memory and lost on restart — callers needing durable enqueue persist
//! before submitting.
//!
//! Retry: rate-limited and unavailable providers back off on the LLM
//! schedule, transient store errors on the shorter store schedule, bad
//! LLM output is never retried. Retry exhaustion marks the episode failed
//! and flags the persisted episode node so the failure stays observable.

use super::{CancelSignal, EpisodeState, EpisodeStatus, Orchestrator};
use dashmap::DashMap;
use graphmem_core::{Episode, GraphMemError, RetryPolicy};
use graphmem_store::GraphStore;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Cross-group inflight bound (N).
    pub max_inflight: usize,
    /// Minimum gap between dispatches within one group.
    pub spacing: Duration,
    /// Backoff schedule for provider errors.
    pub llm_retry: RetryPolicy,
    /// Backoff schedule for transient graph-store errors.
    pub store_retry: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_inflight: 10,
            spacing: Duration::ZERO,
            llm_retry: RetryPolicy::llm(),
            store_retry: RetryPolicy::graph_store(),
        }
    }
}

/// Typed handle returned from submission. Await it, poll it, or cancel it.
pub struct TaskHandle {
    pub episode_id: Uuid,
    pub group_id: String,
    status: watch::Receiver<EpisodeStatus>,
    cancel: Arc<watch::Sender<bool>>,
}

impl TaskHandle {
    pub fn status(&self) -> EpisodeStatus {
        self.status.borrow().clone()
    }

    /// Signal cancellation. Takes effect at the next suspension point;
    /// an episode already persisting completes its persist step.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Wait until the episode reaches a terminal state.
    pub async fn wait(&mut self) -> EpisodeStatus {
        loop {
            let current = self.status.borrow().clone();
            if current.state.is_terminal() {
                return current;
            }
            if self.status.changed().await.is_err() {
                return self.status.borrow().clone();
            }
        }
    }
}

struct QueuedEpisode {
    episode: Episode,
    cancel: CancelSignal,
}

struct GroupState {
    pending: Mutex<VecDeque<QueuedEpisode>>,
    draining: AtomicBool,
    /// Serializes episode processing with mutation operations targeting
    /// the same group. Tokio's mutex is fair, so waiters run in order.
    serial: Arc<tokio::sync::Mutex<()>>,
    last_dispatch: Mutex<Option<Instant>>,
}

impl GroupState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            serial: Arc::new(tokio::sync::Mutex::new(())),
            last_dispatch: Mutex::new(None),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupDepth {
    pub group_id: String,
    pub pending: usize,
    pub busy: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub groups: Vec<GroupDepth>,
    pub inflight_available: usize,
}

pub struct EpisodeQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    config: QueueConfig,
    store: Arc<dyn GraphStore>,
    orchestrator: Arc<Orchestrator>,
    inflight: Arc<Semaphore>,
    groups: DashMap<String, Arc<GroupState>>,
    statuses: DashMap<Uuid, watch::Sender<EpisodeStatus>>,
}

impl EpisodeQueue {
    pub fn new(config: QueueConfig, store: Arc<dyn GraphStore>, orchestrator: Arc<Orchestrator>) -> Self {
        let inflight = Arc::new(Semaphore::new(config.max_inflight));
        Self {
            inner: Arc::new(QueueInner {
                config,
                store,
                orchestrator,
                inflight,
                groups: DashMap::new(),
                statuses: DashMap::new(),
            }),
        }
    }

    /// Submit an episode. Returns immediately; processing is asynchronous
    /// and strictly FIFO within the episode's group.
    pub fn submit(&self, episode: Episode) -> TaskHandle {
        let (status_tx, status_rx) =
            watch::channel(EpisodeStatus::queued(episode.id, episode.group_id.clone()));
        self.inner.statuses.insert(episode.id, status_tx);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = TaskHandle {
            episode_id: episode.id,
            group_id: episode.group_id.clone(),
            status: status_rx,
            cancel: Arc::new(cancel_tx),
        };

        let group_id = episode.group_id.clone();
        let state = self.inner.group(&group_id);
        state.pending.lock().push_back(QueuedEpisode {
            episode,
            cancel: CancelSignal::new(cancel_rx),
        });
        self.inner.clone().ensure_drain(group_id, state);

        handle
    }

    /// Latest observed status for a submitted episode.
    pub fn status(&self, episode_id: Uuid) -> Option<EpisodeStatus> {
        self.inner
            .statuses
            .get(&episode_id)
            .map(|tx| tx.borrow().clone())
    }

    /// The group's serialization lock, shared with the mutation service so
    /// edits and deletes never interleave with episode processing.
    pub fn group_serial_lock(&self, group_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.inner.group(group_id).serial.clone()
    }

    pub fn stats(&self) -> QueueStats {
        let groups = self
            .inner
            .groups
            .iter()
            .map(|entry| GroupDepth {
                group_id: entry.key().clone(),
                pending: entry.value().pending.lock().len(),
                busy: entry.value().draining.load(Ordering::SeqCst),
            })
            .collect();
        QueueStats {
            groups,
            inflight_available: self.inner.inflight.available_permits(),
        }
    }
}

impl QueueInner {
    fn group(&self, group_id: &str) -> Arc<GroupState> {
        self.groups
            .entry(group_id.to_string())
            .or_insert_with(GroupState::new)
            .clone()
    }

    fn ensure_drain(self: Arc<Self>, group_id: String, state: Arc<GroupState>) {
        if state
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            tokio::spawn(async move {
                self.drain(group_id, state).await;
            });
        }
    }

    /// Drain one group serially until its FIFO empties.
    async fn drain(self: Arc<Self>, group_id: String, state: Arc<GroupState>) {
        loop {
            let next = state.pending.lock().pop_front();
            let Some(job) = next else {
                state.draining.store(false, Ordering::SeqCst);
                // Submission may have raced the flag; re-claim if so.
                if state.pending.lock().is_empty() {
                    return;
                }
                if state
                    .draining
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    return;
                }
                continue;
            };

            if job.cancel.is_cancelled() {
                self.update(job.episode.id, |s| s.state = EpisodeState::Cancelled);
                continue;
            }

            let permit = match self.inflight.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(group = %group_id, "inflight semaphore closed, stopping drain");
                    return;
                }
            };

            if !self.config.spacing.is_zero() {
                let elapsed = state.last_dispatch.lock().map(|t| t.elapsed());
                if let Some(elapsed) = elapsed {
                    if elapsed < self.config.spacing {
                        tokio::time::sleep(self.config.spacing - elapsed).await;
                    }
                }
            }

            let serial = state.serial.clone().lock_owned().await;
            *state.last_dispatch.lock() = Some(Instant::now());
            self.run_with_retries(&job).await;
            drop(serial);
            drop(permit);
        }
    }

    async fn run_with_retries(&self, job: &QueuedEpisode) {
        let episode = &job.episode;
        let id = episode.id;
        let mut attempts: u32 = 0;
        self.update(id, |s| s.state = EpisodeState::Dispatched);

        loop {
            if job.cancel.is_cancelled() {
                self.update(id, |s| s.state = EpisodeState::Cancelled);
                return;
            }

            let on_state = |state: EpisodeState| self.update(id, |s| s.state = state);
            let result = self.orchestrator.process(episode, &on_state, &job.cancel).await;

            match result {
                Ok(_report) => {
                    self.update(id, |s| {
                        s.state = EpisodeState::Done;
                        s.attempts = attempts;
                    });
                    return;
                }
                Err(GraphMemError::Cancelled) => {
                    self.update(id, |s| s.state = EpisodeState::Cancelled);
                    return;
                }
                Err(e) if e.is_retryable() => {
                    attempts += 1;
                    let policy = if e.is_provider_error() {
                        &self.config.llm_retry
                    } else {
                        &self.config.store_retry
                    };
                    if attempts >= policy.max_attempts {
                        self.mark_failed(episode, attempts, &e).await;
                        return;
                    }
                    let delay = policy.delay_for_attempt(attempts - 1);
                    warn!(
                        episode = %id,
                        group = %episode.group_id,
                        attempt = attempts,
                        kind = e.kind(),
                        delay_ms = delay.as_millis() as u64,
                        "episode attempt failed, backing off"
                    );
                    self.update(id, |s| {
                        s.state = EpisodeState::Retrying;
                        s.attempts = attempts;
                    });
                    tokio::time::sleep(delay).await;
                    self.update(id, |s| s.state = EpisodeState::Dispatched);
                }
                Err(e) => {
                    self.mark_failed(episode, attempts, &e).await;
                    return;
                }
            }
        }
    }

    /// Terminal failure: record it on the status channel and flag the
    /// persisted episode node so the failure is observable and the episode
    /// is never silently reprocessed.
    async fn mark_failed(&self, episode: &Episode, attempts: u32, error: &GraphMemError) {
        let reason = format!("{} (after {} failed attempts)", error, attempts.max(1));
        info!(episode = %episode.id, group = %episode.group_id, kind = error.kind(), "episode failed");

        match self.store.episode(episode.id).await {
            Ok(Some(mut persisted)) => {
                persisted.error = Some(reason.clone());
                if let Err(e) = self.store.upsert_episode(&persisted).await {
                    warn!(episode = %episode.id, error = %e, "could not flag failed episode");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(episode = %episode.id, error = %e, "could not load episode to flag failure"),
        }

        self.update(episode.id, |s| {
            s.state = EpisodeState::Failed;
            s.attempts = attempts;
            s.error = Some(reason);
        });
    }

    fn update(&self, episode_id: Uuid, f: impl FnOnce(&mut EpisodeStatus)) {
        if let Some(tx) = self.statuses.get(&episode_id) {
            tx.send_modify(f);
        }
    }
}
