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

//! Error kinds shared across the workspace.
//!
//! The variants map one-to-one onto the recovery table the service exposes:
//! validation and not-found reject, rate-limited and unavailable back off on
//! the LLM schedule, transient backs off on the store schedule, bad LLM
//! output is dropped per item, exhausted and cancelled are terminal.

use thiserror::Error;

/// Result type for graphmem operations.
pub type Result<T> = std::result::Result<T, GraphMemError>;

#[derive(Debug, Error)]
pub enum GraphMemError {
    /// Malformed input (missing name, bad enum, out-of-range parameter).
    #[error("validation: {0}")]
    Validation(String),

    /// Unknown id or name.
    #[error("not found: {0}")]
    NotFound(String),

    /// The LLM or embedding provider asked us to slow down.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The LLM or embedding provider is unreachable or timed out.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Network or graph-store blip; retried on the store schedule.
    #[error("transient: {0}")]
    Transient(String),

    /// The LLM returned output that failed structural validation. Never
    /// retried; the offending item is dropped and the episode continues.
    #[error("bad llm output: {0}")]
    BadLlmOutput(String),

    /// A contradictory edge was detected. Resolved by invalidation, so this
    /// surfaces only when invalidation itself cannot be applied.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Retries exhausted.
    #[error("retries exhausted after {attempts} attempts: {reason}")]
    Exhausted { attempts: u32, reason: String },

    /// Caller cancelled the operation.
    #[error("cancelled")]
    Cancelled,

    /// Invariant violation; do not proceed.
    #[error("internal: {0}")]
    Internal(String),
}

impl GraphMemError {
    /// Whether the queue should retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GraphMemError::RateLimited(_)
                | GraphMemError::Unavailable(_)
                | GraphMemError::Transient(_)
        )
    }

    /// Whether the error follows the LLM backoff schedule (as opposed to
    /// the shorter graph-store schedule).
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            GraphMemError::RateLimited(_) | GraphMemError::Unavailable(_)
        )
    }

    /// Short kind tag for structured log lines and status payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            GraphMemError::Validation(_) => "validation",
            GraphMemError::NotFound(_) => "not_found",
            GraphMemError::RateLimited(_) => "rate_limited",
            GraphMemError::Unavailable(_) => "unavailable",
            GraphMemError::Transient(_) => "transient",
            GraphMemError::BadLlmOutput(_) => "bad_llm_output",
            GraphMemError::Conflict(_) => "conflict",
            GraphMemError::Exhausted { .. } => "exhausted",
            GraphMemError::Cancelled => "cancelled",
            GraphMemError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(GraphMemError::RateLimited("429".into()).is_retryable());
        assert!(GraphMemError::Unavailable("timeout".into()).is_retryable());
        assert!(GraphMemError::Transient("socket reset".into()).is_retryable());
        assert!(!GraphMemError::BadLlmOutput("not json".into()).is_retryable());
        assert!(!GraphMemError::Cancelled.is_retryable());
        assert!(!GraphMemError::Validation("empty name".into()).is_retryable());
    }

    #[test]
    fn provider_errors_use_llm_schedule() {
        assert!(GraphMemError::RateLimited("429".into()).is_provider_error());
        assert!(GraphMemError::Unavailable("503".into()).is_provider_error());
        assert!(!GraphMemError::Transient("store".into()).is_provider_error());
    }
}
