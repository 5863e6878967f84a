//! Data models for the orchestrator.
//!
//! This module contains the core data structures that flow between the
//! splitter, dispatcher, aggregator client and report generator.

use crate::splitter::SplitPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the explicit shared aggregation scope used by `--default-session`.
///
/// Only one aggregation can run against this scope at a time.
pub const DEFAULT_SESSION_ID: &str = "default";

/// How the session for a run is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Fresh session, overwriting any existing state under the same id.
    #[default]
    New,
    /// Attach to an existing session and accumulate, creating it if needed.
    Reuse,
    /// Reset and use the shared default scope.
    Default,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::New => write!(f, "NEW (fresh session)"),
            SessionMode::Reuse => write!(f, "ACCUMULATE (adding to existing session)"),
            SessionMode::Default => write!(f, "DEFAULT (shared scope, reset before run)"),
        }
    }
}

/// A named aggregation scope on the state manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier shared by every unit in the run.
    pub id: String,
    /// When this run established the session.
    pub created_at: DateTime<Utc>,
    /// Whether the state manager created the session for this run.
    pub is_new: bool,
    /// Workers already known to the session.
    pub agent_count: u64,
    /// Updates already merged into the session.
    pub updates_count: u64,
    /// How the session was established.
    pub mode: SessionMode,
}

/// What a work unit carries, which decides how its worker is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Chunk,
    Word,
}

/// One piece of input sent to exactly one worker invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// Position in dispatch order.
    pub id: usize,
    /// Text handed to the worker.
    pub payload: String,
    pub kind: UnitKind,
}

impl WorkUnit {
    /// Identifier the worker reports under.
    pub fn worker_id(&self) -> String {
        match self.kind {
            UnitKind::Chunk => format!("agent-{}", self.id),
            UnitKind::Word => format!("word-{}", self.id),
        }
    }

    /// Short preview of the payload for log lines.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut preview: String = self.payload.chars().take(max_chars).collect();
        if self.payload.chars().count() > max_chars {
            preview.push_str("...");
        }
        preview
    }
}

/// Classification of a failed unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Could not reach the router.
    Connect,
    /// The per-call timeout elapsed.
    Timeout,
    /// The router or worker answered with an error status.
    HttpStatus(u16),
    /// The response body was not what a worker returns.
    Protocol,
    /// The unit's task died before reporting.
    Aborted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Connect => write!(f, "connect"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::HttpStatus(code) => write!(f, "http {}", code),
            ErrorKind::Protocol => write!(f, "protocol"),
            ErrorKind::Aborted => write!(f, "aborted"),
        }
    }
}

/// How a single unit settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        reported_word_count: u64,
        reported_unique_words: u64,
        /// Worker's own claim that it reached the state manager.
        state_updated: bool,
        node_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        worker_error: Option<String>,
    },
    Failure {
        error_kind: ErrorKind,
        message: String,
    },
}

/// Result of dispatching one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub unit_id: usize,
    pub worker_id: String,
    pub elapsed_seconds: f64,
    pub outcome: Outcome,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// Record a unit that never produced a response.
    pub fn aborted(unit_id: usize, worker_id: String, message: impl Into<String>) -> Self {
        Self {
            unit_id,
            worker_id,
            elapsed_seconds: 0.0,
            outcome: Outcome::Failure {
                error_kind: ErrorKind::Aborted,
                message: message.into(),
            },
        }
    }
}

/// Merged counts for a session as reported by the state manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedState {
    pub session_id: String,
    pub total_words: u64,
    pub unique_words: u64,
    pub updates_received: u64,
    /// Sorted by count descending, then word ascending.
    pub word_count_results: Vec<(String, u64)>,
    pub age_seconds: f64,
}

impl AggregatedState {
    /// Whether the counters have all been zeroed (fresh or reset session).
    pub fn is_empty(&self) -> bool {
        self.total_words == 0 && self.unique_words == 0
    }
}

/// One entry of the state manager's session listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    #[serde(default)]
    pub unique_words: u64,
    #[serde(default)]
    pub updates: u64,
    #[serde(default)]
    pub age_seconds: f64,
}

/// Statistics about how the dispatch went.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub session_id: String,
    pub session_mode: SessionMode,
    pub split_policy: SplitPolicy,
    /// Number of units dispatched.
    pub num_chunks: usize,
    /// Worker pool size used.
    pub parallel_workers: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub input_chars: usize,
    pub input_words: usize,
    pub total_elapsed_seconds: f64,
    pub average_unit_seconds: f64,
    /// Estimated speedup over running the units one after another.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speedup: Option<f64>,
    pub units: Vec<TaskResult>,
}

/// The persisted artifact of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// `None` when the final state could not be retrieved.
    pub final_state: Option<AggregatedState>,
    pub execution_stats: ExecutionStats,
    pub generated_at: DateTime<Utc>,
}
