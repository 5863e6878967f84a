//! Wire types for the worker function and the state manager.

use crate::models::SessionSummary;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body posted to a worker function.
///
/// Exactly one of `agent_id` / `word_id` is set, depending on the unit kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_id: Option<String>,
    pub text: String,
    pub session_id: String,
    /// Where the worker should send its partial counts.
    pub state_manager_url: String,
}

/// Worker function reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerResponse {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub word_count: u64,
    #[serde(default)]
    pub unique_words: u64,
    #[serde(default)]
    pub state_updated: bool,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// State manager operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Init,
    GetOrCreate,
    Get,
    Update,
    Reset,
    List,
}

/// Body posted to the state manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateManagerRequest {
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_counts: Option<HashMap<String, u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    /// Idle threshold for the `reset` cleanup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_seconds: Option<u64>,
}

impl StateManagerRequest {
    /// A request for `operation` scoped to `session_id`.
    pub fn for_session(operation: Operation, session_id: &str) -> Self {
        Self {
            operation,
            session_id: Some(session_id.to_string()),
            word_counts: None,
            node_id: None,
            timestamp: None,
            max_age_seconds: None,
        }
    }

    /// A request that is not scoped to a session.
    pub fn global(operation: Operation) -> Self {
        Self {
            operation,
            session_id: None,
            word_counts: None,
            node_id: None,
            timestamp: None,
            max_age_seconds: None,
        }
    }
}

/// Reply to `init` and `get_or_create`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionInfoResponse {
    #[serde(default)]
    pub is_new: Option<bool>,
    #[serde(default)]
    pub agent_count: u64,
    #[serde(default)]
    pub updates_count: u64,
    #[serde(default)]
    pub unique_words: u64,
}

/// Reply to `get`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateResponse {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub total_words: u64,
    #[serde(default)]
    pub unique_words: u64,
    #[serde(default)]
    pub updates_received: u64,
    #[serde(default)]
    pub session_age_seconds: f64,
    #[serde(default)]
    pub word_count_results: Vec<(String, u64)>,
}

/// Reply to `list`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub sessions: Vec<SessionSummary>,
    #[serde(default)]
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_worker_request_uses_one_id_field() {
        let request = WorkerRequest {
            agent_id: Some("agent-0".to_string()),
            word_id: None,
            text: "the cat".to_string(),
            session_id: "s1".to_string(),
            state_manager_url: "http://router/state-manager".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["agent_id"], "agent-0");
        assert!(value.get("word_id").is_none());
    }

    #[test]
    fn test_worker_response_defaults() {
        let response: WorkerResponse =
            serde_json::from_value(json!({"state_updated": true, "node_id": "mapper-1"})).unwrap();
        assert_eq!(response.word_count, 0);
        assert!(response.state_updated);
        assert_eq!(response.node_id.as_deref(), Some("mapper-1"));
    }

    #[test]
    fn test_state_request_operation_names() {
        let request = StateManagerRequest::for_session(Operation::GetOrCreate, "s1");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"operation": "get_or_create", "session_id": "s1"}));

        let value = serde_json::to_value(StateManagerRequest::global(Operation::List)).unwrap();
        assert_eq!(value, json!({"operation": "list"}));
    }

    #[test]
    fn test_state_response_parses_pairs() {
        let response: StateResponse = serde_json::from_value(json!({
            "session_id": "s1",
            "total_words": 3,
            "unique_words": 2,
            "updates_received": 1,
            "session_age_seconds": 4,
            "word_count_results": [["the", 2], ["cat", 1]]
        }))
        .unwrap();
        assert_eq!(response.word_count_results[0], ("the".to_string(), 2));
        assert_eq!(response.session_age_seconds, 4.0);
    }
}
