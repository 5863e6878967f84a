//! Router client shared by the session controller, dispatcher and
//! aggregator client.

use crate::backend::protocol::{StateManagerRequest, WorkerRequest, WorkerResponse};
use crate::error::{OrchestratorError, Result};
use crate::models::ErrorKind;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A worker reply must carry at least one of these.
const WORKER_FIELDS: &[&str] = &[
    "status",
    "word_count",
    "unique_words",
    "state_updated",
    "node_id",
    "error",
    "message",
];

/// Where and how to reach the router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Router base URL as seen from this machine.
    pub base_url: String,
    /// Path of the worker function.
    pub worker_path: String,
    /// Path of the state manager function.
    pub state_manager_path: String,
    /// State manager URL as seen from inside the cluster, passed to workers.
    pub worker_state_manager_url: String,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9090".to_string(),
            worker_path: "/agent".to_string(),
            state_manager_path: "/state-manager".to_string(),
            worker_state_manager_url: "http://router.fission.svc.cluster.local/state-manager"
                .to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct RouterClient {
    http: reqwest::Client,
    config: Arc<RouterConfig>,
}

impl RouterClient {
    /// Build a client with the configured per-call timeout.
    pub fn new(config: RouterConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                OrchestratorError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn worker_url(&self) -> String {
        join_url(&self.config.base_url, &self.config.worker_path)
    }

    pub fn state_manager_url(&self) -> String {
        join_url(&self.config.base_url, &self.config.state_manager_path)
    }

    /// Send one operation to the state manager.
    pub async fn state_manager<T: DeserializeOwned>(
        &self,
        request: &StateManagerRequest,
    ) -> Result<T> {
        let url = self.state_manager_url();
        let body = self.post_json(&url, request).await?;
        serde_json::from_value(body).map_err(|e| OrchestratorError::Protocol {
            url,
            message: format!("{:?} response: {}", request.operation, e),
        })
    }

    /// Invoke the worker function for one unit.
    pub async fn call_worker(&self, request: &WorkerRequest) -> Result<WorkerResponse> {
        let url = self.worker_url();
        let body = self.post_json(&url, request).await?;

        let recognised = body
            .as_object()
            .map(|fields| WORKER_FIELDS.iter().any(|f| fields.contains_key(*f)));
        match recognised {
            None => {
                return Err(OrchestratorError::Protocol {
                    url,
                    message: format!("expected a JSON object, got: {}", body),
                });
            }
            Some(false) => {
                return Err(OrchestratorError::Protocol {
                    url,
                    message: format!(
                        "no worker reply fields in: {}",
                        truncate(&body.to_string(), 200)
                    ),
                });
            }
            Some(true) => {}
        }

        let response: WorkerResponse =
            serde_json::from_value(body).map_err(|e| OrchestratorError::Protocol {
                url: url.clone(),
                message: e.to_string(),
            })?;

        // Some workers wrap failures in a 200 with an embedded status.
        if let Some(status) = response.status.filter(|s| *s >= 400) {
            return Err(OrchestratorError::Transport {
                url,
                kind: ErrorKind::HttpStatus(status),
                message: response
                    .error
                    .or(response.message)
                    .unwrap_or_else(|| "worker reported an error".to_string()),
            });
        }

        Ok(response)
    }

    async fn post_json<B: Serialize>(&self, url: &str, body: &B) -> Result<Value> {
        debug!("POST {}", url);

        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| OrchestratorError::from_reqwest(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::Transport {
                url: url.to_string(),
                kind: ErrorKind::HttpStatus(status.as_u16()),
                message: text,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| OrchestratorError::from_reqwest(url, &e))?;

        serde_json::from_str(&text).map_err(|e| OrchestratorError::Protocol {
            url: url.to_string(),
            message: format!("invalid JSON ({}): {}", e, truncate(&text, 200)),
        })
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
