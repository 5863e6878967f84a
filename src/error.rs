//! Error taxonomy for the orchestrator.
//!
//! Per-unit transport and protocol errors are caught by the dispatcher and
//! turned into failed task results. Everything else bubbles up to `main`.

use crate::models::ErrorKind;
use thiserror::Error;

/// Errors raised while talking to the router or preparing a run.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Connection failure, timeout or non-2xx status.
    #[error("Request to {url} failed ({kind}): {message}")]
    Transport {
        url: String,
        kind: ErrorKind,
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("Unexpected response from {url}: {message}")]
    Protocol { url: String, message: String },

    /// Missing input, invalid arguments or a bad config file.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The aggregator has no state for the requested session.
    #[error("Session '{0}' is not available on the state manager")]
    AggregationUnavailable(String),
}

impl OrchestratorError {
    /// Classify this error for recording in a failed task result.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Transport { kind, .. } => *kind,
            OrchestratorError::Protocol { .. } => ErrorKind::Protocol,
            OrchestratorError::Configuration(_) => ErrorKind::Protocol,
            OrchestratorError::AggregationUnavailable(_) => ErrorKind::HttpStatus(404),
        }
    }

    /// Build a transport error from a reqwest failure.
    pub fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_connect() {
            ErrorKind::Connect
        } else if let Some(status) = err.status() {
            ErrorKind::HttpStatus(status.as_u16())
        } else {
            ErrorKind::Connect
        };

        OrchestratorError::Transport {
            url: url.to_string(),
            kind,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
