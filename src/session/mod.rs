//! Session lifecycle on the state manager.
//!
//! A session must be established before anything is dispatched; the
//! dispatcher never creates one implicitly. Any failure here ends the run.

use crate::backend::protocol::{Operation, SessionInfoResponse, StateManagerRequest};
use crate::backend::RouterClient;
use crate::error::Result;
use crate::models::{Session, SessionMode, DEFAULT_SESSION_ID};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

/// Generate a fresh session id of the form `wordcount-1a2b3c4d`.
pub fn new_session_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("wordcount-{}", &id[..8])
}

/// Creates, reuses and resets sessions.
pub struct SessionController {
    client: RouterClient,
}

impl SessionController {
    pub fn new(client: RouterClient) -> Self {
        Self { client }
    }

    /// Establish the session for a run according to `mode`.
    ///
    /// `session_id` is ignored in [`SessionMode::Default`].
    pub async fn establish(&self, mode: SessionMode, session_id: &str) -> Result<Session> {
        match mode {
            SessionMode::New => self.init(session_id).await,
            SessionMode::Reuse => self.get_or_create(session_id).await,
            SessionMode::Default => self.reset().await,
        }
    }

    /// Create a fresh session, discarding any existing state under `session_id`.
    pub async fn init(&self, session_id: &str) -> Result<Session> {
        info!("Initializing session {}", session_id);
        let reply = self.call(Operation::Init, session_id).await?;
        Ok(session(session_id, true, reply, SessionMode::New))
    }

    /// Attach to `session_id`, creating it only if it does not exist yet.
    pub async fn get_or_create(&self, session_id: &str) -> Result<Session> {
        info!("Initializing or reusing session {}", session_id);
        let reply = self.call(Operation::GetOrCreate, session_id).await?;
        let is_new = reply.is_new.unwrap_or(true);
        if !is_new {
            info!(
                "Reusing session {} ({} agents, {} previous updates)",
                session_id, reply.agent_count, reply.updates_count
            );
        }
        Ok(session(session_id, is_new, reply, SessionMode::Reuse))
    }

    /// Clear the shared default scope. Irreversible.
    ///
    /// The state manager's `reset` only evicts idle sessions, so the default
    /// scope is re-initialized afterwards to guarantee it starts empty.
    pub async fn reset(&self) -> Result<Session> {
        info!("Resetting default session '{}'", DEFAULT_SESSION_ID);
        let cleanup: Value = self
            .client
            .state_manager(&StateManagerRequest::for_session(
                Operation::Reset,
                DEFAULT_SESSION_ID,
            ))
            .await?;
        debug!("Idle session cleanup: {}", cleanup);

        let reply = self.call(Operation::Init, DEFAULT_SESSION_ID).await?;
        Ok(session(DEFAULT_SESSION_ID, true, reply, SessionMode::Default))
    }

    async fn call(&self, operation: Operation, session_id: &str) -> Result<SessionInfoResponse> {
        self.client
            .state_manager(&StateManagerRequest::for_session(operation, session_id))
            .await
    }
}

fn session(id: &str, is_new: bool, reply: SessionInfoResponse, mode: SessionMode) -> Session {
    Session {
        id: id.to_string(),
        created_at: Utc::now(),
        is_new,
        agent_count: if is_new { 0 } else { reply.agent_count },
        updates_count: if is_new { 0 } else { reply.updates_count },
        mode,
    }
}
