//! In-process stand-in for the function router used by tests.
//!
//! Serves `/state-manager` with additive merge semantics and a word-count
//! worker at `/agent` that writes straight into the same store. Individual
//! workers can be told to fail, stall or return garbage. `reset` behaves like
//! the deployed state manager: it only evicts sessions idle for longer than
//! `max_age_seconds` (default one hour).

use crate::backend::protocol::{
    Operation, StateManagerRequest, WorkerRequest, WorkerResponse,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

#[derive(Default)]
struct FakeSession {
    counts: HashMap<String, u64>,
    nodes: Vec<String>,
    created: Option<Instant>,
    last_access: Option<Instant>,
}

impl FakeSession {
    fn fresh() -> Self {
        Self {
            created: Some(Instant::now()),
            last_access: Some(Instant::now()),
            ..Self::default()
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_access.map(|t| t.elapsed()).unwrap_or_default()
    }
}

#[derive(Default)]
struct Behaviour {
    failing: HashSet<String>,
    malformed: HashSet<String>,
    slow: HashMap<String, Duration>,
    delay: Duration,
    failing_reads: bool,
}

#[derive(Default)]
pub struct Shared {
    sessions: Mutex<HashMap<String, FakeSession>>,
    behaviour: Mutex<Behaviour>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    worker_calls: AtomicUsize,
}

/// A running fake router.
pub struct FakeRouter {
    pub base_url: String,
    shared: Arc<Shared>,
    handle: JoinHandle<()>,
}

impl FakeRouter {
    pub async fn start() -> Self {
        let shared = Arc::new(Shared::default());
        let app = Router::new()
            .route("/state-manager", post(state_manager))
            .route("/agent", post(worker))
            .with_state(shared.clone());
        let (base_url, handle) = spawn_app(app).await;

        Self {
            base_url,
            shared,
            handle,
        }
    }

    /// Worker `worker_id` answers with a 500.
    pub fn fail(&self, worker_id: &str) -> &Self {
        self.behaviour().failing.insert(worker_id.to_string());
        self
    }

    /// Worker `worker_id` answers 200 with a body that is not JSON.
    pub fn malformed(&self, worker_id: &str) -> &Self {
        self.behaviour().malformed.insert(worker_id.to_string());
        self
    }

    /// Worker `worker_id` sleeps before answering.
    pub fn slow(&self, worker_id: &str, delay: Duration) -> &Self {
        self.behaviour().slow.insert(worker_id.to_string(), delay);
        self
    }

    /// Every worker call sleeps this long.
    pub fn delay_all(&self, delay: Duration) -> &Self {
        self.behaviour().delay = delay;
        self
    }

    /// State-manager `get` answers with a 500.
    pub fn fail_state_reads(&self) -> &Self {
        self.behaviour().failing_reads = true;
        self
    }

    /// Seed `session_id` with counts, as if earlier runs had written them.
    pub fn seed(&self, session_id: &str, words: &[(&str, u64)]) -> &Self {
        let mut sessions = self.shared.sessions.lock().unwrap();
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(FakeSession::fresh);
        let counts = words.iter().map(|(w, c)| (w.to_string(), *c)).collect();
        merge(session, counts, Some("seed".to_string()));
        self
    }

    /// Total words currently stored for `session_id`, if it exists.
    pub fn stored_words(&self, session_id: &str) -> Option<u64> {
        let sessions = self.shared.sessions.lock().unwrap();
        sessions
            .get(session_id)
            .map(|s| s.counts.values().sum::<u64>())
    }

    /// Highest number of worker calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn worker_calls(&self) -> usize {
        self.shared.worker_calls.load(Ordering::SeqCst)
    }

    pub fn shutdown(self) {
        self.handle.abort();
    }

    fn behaviour(&self) -> std::sync::MutexGuard<'_, Behaviour> {
        self.shared.behaviour.lock().unwrap()
    }
}

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn serve(app: Router) -> String {
    spawn_app(app).await.0
}

async fn spawn_app(app: Router) -> (String, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}", addr), handle)
}

async fn state_manager(
    State(shared): State<Arc<Shared>>,
    Json(request): Json<StateManagerRequest>,
) -> Response {
    let session_id = request
        .session_id
        .clone()
        .unwrap_or_else(|| "default".to_string());
    let failing_reads = shared.behaviour.lock().unwrap().failing_reads;
    let mut sessions = shared.sessions.lock().unwrap();
    if let Some(session) = sessions.get_mut(&session_id) {
        if request.operation != Operation::Reset {
            session.last_access = Some(Instant::now());
        }
    }

    match request.operation {
        Operation::Init => {
            sessions.insert(session_id.clone(), FakeSession::fresh());
            Json(json!({"message": "Session initialized", "session_id": session_id}))
                .into_response()
        }
        Operation::Reset => {
            let max_age = Duration::from_secs(request.max_age_seconds.unwrap_or(3600));
            let before = sessions.len();
            sessions.retain(|_, s| s.idle_for() <= max_age);
            Json(json!({
                "message": "Cleanup complete",
                "sessions_deleted": before - sessions.len(),
                "active_sessions": sessions.len(),
            }))
            .into_response()
        }
        Operation::Get if failing_reads => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "state store unavailable"})),
        )
            .into_response(),
        Operation::GetOrCreate => {
            let is_new = !sessions.contains_key(&session_id);
            let session = sessions
                .entry(session_id.clone())
                .or_insert_with(FakeSession::fresh);
            Json(json!({
                "session_id": session_id,
                "is_new": is_new,
                "agent_count": distinct(&session.nodes),
                "updates_count": session.nodes.len(),
                "unique_words": session.counts.len(),
            }))
            .into_response()
        }
        Operation::Update => {
            let session = sessions
                .entry(session_id.clone())
                .or_insert_with(FakeSession::fresh);
            merge(session, request.word_counts.unwrap_or_default(), request.node_id);
            Json(json!({"message": "State updated", "session_id": session_id})).into_response()
        }
        Operation::Get => match sessions.get(&session_id) {
            Some(session) => Json(snapshot(&session_id, session)).into_response(),
            None => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Session not found"})),
            )
                .into_response(),
        },
        Operation::List => {
            let list: Vec<_> = sessions
                .iter()
                .map(|(id, s)| {
                    json!({
                        "session_id": id,
                        "unique_words": s.counts.len(),
                        "updates": s.nodes.len(),
                        "age_seconds": age(s),
                    })
                })
                .collect();
            Json(json!({"total": list.len(), "sessions": list})).into_response()
        }
    }
}

async fn worker(State(shared): State<Arc<Shared>>, Json(request): Json<WorkerRequest>) -> Response {
    let worker_id = request
        .agent_id
        .clone()
        .or_else(|| request.word_id.clone())
        .unwrap_or_else(|| "agent-?".to_string());

    shared.worker_calls.fetch_add(1, Ordering::SeqCst);
    let now = shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    shared.max_in_flight.fetch_max(now, Ordering::SeqCst);

    let (delay, failing, malformed) = {
        let behaviour = shared.behaviour.lock().unwrap();
        let delay = behaviour.slow.get(&worker_id).copied().unwrap_or(behaviour.delay);
        (
            delay,
            behaviour.failing.contains(&worker_id),
            behaviour.malformed.contains(&worker_id),
        )
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    shared.in_flight.fetch_sub(1, Ordering::SeqCst);

    if failing {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "worker crashed"})),
        )
            .into_response();
    }
    if malformed {
        return "<html>gateway timeout</html>".into_response();
    }

    let mut counts: HashMap<String, u64> = HashMap::new();
    let words: Vec<String> = request
        .text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect();
    for word in &words {
        *counts.entry(word.clone()).or_default() += 1;
    }

    let node_id = format!("fake-{}", worker_id);
    let unique = counts.len() as u64;
    {
        let mut sessions = shared.sessions.lock().unwrap();
        let session = sessions
            .entry(request.session_id.clone())
            .or_insert_with(FakeSession::fresh);
        merge(session, counts, Some(node_id.clone()));
    }

    Json(WorkerResponse {
        status: Some(200),
        word_count: words.len() as u64,
        unique_words: unique,
        state_updated: true,
        node_id: Some(node_id),
        error: None,
        message: None,
    })
    .into_response()
}

fn merge(session: &mut FakeSession, counts: HashMap<String, u64>, node_id: Option<String>) {
    for (word, count) in counts {
        *session.counts.entry(word).or_default() += count;
    }
    session
        .nodes
        .push(node_id.unwrap_or_else(|| "unknown".to_string()));
}

fn snapshot(session_id: &str, session: &FakeSession) -> serde_json::Value {
    // Unsorted; the client ranks.
    let results: Vec<(String, u64)> = session
        .counts
        .iter()
        .map(|(w, c)| (w.clone(), *c))
        .collect();
    json!({
        "session_id": session_id,
        "total_words": session.counts.values().sum::<u64>(),
        "unique_words": session.counts.len(),
        "updates_received": session.nodes.len(),
        "session_age_seconds": age(session),
        "word_count_results": results,
    })
}

fn distinct(nodes: &[String]) -> usize {
    nodes.iter().collect::<HashSet<_>>().len()
}

fn age(session: &FakeSession) -> u64 {
    session.created.map(|c| c.elapsed().as_secs()).unwrap_or(0)
}
