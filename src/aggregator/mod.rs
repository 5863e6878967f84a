//! Reading merged state back from the state manager.
//!
//! The state manager's own ordering of equal counts is unspecified, so every
//! state is re-ranked locally: count descending, then word ascending.

use crate::backend::protocol::{ListResponse, Operation, StateManagerRequest, StateResponse};
use crate::backend::RouterClient;
use crate::error::{OrchestratorError, Result};
use crate::models::{AggregatedState, ErrorKind, Session, SessionSummary};
use std::cmp::Ordering;
use tracing::debug;

/// Conventional size of the ranked projection.
pub const DEFAULT_TOP_K: usize = 20;

/// Client for the state manager's read operations.
pub struct AggregatorClient {
    client: RouterClient,
}

impl AggregatorClient {
    pub fn new(client: RouterClient) -> Self {
        Self { client }
    }

    /// Fetch the merged state for an established session.
    ///
    /// A session with no updates yet comes back with zeroed counters.
    pub async fn get_state(&self, session: &Session) -> Result<AggregatedState> {
        let request = StateManagerRequest::for_session(Operation::Get, &session.id);
        let reply: StateResponse = match self.client.state_manager(&request).await {
            Ok(reply) => reply,
            Err(OrchestratorError::Transport {
                kind: ErrorKind::HttpStatus(404),
                ..
            }) => return Err(OrchestratorError::AggregationUnavailable(session.id.clone())),
            Err(e) => return Err(e),
        };

        let mut results = reply.word_count_results;
        rank(&mut results);

        debug!(
            "Session {}: {} words, {} unique, {} updates",
            session.id, reply.total_words, reply.unique_words, reply.updates_received
        );

        Ok(AggregatedState {
            session_id: reply.session_id.unwrap_or_else(|| session.id.clone()),
            total_words: reply.total_words,
            unique_words: reply.unique_words,
            updates_received: reply.updates_received,
            word_count_results: results,
            age_seconds: reply.session_age_seconds,
        })
    }

    /// List the sessions the state manager currently holds.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let reply: ListResponse = self
            .client
            .state_manager(&StateManagerRequest::global(Operation::List))
            .await?;
        let mut sessions = reply.sessions;
        sessions.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(sessions)
    }
}

/// Order by count descending, ties broken by word ascending.
pub fn compare_entries(a: &(String, u64), b: &(String, u64)) -> Ordering {
    b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

/// Sort word counts into ranking order in place.
pub fn rank(results: &mut [(String, u64)]) {
    results.sort_by(compare_entries);
}

/// The `k` highest-ranked entries of `state`.
pub fn top_k(state: &AggregatedState, k: usize) -> Vec<(String, u64)> {
    let mut ranked = state.word_count_results.clone();
    rank(&mut ranked);
    ranked.truncate(k);
    ranked
}

/// Share of all counted words held by the top `k` entries.
pub fn top_k_coverage(state: &AggregatedState, k: usize) -> f64 {
    if state.total_words == 0 {
        return 0.0;
    }
    let covered: u64 = top_k(state, k).iter().map(|(_, c)| c).sum();
    covered as f64 / state.total_words as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RouterConfig;
    use crate::dispatch::{Dispatcher, WorkerPool};
    use crate::models::SessionMode;
    use crate::session::SessionController;
    use crate::splitter::split_by_chunks;
    use crate::testing::FakeRouter;
    use chrono::Utc;

    fn entries(pairs: &[(&str, u64)]) -> Vec<(String, u64)> {
        pairs.iter().map(|(w, c)| (w.to_string(), *c)).collect()
    }

    fn state_with(pairs: &[(&str, u64)]) -> AggregatedState {
        let results = entries(pairs);
        AggregatedState {
            session_id: "s".to_string(),
            total_words: results.iter().map(|(_, c)| c).sum(),
            unique_words: results.len() as u64,
            updates_received: 1,
            word_count_results: results,
            age_seconds: 0.0,
        }
    }

    fn same_counts(a: &AggregatedState, b: &AggregatedState) -> bool {
        a.total_words == b.total_words
            && a.unique_words == b.unique_words
            && a.updates_received == b.updates_received
            && a.word_count_results == b.word_count_results
    }

    fn client_for(router: &FakeRouter) -> RouterClient {
        RouterClient::new(RouterConfig {
            base_url: router.base_url.clone(),
            ..RouterConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_ties_break_lexicographically() {
        let mut results = entries(&[("mat", 1), ("the", 3), ("cat", 2), ("ant", 1), ("sat", 1)]);
        rank(&mut results);
        assert_eq!(
            results,
            entries(&[("the", 3), ("cat", 2), ("ant", 1), ("mat", 1), ("sat", 1)])
        );
    }

    #[test]
    fn test_top_k_truncates_and_ranks() {
        let state = state_with(&[("b", 1), ("a", 1), ("c", 5)]);
        assert_eq!(top_k(&state, 2), entries(&[("c", 5), ("a", 1)]));
        assert_eq!(top_k(&state, 10).len(), 3);
        assert!(top_k(&state, 0).is_empty());
    }

    #[test]
    fn test_top_k_coverage() {
        let state = state_with(&[("a", 3), ("b", 1)]);
        assert!((top_k_coverage(&state, 1) - 0.75).abs() < f64::EPSILON);
        assert_eq!(top_k_coverage(&state_with(&[]), 5), 0.0);
    }

    #[tokio::test]
    async fn test_fresh_session_has_zeroed_counters() {
        let router = FakeRouter::start().await;
        let client = client_for(&router);
        let session = SessionController::new(client.clone())
            .init("fresh")
            .await
            .unwrap();

        let state = AggregatorClient::new(client).get_state(&session).await.unwrap();
        assert_eq!(state.session_id, "fresh");
        assert!(state.is_empty());
        assert!(state.word_count_results.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session_is_unavailable() {
        let router = FakeRouter::start().await;
        let stale = Session {
            id: "never-created".to_string(),
            created_at: Utc::now(),
            is_new: true,
            agent_count: 0,
            updates_count: 0,
            mode: SessionMode::New,
        };

        let err = AggregatorClient::new(client_for(&router))
            .get_state(&stale)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::AggregationUnavailable(id) if id == "never-created"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_end_to_end_word_count() {
        let router = FakeRouter::start().await;
        let client = client_for(&router);
        let session = SessionController::new(client.clone())
            .init("e2e")
            .await
            .unwrap();

        let units = split_by_chunks("the cat sat on the mat the cat ran", 3).unwrap();
        let results = Dispatcher::new(client.clone(), WorkerPool::for_units(units.len(), None))
            .dispatch(units, &session)
            .await;
        assert!(results.iter().all(|r| r.is_success()));

        let state = AggregatorClient::new(client).get_state(&session).await.unwrap();
        assert_eq!(state.total_words, 9);
        assert_eq!(state.unique_words, 6);
        assert_eq!(state.updates_received, 3);
        assert_eq!(top_k(&state, DEFAULT_TOP_K)[0], ("the".to_string(), 3));
        assert_eq!(state.word_count_results[1], ("cat".to_string(), 2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_result_is_independent_of_submission_order() {
        let router = FakeRouter::start().await;
        let client = client_for(&router);
        let sessions = SessionController::new(client.clone());
        let aggregator = AggregatorClient::new(client.clone());
        let text = "it was the best of times it was the worst of times";

        let forward = sessions.init("forward").await.unwrap();
        let units = split_by_chunks(text, 4).unwrap();
        let results = Dispatcher::new(client.clone(), WorkerPool::new(4))
            .dispatch(units, &forward)
            .await;
        assert_eq!(results.len(), 4);

        let backward = sessions.init("backward").await.unwrap();
        let mut units = split_by_chunks(text, 4).unwrap();
        units.reverse();
        Dispatcher::new(client, WorkerPool::new(4))
            .dispatch(units, &backward)
            .await;

        let a = aggregator.get_state(&forward).await.unwrap();
        let b = aggregator.get_state(&backward).await.unwrap();
        assert!(same_counts(&a, &b));
        assert_eq!(a.total_words, 12);
    }

    #[tokio::test]
    async fn test_list_sessions_sorted_by_id() {
        let router = FakeRouter::start().await;
        let client = client_for(&router);
        let sessions = SessionController::new(client.clone());
        sessions.init("zeta").await.unwrap();
        sessions.init("alpha").await.unwrap();

        let listed = AggregatorClient::new(client).list_sessions().await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
    }
}
