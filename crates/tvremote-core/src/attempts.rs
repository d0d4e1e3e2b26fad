//! Per-address connection attempt bookkeeping.
//!
//! The store lives for the whole process and is shared between the
//! connection manager (the only writer) and anyone who wants to inspect it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::backoff::BackoffPolicy;
use crate::util::normalize_address;

/// Connection attempt state for one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptState {
    /// Attempts since the last success or reset.
    pub attempt_count: u32,
    /// When the last attempt started.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_attempt_at: Option<OffsetDateTime>,
    /// Wait before the next retry.
    pub current_backoff: Duration,
    /// Why the last attempt failed, if it did.
    pub last_failure: Option<String>,
}

impl AttemptState {
    /// State of an address that was never tried.
    pub fn fresh(base: Duration) -> Self {
        Self {
            attempt_count: 0,
            last_attempt_at: None,
            current_backoff: base,
            last_failure: None,
        }
    }
}

/// Shared map of [`AttemptState`] keyed by normalized address.
#[derive(Debug, Clone, Default)]
pub struct AttemptStore {
    inner: Arc<RwLock<HashMap<String, AttemptState>>>,
}

impl AttemptStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// State for `address`, if it has any.
    pub async fn get(&self, address: &str) -> Option<AttemptState> {
        self.inner
            .read()
            .await
            .get(&normalize_address(address))
            .cloned()
    }

    /// Every tracked address and its state.
    pub async fn snapshot(&self) -> Vec<(String, AttemptState)> {
        let mut entries: Vec<_> = self
            .inner
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Number of tracked addresses.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether nothing is tracked.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Count a new attempt and return the updated state.
    pub(crate) async fn begin_attempt(&self, address: &str, policy: &BackoffPolicy) -> AttemptState {
        let mut map = self.inner.write().await;
        let state = map
            .entry(normalize_address(address))
            .or_insert_with(|| AttemptState::fresh(policy.base));
        state.attempt_count = state.attempt_count.saturating_add(1);
        state.last_attempt_at = Some(OffsetDateTime::now_utc());
        state.clone()
    }

    /// Record that the current attempt failed; the backoff grows with the
    /// number of consecutive failures.
    pub(crate) async fn record_failure(
        &self,
        address: &str,
        policy: &BackoffPolicy,
        reason: impl Into<String>,
    ) -> AttemptState {
        let mut map = self.inner.write().await;
        let state = map
            .entry(normalize_address(address))
            .or_insert_with(|| AttemptState::fresh(policy.base));
        let next = policy.delay_for_failures(state.attempt_count);
        state.current_backoff = state.current_backoff.max(next).min(policy.max);
        state.last_failure = Some(reason.into());
        state.clone()
    }

    /// Undo the attempt opened by `begin_attempt` after a fatal fault. The
    /// failure is noted, but neither the count nor the backoff grows.
    pub(crate) async fn abandon_attempt(&self, address: &str, reason: impl Into<String>) -> AttemptState {
        let mut map = self.inner.write().await;
        let state = map
            .entry(normalize_address(address))
            .or_insert_with(|| AttemptState::fresh(Duration::ZERO));
        state.attempt_count = state.attempt_count.saturating_sub(1);
        state.last_failure = Some(reason.into());
        state.clone()
    }

    /// Note a failure that did not come from a connect attempt (a write on an
    /// established session), without touching the counters.
    pub(crate) async fn note_failure(&self, address: &str, reason: impl Into<String>) {
        if let Some(state) = self.inner.write().await.get_mut(&normalize_address(address)) {
            state.last_failure = Some(reason.into());
        }
    }

    /// Reset after a successful connection.
    pub(crate) async fn record_success(&self, address: &str, policy: &BackoffPolicy) {
        self.inner
            .write()
            .await
            .insert(normalize_address(address), AttemptState::fresh(policy.base));
    }

    /// Forget `address`.
    pub(crate) async fn remove(&self, address: &str) {
        self.inner.write().await.remove(&normalize_address(address));
    }

    /// Forget everything.
    pub(crate) async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_backoff_grows_with_failures() {
        let store = AttemptStore::new();
        let policy = BackoffPolicy::default();

        let mut backoffs = Vec::new();
        for _ in 0..4 {
            store.begin_attempt("aa:bb", &policy).await;
            let state = store.record_failure("aa:bb", &policy, "timeout").await;
            backoffs.push(state.current_backoff.as_secs());
        }
        assert_eq!(backoffs, vec![1, 2, 4, 4]);

        let state = store.get("AA:BB").await.unwrap();
        assert_eq!(state.attempt_count, 4);
        assert!(state.last_attempt_at.is_some());
        assert_eq!(state.last_failure.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_abandoned_attempt_keeps_budget() {
        let store = AttemptStore::new();
        let policy = BackoffPolicy::default();
        store.begin_attempt("AA", &policy).await;
        store.record_failure("AA", &policy, "timeout").await;

        store.begin_attempt("AA", &policy).await;
        let state = store.abandon_attempt("AA", "unsupported device").await;

        assert_eq!(state.attempt_count, 1);
        assert_eq!(state.current_backoff, Duration::from_secs(1));
        assert_eq!(state.last_failure.as_deref(), Some("unsupported device"));
    }

    #[tokio::test]
    async fn test_success_resets() {
        let store = AttemptStore::new();
        let policy = BackoffPolicy::default();
        store.begin_attempt("AA", &policy).await;
        store.record_failure("AA", &policy, "x").await;
        store.begin_attempt("AA", &policy).await;
        store.record_failure("AA", &policy, "x").await;

        store.record_success("AA", &policy).await;
        assert_eq!(
            store.get("AA").await.unwrap(),
            AttemptState::fresh(policy.base)
        );
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let store = AttemptStore::new();
        let policy = BackoffPolicy::default();
        store.begin_attempt("AA", &policy).await;
        store.begin_attempt("BB", &policy).await;
        assert_eq!(store.len().await, 2);

        store.remove("aa").await;
        assert!(store.get("AA").await.is_none());

        store.clear().await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_note_failure_keeps_counters() {
        let store = AttemptStore::new();
        let policy = BackoffPolicy::default();
        store.begin_attempt("AA", &policy).await;
        store.record_success("AA", &policy).await;

        store.note_failure("AA", "write failed").await;
        let state = store.get("AA").await.unwrap();
        assert_eq!(state.attempt_count, 0);
        assert_eq!(state.last_failure.as_deref(), Some("write failed"));

        store.note_failure("unknown", "ignored").await;
        assert!(store.get("unknown").await.is_none());
    }

    #[test]
    fn test_state_serializes() {
        let state = AttemptState::fresh(Duration::from_secs(1));
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"attempt_count\":0"));
        assert!(json.contains("\"last_attempt_at\":null"));
    }
}
