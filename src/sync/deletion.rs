//! Bounded blocking of cluster teardown on probe deletion.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::SyncError;
use crate::metrics;
use crate::probe::{ProbeClient, ProbeError};

pub const DEFAULT_DELETION_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Result of a deletion attempt that lets teardown continue.
#[derive(Debug)]
pub enum DeletionOutcome {
    Deleted,
    /// Deletion failed after the timeout; the probe may be orphaned.
    FailOpen { error: ProbeError },
}

impl DeletionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionOutcome::Deleted => "deleted",
            DeletionOutcome::FailOpen { .. } => "fail_open",
        }
    }
}

/// Deletes probes, giving up on the remote service once a cluster has been
/// waiting for longer than `timeout`.
///
/// Holds no per-cluster state: elapsed time is derived from the caller's
/// deletion timestamp on every call.
#[derive(Clone)]
pub struct DeletionTimeoutPolicy {
    client: ProbeClient,
    timeout: Duration,
}

impl DeletionTimeoutPolicy {
    pub fn new(client: ProbeClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn delete_probe(
        &self,
        cluster_id: &str,
        deletion_requested_at: DateTime<Utc>,
    ) -> Result<DeletionOutcome, SyncError> {
        self.delete_probe_at(cluster_id, deletion_requested_at, Utc::now())
            .await
    }

    /// Delete the probe of `cluster_id` as if the current time were `now`.
    ///
    /// Failures inside the timeout are returned so the caller keeps blocking
    /// teardown; failures past it are logged and reported as
    /// [`DeletionOutcome::FailOpen`].
    pub async fn delete_probe_at(
        &self,
        cluster_id: &str,
        deletion_requested_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DeletionOutcome, SyncError> {
        if cluster_id.trim().is_empty() {
            return Err(SyncError::EmptyClusterId);
        }

        // A deletion timestamp in the future counts as just requested.
        let elapsed = (now - deletion_requested_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        match self.client.delete_probe(cluster_id).await {
            Ok(()) => {
                tracing::info!(cluster_id, "Probe deleted");
                Ok(DeletionOutcome::Deleted)
            }
            Err(error) if elapsed >= self.timeout => {
                tracing::warn!(
                    cluster_id,
                    elapsed_secs = elapsed.as_secs(),
                    timeout_secs = self.timeout.as_secs(),
                    error = %error,
                    "Probe deletion timed out, allowing cluster deletion to proceed"
                );
                metrics::record_deletion_timeout();
                Ok(DeletionOutcome::FailOpen { error })
            }
            Err(source) => {
                tracing::info!(
                    cluster_id,
                    elapsed_secs = elapsed.as_secs(),
                    error = %source,
                    "Probe deletion failed, will retry"
                );
                Err(SyncError::Delete {
                    cluster_id: cluster_id.to_string(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::testing::record_counters;
    use crate::metrics::{API_REQUESTS_TOTAL, PROBE_DELETION_TIMEOUT_TOTAL};
    use httpmock::Method::{GET, PATCH};
    use httpmock::MockServer;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn unreachable_policy() -> DeletionTimeoutPolicy {
        let client = ProbeClient::new("http://127.0.0.1:1", "hcp", Duration::from_secs(2)).unwrap();
        DeletionTimeoutPolicy::new(client, DEFAULT_DELETION_TIMEOUT)
    }

    fn minutes_seconds(m: i64, s: i64) -> chrono::Duration {
        chrono::Duration::minutes(m) + chrono::Duration::seconds(s)
    }

    #[tokio::test]
    async fn test_failure_inside_timeout_blocks() {
        let policy = unreachable_policy();
        let now = Utc::now();

        let err = assert_err!(
            policy
                .delete_probe_at("c1", now - minutes_seconds(14, 59), now)
                .await
        );
        assert!(matches!(err, SyncError::Delete { .. }));
        assert!(err.probe_error().is_some_and(ProbeError::is_transport));
    }

    #[tokio::test]
    async fn test_failure_past_timeout_fails_open() {
        let policy = unreachable_policy();
        let now = Utc::now();

        let outcome = assert_ok!(
            policy
                .delete_probe_at("c1", now - minutes_seconds(15, 1), now)
                .await
        );
        match outcome {
            DeletionOutcome::FailOpen { error } => assert!(error.is_transport()),
            other => panic!("expected fail-open, got {:?}", other),
        }
    }

    #[test]
    fn test_fail_open_counted_once_per_call() {
        let policy = unreachable_policy();
        let now = Utc::now();

        let (result, counters) = record_counters(
            policy.delete_probe_at("c1", now - minutes_seconds(15, 1), now),
        );
        assert!(matches!(result, Ok(DeletionOutcome::FailOpen { .. })));
        assert_eq!(counters.get(PROBE_DELETION_TIMEOUT_TOTAL, &[]), 1);
        assert_eq!(
            counters.get(API_REQUESTS_TOTAL, &[("operation", "delete_probe"), ("status", "error")]),
            1
        );

        let (_, counters) = record_counters(async {
            for _ in 0..3 {
                let _ = policy
                    .delete_probe_at("c1", now - chrono::Duration::hours(1), now)
                    .await;
            }
        });
        assert_eq!(counters.get(PROBE_DELETION_TIMEOUT_TOTAL, &[]), 3);
    }

    #[test]
    fn test_fail_closed_is_not_counted() {
        let policy = unreachable_policy();
        let now = Utc::now();

        let (result, counters) = record_counters(
            policy.delete_probe_at("c1", now - minutes_seconds(14, 59), now),
        );
        assert!(matches!(result, Err(SyncError::Delete { .. })));
        assert_eq!(counters.get(PROBE_DELETION_TIMEOUT_TOTAL, &[]), 0);
        assert_eq!(
            counters.get(API_REQUESTS_TOTAL, &[("operation", "delete_probe"), ("status", "error")]),
            1
        );
    }

    #[tokio::test]
    async fn test_timeout_boundary_fails_open() {
        let policy = unreachable_policy();
        let now = Utc::now();

        let outcome = assert_ok!(
            policy
                .delete_probe_at("c1", now - chrono::Duration::minutes(15), now)
                .await
        );
        assert!(matches!(outcome, DeletionOutcome::FailOpen { .. }));
        assert_eq!(outcome.as_str(), "fail_open");
    }

    #[tokio::test]
    async fn test_future_timestamp_counts_as_zero_elapsed() {
        let policy = unreachable_policy();
        let now = Utc::now();

        assert_err!(
            policy
                .delete_probe_at("c1", now + chrono::Duration::hours(1), now)
                .await
        );
    }

    #[tokio::test]
    async fn test_repeated_calls_decide_independently() {
        let policy = unreachable_policy();
        let requested_at = Utc::now() - chrono::Duration::minutes(10);

        assert_err!(policy.delete_probe("c1", requested_at).await);
        assert_err!(policy.delete_probe("c1", requested_at).await);

        let later = requested_at + chrono::Duration::minutes(20);
        assert_ok!(policy.delete_probe_at("c1", requested_at, later).await);
    }

    #[tokio::test]
    async fn test_success_is_deleted_regardless_of_elapsed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/hcp/metrics/probes");
                then.status(200).json_body(json!({
                    "probes": [{"id": "probe-1", "cluster_id": "c1", "status": "active"}]
                }));
            })
            .await;
        let patch = server
            .mock_async(|when, then| {
                when.method(PATCH).path("/hcp/metrics/probes/c1");
                then.status(200);
            })
            .await;

        let client = ProbeClient::new(&server.base_url(), "hcp", Duration::from_secs(5)).unwrap();
        let policy = DeletionTimeoutPolicy::new(client, DEFAULT_DELETION_TIMEOUT);
        let now = Utc::now();

        for elapsed in [chrono::Duration::zero(), chrono::Duration::hours(2)] {
            let outcome = assert_ok!(policy.delete_probe_at("c1", now - elapsed, now).await);
            assert!(matches!(outcome, DeletionOutcome::Deleted));
        }
        assert_eq!(patch.calls_async().await, 2);
    }

    #[tokio::test]
    async fn test_already_gone_is_deleted() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/hcp/metrics/probes");
                then.status(404);
            })
            .await;

        let client = ProbeClient::new(&server.base_url(), "hcp", Duration::from_secs(5)).unwrap();
        let policy = DeletionTimeoutPolicy::new(client, DEFAULT_DELETION_TIMEOUT);

        let outcome = assert_ok!(policy.delete_probe("c1", Utc::now()).await);
        assert_eq!(outcome.as_str(), "deleted");
    }

    #[tokio::test]
    async fn test_empty_cluster_id_is_rejected() {
        let policy = unreachable_policy();
        let err = assert_err!(policy.delete_probe("", Utc::now()).await);
        assert!(err.is_invalid_input());
    }
}
