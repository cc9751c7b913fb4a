//! Observability signals for the probe lifecycle manager.
//!
//! Everything goes through the `metrics` facade; the Prometheus recorder is
//! installed once by the binary and rendered on `/metrics`.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

pub const API_REQUEST_DURATION: &str = "probe_api_request_duration_seconds";
pub const API_REQUESTS_TOTAL: &str = "probe_api_requests_total";
pub const API_DUPLICATE_PROBES_TOTAL: &str = "probe_api_duplicate_probes_total";
pub const OIDC_REFRESH_DURATION: &str = "oidc_token_refresh_duration_seconds";
pub const OIDC_REFRESH_TOTAL: &str = "oidc_token_refresh_total";
pub const PROBE_DELETION_TIMEOUT_TOTAL: &str = "probe_deletion_timeout_total";
pub const INFO: &str = "probesync_info";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder, or return the one already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

/// Probe API operations, used as the `operation` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateProbe,
    GetProbe,
    DeleteProbe,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateProbe => "create_probe",
            Operation::GetProbe => "get_probe",
            Operation::DeleteProbe => "delete_probe",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn status_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}

/// Record one probe API request.
pub fn record_api_request(operation: Operation, duration: Duration, success: bool) {
    let status = status_label(success);
    histogram!(API_REQUEST_DURATION, "operation" => operation.as_str(), "status" => status)
        .record(duration.as_secs_f64());
    counter!(API_REQUESTS_TOTAL, "operation" => operation.as_str(), "status" => status).increment(1);
}

/// Record a lookup that matched more than one probe for a cluster.
pub fn record_duplicate_probes() {
    counter!(API_DUPLICATE_PROBES_TOTAL).increment(1);
}

/// Record one OIDC token refresh attempt.
pub fn record_token_refresh(duration: Duration, success: bool) {
    histogram!(OIDC_REFRESH_DURATION).record(duration.as_secs_f64());
    counter!(OIDC_REFRESH_TOTAL, "status" => status_label(success)).increment(1);
}

/// Record a deletion that exceeded the timeout and failed open.
pub fn record_deletion_timeout() {
    counter!(PROBE_DELETION_TIMEOUT_TOTAL).increment(1);
}

pub fn record_info(version: &'static str) {
    gauge!(INFO, "version" => version).set(1.0);
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_labels() {
        assert_eq!(Operation::CreateProbe.as_str(), "create_probe");
        assert_eq!(Operation::GetProbe.as_str(), "get_probe");
        assert_eq!(Operation::DeleteProbe.to_string(), "delete_probe");
    }

    #[test]
    fn test_api_requests_counted_by_operation_and_status() {
        let (_, counters) = testing::record_counters(async {
            record_api_request(Operation::CreateProbe, Duration::from_millis(5), true);
            record_api_request(Operation::GetProbe, Duration::from_millis(5), true);
            record_api_request(Operation::GetProbe, Duration::from_millis(5), false);
            record_duplicate_probes();
        });

        assert_eq!(counters.get(API_REQUESTS_TOTAL, &[("operation", "create_probe")]), 1);
        assert_eq!(counters.get(API_REQUESTS_TOTAL, &[("operation", "get_probe")]), 2);
        assert_eq!(
            counters.get(API_REQUESTS_TOTAL, &[("operation", "get_probe"), ("status", "error")]),
            1
        );
        assert_eq!(counters.get(API_DUPLICATE_PROBES_TOTAL, &[]), 1);
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_api_request(Operation::GetProbe, Duration::from_millis(5), true);
        record_token_refresh(Duration::from_millis(5), false);
        record_deletion_timeout();
        record_duplicate_probes();
    }
}
