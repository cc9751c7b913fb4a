//! Probe API wire types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label correlating a probe with its cluster.
pub const LABEL_CLUSTER_ID: &str = "cluster_id";
/// Label recording whether the probe targets a private cluster.
pub const LABEL_PRIVATE: &str = "private";

/// Lifecycle state reported by the probe service.
///
/// Unrecognised states are kept verbatim rather than rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProbeStatus {
    #[default]
    Pending,
    Active,
    Failed,
    Terminating,
    Other(String),
}

impl ProbeStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ProbeStatus::Pending => "pending",
            ProbeStatus::Active => "active",
            ProbeStatus::Failed => "failed",
            ProbeStatus::Terminating => "terminating",
            ProbeStatus::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for ProbeStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => ProbeStatus::Pending,
            "active" => ProbeStatus::Active,
            "failed" => ProbeStatus::Failed,
            "terminating" => ProbeStatus::Terminating,
            _ => ProbeStatus::Other(s),
        }
    }
}

impl From<ProbeStatus> for String {
    fn from(status: ProbeStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A probe as returned by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_id: String,
    #[serde(default, alias = "static_url", skip_serializing_if = "Option::is_none")]
    pub apiserver_url: Option<String>,
    #[serde(default)]
    pub status: ProbeStatus,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Probe {
    /// The cluster this probe belongs to, from the field or the correlation label.
    pub fn cluster_id(&self) -> Option<&str> {
        if !self.cluster_id.is_empty() {
            return Some(&self.cluster_id);
        }
        self.labels.get(LABEL_CLUSTER_ID).map(String::as_str)
    }

    pub fn is_private(&self) -> bool {
        self.labels.get(LABEL_PRIVATE).map(String::as_str) == Some("true")
    }

    pub fn is_failed(&self) -> bool {
        self.status == ProbeStatus::Failed
    }
}

/// Payload for creating a probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeRequest {
    pub cluster_id: String,
    pub apiserver_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_cluster_id: Option<String>,
    pub private: bool,
}

impl ProbeRequest {
    /// Request for a probe watching a cluster's API-server health endpoint.
    pub fn for_cluster(
        cluster_id: impl Into<String>,
        apiserver_url: impl Into<String>,
        private: bool,
    ) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            apiserver_url: apiserver_url.into(),
            management_cluster_id: None,
            private,
        }
    }

    pub fn with_management_cluster(mut self, id: impl Into<String>) -> Self {
        self.management_cluster_id = Some(id.into());
        self
    }
}

/// Response of the probes collection endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeList {
    #[serde(default)]
    pub probes: Vec<Probe>,
}

/// Payload for the status transition issued on deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbePatch {
    pub status: ProbeStatus,
}

impl ProbePatch {
    pub fn terminating() -> Self {
        Self {
            status: ProbeStatus::Terminating,
        }
    }
}
