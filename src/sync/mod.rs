//! Probe lifecycle policies driven by the cluster reconciliation loop.

mod deletion;

pub use deletion::*;

use crate::probe::{ProbeClient, ProbeError, ProbeRequest};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle error types.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("cluster ID is required")]
    EmptyClusterId,
    #[error("API server hostname is required for cluster {0}")]
    MissingHostname(String),
    #[error("failed to get probe for cluster {cluster_id}: {source}")]
    Lookup {
        cluster_id: String,
        #[source]
        source: ProbeError,
    },
    #[error("failed to delete failed probe for cluster {cluster_id}: {source}")]
    DeleteFailed {
        cluster_id: String,
        #[source]
        source: ProbeError,
    },
    #[error("failed to delete drifted probe for cluster {cluster_id}: {source}")]
    DeleteDrifted {
        cluster_id: String,
        #[source]
        source: ProbeError,
    },
    #[error("failed to create probe for cluster {cluster_id}: {source}")]
    Create {
        cluster_id: String,
        #[source]
        source: ProbeError,
    },
    #[error("failed to delete probe for cluster {cluster_id}: {source}")]
    Delete {
        cluster_id: String,
        #[source]
        source: ProbeError,
    },
}

impl SyncError {
    /// The underlying probe API error, if the failure came from the remote service.
    pub fn probe_error(&self) -> Option<&ProbeError> {
        match self {
            SyncError::EmptyClusterId | SyncError::MissingHostname(_) => None,
            SyncError::Lookup { source, .. }
            | SyncError::DeleteFailed { source, .. }
            | SyncError::DeleteDrifted { source, .. }
            | SyncError::Create { source, .. }
            | SyncError::Delete { source, .. } => Some(source),
        }
    }

    /// The caller supplied an unusable cluster description.
    pub fn is_invalid_input(&self) -> bool {
        self.probe_error().is_none()
    }
}

/// How the API server of a cluster can be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointAccess {
    #[default]
    Public,
    PublicAndPrivate,
    Private,
}

/// Desired probe configuration for one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClusterContext {
    pub cluster_id: String,
    pub api_server_hostname: String,
    pub endpoint_access: EndpointAccess,
    pub management_cluster_id: Option<String>,
}

impl ClusterContext {
    pub fn new(
        cluster_id: impl Into<String>,
        api_server_hostname: impl Into<String>,
        endpoint_access: EndpointAccess,
    ) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            api_server_hostname: api_server_hostname.into(),
            endpoint_access,
            management_cluster_id: None,
        }
    }

    pub fn is_private(&self) -> bool {
        self.endpoint_access == EndpointAccess::Private
    }

    /// Health endpoint the probe should watch.
    pub fn probe_url(&self) -> String {
        format!("https://{}/livez", self.api_server_hostname.trim())
    }

    /// Validate the context and build the create request for it.
    pub fn desired_request(&self) -> Result<ProbeRequest, SyncError> {
        if self.cluster_id.trim().is_empty() {
            return Err(SyncError::EmptyClusterId);
        }
        if self.api_server_hostname.trim().is_empty() {
            return Err(SyncError::MissingHostname(self.cluster_id.clone()));
        }

        let req = ProbeRequest::for_cluster(&self.cluster_id, self.probe_url(), self.is_private());
        Ok(match &self.management_cluster_id {
            Some(id) if !id.is_empty() => req.with_management_cluster(id),
            _ => req,
        })
    }
}

/// Why an existing probe was deleted and recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplaceReason {
    Failed,
    Drift,
}

/// Result of converging one cluster's probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnsureOutcome {
    Skipped,
    Created,
    Unchanged,
    Replaced { reason: ReplaceReason },
}

/// Converges the remote probe of a cluster to its desired configuration.
#[derive(Clone)]
pub struct ProbeReconciler {
    client: ProbeClient,
    only_public_clusters: bool,
}

impl ProbeReconciler {
    pub fn new(client: ProbeClient, only_public_clusters: bool) -> Self {
        Self {
            client,
            only_public_clusters,
        }
    }

    pub fn client(&self) -> &ProbeClient {
        &self.client
    }

    /// Create, keep, or replace the probe of `ctx.cluster_id`.
    ///
    /// A probe is replaced when the service reports it failed or when its
    /// private label disagrees with the cluster's endpoint access. Errors abort
    /// the pass; the next reconciliation retries.
    pub async fn ensure_probe(&self, ctx: &ClusterContext) -> Result<EnsureOutcome, SyncError> {
        let cluster_id = ctx.cluster_id.as_str();
        if cluster_id.trim().is_empty() {
            return Err(SyncError::EmptyClusterId);
        }

        // Private clusters are skipped before their hostname is needed.
        if ctx.is_private() && self.only_public_clusters {
            tracing::info!(cluster_id, "Skipping probe for private cluster");
            return Ok(EnsureOutcome::Skipped);
        }

        let desired = ctx.desired_request()?;

        let existing = self
            .client
            .get_probe(cluster_id)
            .await
            .map_err(|source| SyncError::Lookup {
                cluster_id: cluster_id.to_string(),
                source,
            })?;

        let Some(existing) = existing else {
            self.create(&desired).await?;
            tracing::info!(cluster_id, private = desired.private, "Created probe");
            return Ok(EnsureOutcome::Created);
        };

        if existing.is_failed() {
            tracing::warn!(cluster_id, probe_id = %existing.id, "Probe is in failed state, recreating");
            self.client
                .delete_probe(cluster_id)
                .await
                .map_err(|source| SyncError::DeleteFailed {
                    cluster_id: cluster_id.to_string(),
                    source,
                })?;
            self.create(&desired).await?;
            return Ok(EnsureOutcome::Replaced {
                reason: ReplaceReason::Failed,
            });
        }

        if existing.is_private() == desired.private {
            tracing::debug!(cluster_id, probe_id = %existing.id, "Probe is up to date");
            return Ok(EnsureOutcome::Unchanged);
        }

        tracing::info!(
            cluster_id,
            probe_id = %existing.id,
            current_private = existing.is_private(),
            desired_private = desired.private,
            "Probe configuration drifted, recreating"
        );
        self.client
            .delete_probe(cluster_id)
            .await
            .map_err(|source| SyncError::DeleteDrifted {
                cluster_id: cluster_id.to_string(),
                source,
            })?;
        self.create(&desired).await?;

        Ok(EnsureOutcome::Replaced {
            reason: ReplaceReason::Drift,
        })
    }

    async fn create(&self, req: &ProbeRequest) -> Result<(), SyncError> {
        let probe = self
            .client
            .create_probe(req)
            .await
            .map_err(|source| SyncError::Create {
                cluster_id: req.cluster_id.clone(),
                source,
            })?;
        tracing::debug!(cluster_id = %req.cluster_id, probe_id = %probe.id, "Probe accepted by service");
        Ok(())
    }
}
