//! HTTP client for the remote probe API.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;

use super::{Probe, ProbeError, ProbeList, ProbePatch, ProbeRequest, LABEL_CLUSTER_ID};
use crate::auth::TokenProvider;
use crate::config::Config;
use crate::metrics::{self, Operation};

pub const TENANT_HEADER: &str = "X-Tenant";
pub const USERNAME_HEADER: &str = "X-Username";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const LABEL_SELECTOR_PARAM: &str = "label_selector";

/// Client for the tenant-scoped probes collection.
///
/// Without a [`TokenProvider`] requests are sent unauthenticated and carry no
/// `Authorization` header.
#[derive(Clone)]
pub struct ProbeClient {
    http: reqwest::Client,
    probes_url: Url,
    tenant: String,
    auth: Option<Arc<TokenProvider>>,
}

impl ProbeClient {
    /// Create an unauthenticated client with its own HTTP connection pool.
    pub fn new(base_url: &str, tenant: &str, timeout: Duration) -> Result<Self, ProbeError> {
        let http = build_http_client(timeout)?;
        Self::with_http_client(http, base_url, tenant)
    }

    /// Create an unauthenticated client on an existing `reqwest::Client`.
    pub fn with_http_client(
        http: reqwest::Client,
        base_url: &str,
        tenant: &str,
    ) -> Result<Self, ProbeError> {
        Ok(Self {
            http,
            probes_url: build_probes_url(base_url, tenant)?,
            tenant: tenant.to_string(),
            auth: None,
        })
    }

    /// Attach bearer tokens from `tokens` to every request.
    pub fn with_auth(mut self, tokens: Arc<TokenProvider>) -> Self {
        self.auth = Some(tokens);
        self
    }

    /// Build the client described by the service configuration.
    ///
    /// The token provider shares the client's connection pool and timeout.
    pub fn from_config(cfg: &Config) -> Result<Self, ProbeError> {
        let http = build_http_client(cfg.http_timeout)?;
        let client = Self::with_http_client(http.clone(), &cfg.probe_api_url, &cfg.tenant)?;

        match &cfg.oidc {
            Some(oidc) => {
                let tokens = TokenProvider::new(oidc.clone(), http, cfg.token_expiry_leeway);
                tracing::debug!(
                    client_id = %oidc.client_id,
                    token_url = %tokens.token_url(),
                    "Creating probe API client with OIDC authentication"
                );
                Ok(client.with_auth(Arc::new(tokens)))
            }
            None => {
                tracing::debug!("Creating probe API client without authentication");
                Ok(client)
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }

    pub fn probes_url(&self) -> &Url {
        &self.probes_url
    }

    /// URL of the per-cluster probe resource.
    pub fn probe_url(&self, cluster_id: &str) -> Url {
        let mut url = self.probes_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(cluster_id);
        }
        url
    }

    /// Create a probe.
    pub async fn create_probe(&self, req: &ProbeRequest) -> Result<Probe, ProbeError> {
        timed(Operation::CreateProbe, async {
            tracing::debug!(cluster_id = %req.cluster_id, tenant = %self.tenant, "Creating probe");

            let (status, body) = self
                .execute(Operation::CreateProbe, Method::POST, self.probes_url.clone(), Some(req))
                .await?;

            if !status.is_success() {
                return Err(ProbeError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            serde_json::from_str(&body).map_err(ProbeError::Decode)
        })
        .await
    }

    /// Look up the probe of a cluster.
    ///
    /// A 404 and an empty or non-matching list both yield `Ok(None)`. When the
    /// service returns several matches the first one wins.
    pub async fn get_probe(&self, cluster_id: &str) -> Result<Option<Probe>, ProbeError> {
        timed(Operation::GetProbe, async {
            let mut url = self.probes_url.clone();
            url.query_pairs_mut().append_pair(
                LABEL_SELECTOR_PARAM,
                &format!("{}={}", LABEL_CLUSTER_ID, cluster_id),
            );

            tracing::debug!(cluster_id, tenant = %self.tenant, "Getting probe");
            let (status, body) = self
                .execute::<()>(Operation::GetProbe, Method::GET, url, None)
                .await?;

            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }

            if !status.is_success() {
                return Err(ProbeError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            let list: ProbeList = serde_json::from_str(&body).map_err(ProbeError::Decode)?;
            let mut matches = list
                .probes
                .into_iter()
                .filter(|probe| probe.cluster_id() == Some(cluster_id));

            let first = matches.next();
            let extra = matches.count();
            if let (Some(probe), true) = (&first, extra > 0) {
                tracing::warn!(
                    cluster_id,
                    probe_id = %probe.id,
                    duplicates = extra,
                    "Multiple probes match cluster, using the first"
                );
                metrics::record_duplicate_probes();
            }

            Ok(first)
        })
        .await
    }

    /// Mark the probe of a cluster as terminating.
    ///
    /// Succeeds without a mutating call when no probe exists.
    pub async fn delete_probe(&self, cluster_id: &str) -> Result<(), ProbeError> {
        timed(Operation::DeleteProbe, async {
            let existing = self
                .get_probe(cluster_id)
                .await
                .map_err(|e| ProbeError::Lookup(Box::new(e)))?;

            let Some(existing) = existing else {
                tracing::debug!(cluster_id, "Probe not found, nothing to delete");
                return Ok(());
            };

            if existing.is_failed() {
                // The service recreates failed probes in the terminating state.
                tracing::info!(
                    cluster_id,
                    probe_id = %existing.id,
                    "Probe is in failed state, marking it terminating"
                );
            }

            let url = self.probe_url(cluster_id);
            tracing::debug!(cluster_id, tenant = %self.tenant, "Terminating probe");
            let (status, body) = self
                .execute(
                    Operation::DeleteProbe,
                    Method::PATCH,
                    url,
                    Some(&ProbePatch::terminating()),
                )
                .await?;

            if status == StatusCode::NOT_FOUND || status.is_success() {
                return Ok(());
            }

            Err(ProbeError::Api {
                status: status.as_u16(),
                body,
            })
        })
        .await
    }

    /// Send one request and return its status and body text.
    async fn execute<B: Serialize + ?Sized>(
        &self,
        operation: Operation,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<(StatusCode, String), ProbeError> {
        let mut builder = self
            .http
            .request(method.clone(), url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(TENANT_HEADER, &self.tenant);

        if let Some(tokens) = &self.auth {
            let token = tokens.token().await?;
            builder = builder
                .bearer_auth(&token.value)
                .header(USERNAME_HEADER, tokens.client_id());
        }

        if let Some(body) = body {
            builder = builder.json(body);
        }

        tracing::info!(method = %method, url = %url, operation = %operation, "Sending probe API request");

        let response = builder.send().await.map_err(ProbeError::Transport)?;
        let status = response.status();

        tracing::info!(
            method = %method,
            url = %url,
            operation = %operation,
            status_code = status.as_u16(),
            "Received probe API response"
        );

        if status == StatusCode::UNAUTHORIZED {
            if let Some(tokens) = &self.auth {
                tokens.invalidate().await;
            }
        }

        let text = response.text().await.map_err(ProbeError::Transport)?;
        Ok((status, text))
    }
}

async fn timed<T, F>(operation: Operation, fut: F) -> Result<T, ProbeError>
where
    F: Future<Output = Result<T, ProbeError>>,
{
    let start = Instant::now();
    let result = fut.await;
    metrics::record_api_request(operation, start.elapsed(), result.is_ok());
    result
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ProbeError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(ProbeError::Client)
}

/// Resolve the probes collection URL.
///
/// A base URL whose path already names the probes collection is used as-is;
/// otherwise `/{tenant}/metrics/probes` is appended.
fn build_probes_url(base_url: &str, tenant: &str) -> Result<Url, ProbeError> {
    let invalid = |reason: &str| ProbeError::InvalidUrl {
        url: base_url.to_string(),
        reason: reason.to_string(),
    };

    let mut url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| invalid(&e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid("scheme must be http or https"));
    }

    if url.path().contains("/probes") {
        return Ok(url);
    }

    if tenant.is_empty() {
        return Err(invalid("tenant is required"));
    }

    url.path_segments_mut()
        .map_err(|_| invalid("URL cannot be a base"))?
        .pop_if_empty()
        .extend([tenant, "metrics", "probes"]);

    Ok(url)
}
