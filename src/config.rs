//! Configuration module for probesync.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::auth::OidcConfig;
use crate::probe::DEFAULT_HTTP_TIMEOUT;
use crate::sync::DEFAULT_DELETION_TIMEOUT;

/// Configuration error types.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("incomplete OIDC configuration: {0} is set but {1} is not")]
    PartialOidc(&'static str, &'static str),
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP port for the collaborator API (default: 8080)
    pub http_port: u16,
    /// Base URL of the remote probe API
    pub probe_api_url: String,
    /// Tenant the probes are scoped to
    pub tenant: String,
    /// Client-credentials settings; `None` selects unauthenticated mode
    pub oidc: Option<OidcConfig>,
    /// Skip probe creation for private clusters
    pub only_public_clusters: bool,
    /// Timeout applied to every outgoing HTTP request (default: 30s)
    pub http_timeout: Duration,
    /// How long probe deletion may block cluster teardown (default: 15m)
    pub deletion_timeout: Duration,
    /// Subtracted from a token's lifetime so it is refreshed before the issuer rejects it
    pub token_expiry_leeway: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 8080,
            probe_api_url: String::new(),
            tenant: String::new(),
            oidc: None,
            only_public_clusters: false,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            deletion_timeout: DEFAULT_DELETION_TIMEOUT,
            token_expiry_leeway: Duration::from_secs(30),
        }
    }
}

const OIDC_CLIENT_ID: &str = "PROBESYNC_OIDC_CLIENT_ID";
const OIDC_CLIENT_SECRET: &str = "PROBESYNC_OIDC_CLIENT_SECRET";
const OIDC_ISSUER_URL: &str = "PROBESYNC_OIDC_ISSUER_URL";

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PROBESYNC_HTTP_PORT`: HTTP port (default: 8080)
    /// - `PROBESYNC_PROBE_API_URL`: probe API base URL (required)
    /// - `PROBESYNC_TENANT`: tenant name (required)
    /// - `PROBESYNC_OIDC_CLIENT_ID`, `PROBESYNC_OIDC_CLIENT_SECRET`,
    ///   `PROBESYNC_OIDC_ISSUER_URL`: all three or none
    /// - `PROBESYNC_OIDC_SCOPE`: token scope (default: "profile")
    /// - `PROBESYNC_ONLY_PUBLIC_CLUSTERS`: "true"/"false" (default: false)
    /// - `PROBESYNC_HTTP_TIMEOUT_SECS`: request timeout (default: 30)
    /// - `PROBESYNC_DELETION_TIMEOUT_SECS`: fail-open threshold (default: 900)
    /// - `PROBESYNC_TOKEN_EXPIRY_LEEWAY_SECS`: token refresh margin (default: 30)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn load_from<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(port) = get("PROBESYNC_HTTP_PORT") {
            cfg.http_port = parse_value("PROBESYNC_HTTP_PORT", &port)?;
        }

        cfg.probe_api_url =
            get("PROBESYNC_PROBE_API_URL").ok_or(ConfigError::Missing("PROBESYNC_PROBE_API_URL"))?;
        cfg.tenant = get("PROBESYNC_TENANT").ok_or(ConfigError::Missing("PROBESYNC_TENANT"))?;

        cfg.oidc = match (get(OIDC_CLIENT_ID), get(OIDC_CLIENT_SECRET), get(OIDC_ISSUER_URL)) {
            (None, None, None) => None,
            (Some(client_id), Some(client_secret), Some(issuer_url)) => {
                let mut oidc = OidcConfig::new(client_id, client_secret, issuer_url);
                if let Some(scope) = get("PROBESYNC_OIDC_SCOPE") {
                    oidc.scope = Some(scope);
                }
                Some(oidc)
            }
            (id, secret, issuer) => {
                let set = [
                    (OIDC_CLIENT_ID, id.is_some()),
                    (OIDC_CLIENT_SECRET, secret.is_some()),
                    (OIDC_ISSUER_URL, issuer.is_some()),
                ];
                let present = set.iter().find(|(_, p)| *p).map(|(k, _)| *k).unwrap_or(OIDC_CLIENT_ID);
                let missing = set.iter().find(|(_, p)| !*p).map(|(k, _)| *k).unwrap_or(OIDC_ISSUER_URL);
                return Err(ConfigError::PartialOidc(present, missing));
            }
        };

        if let Some(flag) = get("PROBESYNC_ONLY_PUBLIC_CLUSTERS") {
            cfg.only_public_clusters = parse_value("PROBESYNC_ONLY_PUBLIC_CLUSTERS", &flag)?;
        }

        if let Some(secs) = get("PROBESYNC_HTTP_TIMEOUT_SECS") {
            cfg.http_timeout = Duration::from_secs(parse_value("PROBESYNC_HTTP_TIMEOUT_SECS", &secs)?);
        }

        if let Some(secs) = get("PROBESYNC_DELETION_TIMEOUT_SECS") {
            cfg.deletion_timeout =
                Duration::from_secs(parse_value("PROBESYNC_DELETION_TIMEOUT_SECS", &secs)?);
        }

        if let Some(secs) = get("PROBESYNC_TOKEN_EXPIRY_LEEWAY_SECS") {
            cfg.token_expiry_leeway =
                Duration::from_secs(parse_value("PROBESYNC_TOKEN_EXPIRY_LEEWAY_SECS", &secs)?);
        }

        Ok(cfg)
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}
