//! Access token cache backed by the client-credentials grant.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use super::{OidcConfig, TokenError};
use crate::metrics;

/// A bearer token and the instant it stops being usable.
#[derive(Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Instant,
}

impl AccessToken {
    /// A request starting at `now` may use this token.
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: u64,
}

/// Obtains and caches the access token for one credential set.
///
/// The cache lock is held across a refresh, so concurrent callers that find
/// the token expired wait for the first refresh and then reuse its result.
pub struct TokenProvider {
    config: OidcConfig,
    token_url: String,
    http: reqwest::Client,
    leeway: Duration,
    cache: Mutex<Option<AccessToken>>,
}

impl TokenProvider {
    /// Create a provider that issues token requests through `http`.
    ///
    /// `leeway` is subtracted from every token's lifetime.
    pub fn new(config: OidcConfig, http: reqwest::Client, leeway: Duration) -> Self {
        let token_url = config.token_url();
        Self {
            config,
            token_url,
            http,
            leeway,
            cache: Mutex::new(None),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Return a token valid for a request starting now, refreshing if needed.
    pub async fn token(&self) -> Result<AccessToken, TokenError> {
        let mut cached = self.cache.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_valid_at(Instant::now()) {
                return Ok(token.clone());
            }
        }

        let start = Instant::now();
        let result = self.fetch().await;
        metrics::record_token_refresh(start.elapsed(), result.is_ok());

        let token = result?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        self.cache.lock().await.take();
    }

    async fn fetch(&self) -> Result<AccessToken, TokenError> {
        tracing::debug!(
            issuer_url = %self.config.issuer_url,
            token_url = %self.token_url,
            "Requesting OIDC access token"
        );

        let fetched_at = Instant::now();
        let response = self
            .http
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&token_form(&self.config))
            .send()
            .await
            .map_err(TokenError::Transport)?;

        let status = response.status();
        let body = response.text().await.map_err(TokenError::Transport)?;

        if !status.is_success() {
            tracing::warn!(status_code = status.as_u16(), "OIDC token request rejected");
            return Err(TokenError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(TokenError::Parse)?;
        if parsed.access_token.is_empty() {
            return Err(TokenError::EmptyToken);
        }

        let lifetime = Duration::from_secs(parsed.expires_in).saturating_sub(self.leeway);
        tracing::debug!(
            expires_in = parsed.expires_in,
            token_type = parsed.token_type.as_deref().unwrap_or("unknown"),
            "Obtained OIDC access token"
        );

        Ok(AccessToken {
            value: parsed.access_token,
            expires_at: fetched_at + lifetime,
        })
    }
}

/// Form fields of a client-credentials token request.
fn token_form(config: &OidcConfig) -> Vec<(&'static str, &str)> {
    let mut form = vec![
        ("grant_type", "client_credentials"),
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
    ];
    if let Some(scope) = config.scope.as_deref() {
        form.push(("scope", scope));
    }
    form
}
