//! OAuth2 client-credentials authentication for the probe API.

mod token;

pub use token::*;

use thiserror::Error;

/// Token acquisition error types.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("failed to request access token: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("token request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to parse token response: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("token response did not contain an access token")]
    EmptyToken,
}

/// Client-credentials settings for one OIDC client.
#[derive(Clone, PartialEq)]
pub struct OidcConfig {
    pub client_id: String,
    pub client_secret: String,
    pub issuer_url: String,
    pub scope: Option<String>,
}

impl OidcConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        issuer_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            issuer_url: issuer_url.into(),
            scope: Some("profile".to_string()),
        }
    }

    /// The token endpoint. Issuer URLs are accepted either as the token
    /// endpoint itself or as a base that `/token` is appended to.
    pub fn token_url(&self) -> String {
        let issuer = self.issuer_url.trim_end_matches('/');
        if issuer.ends_with("/token") {
            issuer.to_string()
        } else {
            format!("{}/token", issuer)
        }
    }
}

impl std::fmt::Debug for OidcConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("issuer_url", &self.issuer_url)
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_url_appends_suffix() {
        let cfg = OidcConfig::new("id", "secret", "https://auth.example.com");
        assert_eq!(cfg.token_url(), "https://auth.example.com/token");

        let cfg = OidcConfig::new("id", "secret", "https://auth.example.com/");
        assert_eq!(cfg.token_url(), "https://auth.example.com/token");
    }

    #[test]
    fn test_token_url_keeps_direct_endpoint() {
        let url = "https://sso.example.com/auth/realms/external/protocol/openid-connect/token";
        let cfg = OidcConfig::new("id", "secret", url);
        assert_eq!(cfg.token_url(), url);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let cfg = OidcConfig::new("id", "hunter2", "https://auth.example.com");
        let out = format!("{:?}", cfg);
        assert!(!out.contains("hunter2"));
        assert!(out.contains("<redacted>"));
    }
}
